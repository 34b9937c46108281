//! Ollama auto-discovery helpers.
//!
//! Pings the configured Ollama instance and, if responsive, fetches the
//! locally downloaded models from `/api/tags` so the CLI can tell the user
//! whether the embedding model still needs to be pulled.

use serde::Deserialize;

/// A single model entry returned by Ollama's `/api/tags` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModel {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<OllamaModel>,
}

/// Ping the Ollama server and return the list of available models.
///
/// Must not be called from inside the Tokio runtime (blocking client).
pub fn fetch_models(base_url: &str) -> Result<Vec<OllamaModel>, String> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let response = reqwest::blocking::get(&url)
        .map_err(|e| format!("Ollama unreachable at {}: {}", url, e))?;

    if !response.status().is_success() {
        return Err(format!("Ollama returned HTTP {}", response.status()));
    }

    let tags: TagsResponse = response
        .json()
        .map_err(|e| format!("Failed to parse Ollama response: {}", e))?;

    Ok(tags.models)
}

/// `true` when `wanted` is among `models`.  An untagged name matches its
/// `:latest` tag.
pub fn has_model(models: &[OllamaModel], wanted: &str) -> bool {
    models.iter().any(|m| {
        m.name == wanted
            || (!wanted.contains(':') && m.name.strip_suffix(":latest") == Some(wanted))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(names: &[&str]) -> Vec<OllamaModel> {
        names.iter().map(|n| OllamaModel { name: n.to_string() }).collect()
    }

    #[test]
    fn untagged_name_matches_latest() {
        let m = models(&["nomic-embed-text:latest", "llama3:8b"]);
        assert!(has_model(&m, "nomic-embed-text"));
        assert!(has_model(&m, "llama3:8b"));
        assert!(!has_model(&m, "llama3"));
        assert!(!has_model(&m, "all-minilm"));
    }

    #[test]
    fn tags_response_parses() {
        let raw = r#"{"models":[{"name":"nomic-embed-text:latest","size":274302450}]}"#;
        let tags: TagsResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(tags.models[0].name, "nomic-embed-text:latest");
    }

    #[test]
    fn unreachable_server_is_error() {
        assert!(fetch_models("http://127.0.0.1:1").is_err());
    }
}
