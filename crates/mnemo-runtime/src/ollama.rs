//! [`OllamaEmbedder`] – [`Embedder`] served by a local
//! [Ollama](https://ollama.com) instance (`http://localhost:11434`).
//!
//! Sends `POST /api/embeddings` with `{ "model", "prompt" }` and reads the
//! `embedding` array from the reply.  Every failure, including an empty
//! vector, is reported as [`EmbeddingError::Backend`] tagged with the model
//! name so a [`FallbackEmbedder`](mnemo_memory::FallbackEmbedder) can move
//! on to the next model.

use async_trait::async_trait;
use mnemo_memory::{Embedder, EmbeddingError};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Async client for Ollama's embeddings endpoint, bound to one model.
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    /// Create an embedder pointing at `base_url` and using `model`
    /// (e.g. `"nomic-embed-text"`).
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    fn backend_error(&self, reason: impl ToString) -> EmbeddingError {
        EmbeddingError::Backend {
            model: self.model.clone(),
            reason: reason.to_string(),
        }
    }

    async fn request(&self, text: &str) -> Result<EmbeddingResponse, reqwest::Error> {
        let url = format!("{}/api/embeddings", self.base_url);
        self.client
            .post(&url)
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self.request(text).await.map_err(|e| self.backend_error(e))?;
        if response.embedding.is_empty() {
            return Err(self.backend_error("empty embedding returned"));
        }
        Ok(response.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_prompt_field() {
        let json = serde_json::to_value(EmbeddingRequest {
            model: "nomic-embed-text",
            prompt: "lunch with Bob",
        })
        .unwrap();
        assert_eq!(json["model"], "nomic-embed-text");
        assert_eq!(json["prompt"], "lunch with Bob");
    }

    #[test]
    fn response_without_embedding_parses_as_empty() {
        let parsed: EmbeddingResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.embedding.is_empty());
        let parsed: EmbeddingResponse =
            serde_json::from_str(r#"{"embedding":[0.1,-0.2,0.3]}"#).unwrap();
        assert_eq!(parsed.embedding.len(), 3);
    }

    #[test]
    fn name_is_model() {
        let e = OllamaEmbedder::new("http://localhost:11434/", "all-minilm");
        assert_eq!(e.name(), "all-minilm");
        assert_eq!(e.base_url, "http://localhost:11434");
    }

    #[tokio::test]
    async fn unreachable_server_reports_model_name() {
        let e = OllamaEmbedder::new("http://127.0.0.1:1", "nomic-embed-text");
        match e.embed("hello").await {
            Err(EmbeddingError::Backend { model, .. }) => assert_eq!(model, "nomic-embed-text"),
            other => panic!("expected backend error, got {other:?}"),
        }
    }
}
