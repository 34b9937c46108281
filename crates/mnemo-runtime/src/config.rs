//! Configuration Vault – reads/writes `~/.mnemo/config.toml`.
//!
//! Only the collaborator locations are configurable: where the document
//! store lives, how to reach the vector index, and which embedding models
//! to use.  Scoring weights and the over-fetch factor are fixed.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zeroize::Zeroize;

/// Errors that can arise while loading or saving the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Failed to write config at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Supported embedding backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Ollama `/api/embeddings`.
    #[default]
    Ollama,
    /// Offline feature-hashing embedder; no model server needed.
    Hash,
}

impl std::fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProvider::Ollama => write!(f, "ollama"),
            EmbeddingProvider::Hash => write!(f, "hash"),
        }
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(EmbeddingProvider::Ollama),
            "hash" => Ok(EmbeddingProvider::Hash),
            other => Err(format!("unknown embedding provider '{other}'")),
        }
    }
}

/// Persisted configuration stored in `~/.mnemo/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite file holding the episode records.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Base URL of the Qdrant vector index.  Empty selects the in-process
    /// index (vectors are then lost on exit).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vector_url: String,

    /// Qdrant API key (stored as plain text – users should restrict file
    /// permissions on `~/.mnemo/config.toml`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vector_api_key: String,

    /// Qdrant collection name.
    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default)]
    pub embedding_provider: EmbeddingProvider,

    /// Base URL of the Ollama instance serving embeddings.
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,

    /// Primary embedding model (e.g. "nomic-embed-text").
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Model tried when the primary fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("vector_url", &self.vector_url)
            .field(
                "vector_api_key",
                if self.vector_api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("collection", &self.collection)
            .field("embedding_provider", &self.embedding_provider)
            .field("embedding_url", &self.embedding_url)
            .field("embedding_model", &self.embedding_model)
            .field("fallback_model", &self.fallback_model)
            .finish()
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        self.vector_api_key.zeroize();
    }
}

fn default_database_path() -> PathBuf {
    mnemo_dir_for_home(&home_dir()).join("episodes.db")
}
fn default_collection() -> String {
    "episodes".to_string()
}
fn default_embedding_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            vector_url: String::new(),
            vector_api_key: String::new(),
            collection: default_collection(),
            embedding_provider: EmbeddingProvider::default(),
            embedding_url: default_embedding_url(),
            embedding_model: default_embedding_model(),
            fallback_model: None,
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn mnemo_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".mnemo")
}

/// Return the path to `~/.mnemo/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Build the config path relative to the given home directory.
pub fn config_path_for_home(home: &str) -> PathBuf {
    mnemo_dir_for_home(home).join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, ConfigError> {
    load_from(&config_path())
}

/// Load the config from a specific path, applying environment overrides.
pub fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg: Config = toml::from_str(&raw)?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `MNEMO_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `MNEMO_DATABASE_PATH` | `database_path` |
/// | `MNEMO_VECTOR_URL` | `vector_url` |
/// | `MNEMO_VECTOR_API_KEY` | `vector_api_key` |
/// | `MNEMO_COLLECTION` | `collection` |
/// | `MNEMO_EMBEDDING_URL` | `embedding_url` |
/// | `MNEMO_EMBEDDING_MODEL` | `embedding_model` |
/// | `MNEMO_EMBEDDING_PROVIDER` | `embedding_provider` (ignored if unknown) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MNEMO_DATABASE_PATH") {
        cfg.database_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("MNEMO_VECTOR_URL") {
        cfg.vector_url = v;
    }
    if let Ok(v) = std::env::var("MNEMO_VECTOR_API_KEY") {
        cfg.vector_api_key = v;
    }
    if let Ok(v) = std::env::var("MNEMO_COLLECTION") {
        cfg.collection = v;
    }
    if let Ok(v) = std::env::var("MNEMO_EMBEDDING_URL") {
        cfg.embedding_url = v;
    }
    if let Ok(v) = std::env::var("MNEMO_EMBEDDING_MODEL") {
        cfg.embedding_model = v;
    }
    if let Ok(v) = std::env::var("MNEMO_EMBEDDING_PROVIDER")
        && let Ok(provider) = v.parse::<EmbeddingProvider>() {
            cfg.embedding_provider = provider;
        }
}

/// Save the config to disk, creating `~/.mnemo/` if necessary.
pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
        // Restrict the config directory to the owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(write_err)?;
        }
    }
    let raw = toml::to_string_pretty(cfg)?;
    // Write the file with owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_debug_redacts_api_key() {
        let mut cfg = Config::default();
        cfg.vector_api_key = "qd-super-secret".to_string();
        let debug_str = format!("{:?}", cfg);
        assert!(!debug_str.contains("qd-super-secret"), "api key must not appear in debug output");
        assert!(debug_str.contains("<redacted>"));
    }

    #[test]
    fn config_debug_shows_not_set_for_empty_key() {
        let debug_str = format!("{:?}", Config::default());
        assert!(debug_str.contains("<not set>"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.vector_url = "http://qdrant:6333".to_string();
        cfg.fallback_model = Some("all-minilm".to_string());
        cfg.embedding_provider = EmbeddingProvider::Hash;
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.vector_url, "http://qdrant:6333");
        assert_eq!(loaded.collection, "episodes");
        assert_eq!(loaded.embedding_model, "nomic-embed-text");
        assert_eq!(loaded.fallback_model.as_deref(), Some("all-minilm"));
        assert_eq!(loaded.embedding_provider, EmbeddingProvider::Hash);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "collection = \"journal\"\n").unwrap();
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.collection, "journal");
        assert!(loaded.vector_url.is_empty());
        assert_eq!(loaded.embedding_provider, EmbeddingProvider::Ollama);
        assert!(loaded.database_path.ends_with("episodes.db"));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "collection = [").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn config_path_points_to_mnemo_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".mnemo"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn provider_parses_case_insensitively() {
        assert_eq!("HASH".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::Hash));
        assert_eq!(" ollama ".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::Ollama));
        assert!("openai".parse::<EmbeddingProvider>().is_err());
    }

    #[test]
    fn apply_env_overrides_changes_vector_url() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("MNEMO_VECTOR_URL", "http://index-host:6333") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.vector_url, "http://index-host:6333");
        unsafe { std::env::remove_var("MNEMO_VECTOR_URL") };
    }

    #[test]
    fn apply_env_overrides_changes_embedding_model() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("MNEMO_EMBEDDING_MODEL", "mxbai-embed-large") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.embedding_model, "mxbai-embed-large");
        unsafe { std::env::remove_var("MNEMO_EMBEDDING_MODEL") };
    }

    #[test]
    fn apply_env_overrides_ignores_unknown_provider() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("MNEMO_EMBEDDING_PROVIDER", "telepathy") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.embedding_provider, EmbeddingProvider::Ollama);
        unsafe { std::env::remove_var("MNEMO_EMBEDDING_PROVIDER") };
    }
}
