//! Config-driven wiring of an [`EpisodicMemory`].
//!
//! [`open_memory`] opens the SQLite document store at
//! [`Config::database_path`], picks the vector index and builds the
//! embedder chain:
//!
//! | `vector_url` | Vector index |
//! |---|---|
//! | empty | [`InMemoryVectorIndex`], re-filled from the document store on open |
//! | set | [`QdrantIndex`] on that server, collection created if missing |
//!
//! The session index is always restored from the document store so that
//! sessions from earlier runs stay listable.

use std::path::PathBuf;
use std::sync::Arc;

use mnemo_memory::{
    DocumentStore, Embedder, EpisodePayload, EpisodicMemory, FallbackEmbedder, HashEmbedder,
    InMemoryVectorIndex, SqliteDocumentStore, StoreError, VectorIndex,
};
use mnemo_types::MemoryError;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, EmbeddingProvider};
use crate::ollama::OllamaEmbedder;
use crate::qdrant::{QdrantError, QdrantIndex};

/// Text embedded once at start-up to learn the vector dimension.
const DIMENSION_PROBE: &str = "dimension probe";

/// Errors that can arise while opening the memory.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Failed to create data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to open document store: {0}")]
    Store(#[from] StoreError),
    #[error("Failed to prepare vector index: {0}")]
    Index(#[from] QdrantError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Embedder chain described by `config`.
///
/// The Ollama provider yields the primary model followed by
/// [`Config::fallback_model`] when one is set.  The fallback must produce
/// vectors of the primary's dimension: the chain pins the first length it
/// sees and rejects a model that disagrees.
pub fn build_embedder(config: &Config) -> Arc<dyn Embedder> {
    match config.embedding_provider {
        EmbeddingProvider::Hash => Arc::new(HashEmbedder::default()),
        EmbeddingProvider::Ollama => {
            let primary: Arc<dyn Embedder> =
                Arc::new(OllamaEmbedder::new(&config.embedding_url, &config.embedding_model));
            let mut chain = FallbackEmbedder::new(primary);
            if let Some(fallback) = config.fallback_model.as_deref()
                && !fallback.is_empty()
            {
                chain = chain.with_fallback(Arc::new(OllamaEmbedder::new(
                    &config.embedding_url,
                    fallback,
                )));
            }
            Arc::new(chain)
        }
    }
}

/// Open the episodic memory described by `config`.
///
/// # Errors
///
/// Fails when the data directory or SQLite file cannot be opened, when the
/// Qdrant collection cannot be checked or created, or when the session
/// index cannot be restored.
pub async fn open_memory(config: &Config) -> Result<EpisodicMemory, BuildError> {
    if let Some(parent) = config.database_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| BuildError::DataDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let documents = Arc::new(SqliteDocumentStore::open(&config.database_path)?);
    let embedder = build_embedder(config);

    let index: Arc<dyn VectorIndex> = if config.vector_url.is_empty() {
        warn!("no vector_url configured; using in-process vector index (rebuilt on every start)");
        let index = Arc::new(InMemoryVectorIndex::new());
        warm_index(documents.as_ref(), index.as_ref(), embedder.as_ref()).await?;
        index
    } else {
        info!(url = %config.vector_url, collection = %config.collection, "using Qdrant vector index");
        let api_key = Some(config.vector_api_key.clone());
        let index = QdrantIndex::new(&config.vector_url, &config.collection, api_key);
        match embedder.embed(DIMENSION_PROBE).await {
            Ok(probe) => index.ensure_collection(probe.len()).await?,
            Err(e) => warn!(error = %e, "cannot learn embedding dimension; assuming collection exists"),
        }
        Arc::new(index)
    };

    let memory = EpisodicMemory::new(documents, index, embedder);
    let sessions = memory.restore_sessions().await?;
    info!(sessions, "episodic memory ready");
    Ok(memory)
}

/// Embed every stored episode into `index`.
///
/// Stops at the first embedding failure with a warning; the memory still
/// opens, but older episodes are then not retrievable.
async fn warm_index(
    documents: &dyn DocumentStore,
    index: &dyn VectorIndex,
    embedder: &dyn Embedder,
) -> Result<(), BuildError> {
    let episodes = documents.scan().await?;
    let total = episodes.len();
    for episode in &episodes {
        let vector = match embedder.embed(&episode.content).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "embedding unavailable; in-process index left partial");
                return Ok(());
            }
        };
        if let Err(e) = index
            .upsert(&episode.episode_id, vector, EpisodePayload::from(episode))
            .await
        {
            warn!(episode_id = %episode.episode_id, error = %e, "failed to re-index episode");
        }
    }
    if total > 0 {
        info!(episodes = total, "in-process vector index rebuilt");
    }
    Ok(())
}
