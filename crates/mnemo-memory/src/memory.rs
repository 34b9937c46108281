//! Memory Facade.
//!
//! [`EpisodicMemory`] exposes the two public operations, [`add`] and
//! [`retrieve`], and sequences the collaborators behind them:
//!
//! ```text
//! add:       MemoryItem ─► Episode ─► embed(content)
//!                                   ├─► DocumentStore::write ┐ concurrently
//!                                   └─► VectorIndex::upsert  ┘
//!                                   ─► SessionIndex::record
//!
//! retrieve:  query ─► embed ─► VectorIndex::search(limit × 5, user_id)
//!                   ─► Structured Filter + session allow-list
//!                   ─► Retrieval Ranker ─► top `limit`
//! ```
//!
//! The two stores are written independently with no transaction spanning
//! them; if one write fails the other may already have landed.
//!
//! `add` and `retrieve_scored` each run inside a `tracing` span of the same
//! name.
//!
//! [`add`]: EpisodicMemory::add
//! [`retrieve`]: EpisodicMemory::retrieve

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use mnemo_types::{MemoryError, MemoryItem};
use tracing::{debug, instrument, warn};

use crate::embedding::{Embedder, EmbeddingError};
use crate::episode::Episode;
use crate::filter::RetrieveFilter;
use crate::index::{EpisodePayload, IndexError, VectorIndex};
use crate::ranker::{self, ScoredHit};
use crate::session::SessionIndex;
use crate::store::{DocumentStore, StoreError};

/// Result count used when the caller does not choose one.
pub const DEFAULT_LIMIT: usize = 5;

fn store_failed(e: StoreError) -> MemoryError {
    MemoryError::Persistence(format!("document store: {e}"))
}

fn index_failed(e: IndexError) -> MemoryError {
    MemoryError::Persistence(format!("vector index: {e}"))
}

fn embedding_failed(e: EmbeddingError) -> MemoryError {
    MemoryError::EmbeddingUnavailable(e.to_string())
}

/// Episodic memory over a document store, a vector index and an embedder.
pub struct EpisodicMemory {
    documents: Arc<dyn DocumentStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    sessions: SessionIndex,
}

impl EpisodicMemory {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            documents,
            index,
            embedder,
            sessions: SessionIndex::new(),
        }
    }

    /// Store a memory item as an episode and return its id.
    ///
    /// The item is validated and embedded before anything is written.  The
    /// document-store write and the vector upsert then run concurrently and
    /// both must finish.  The session index is updated last, so within a
    /// session episodes appear in the order their `add` calls completed.
    ///
    /// # Errors
    ///
    /// * [`MemoryError::InvalidEpisode`] for a malformed item (nothing written).
    /// * [`MemoryError::EmbeddingUnavailable`] when no model can embed the
    ///   content (nothing written).
    /// * [`MemoryError::Persistence`] when either store write fails.
    #[instrument(skip_all, fields(episode_id = %item.id))]
    pub async fn add(&self, item: MemoryItem) -> Result<String, MemoryError> {
        let episode = Episode::from_item(&item)?;
        let vector = self
            .embedder
            .embed(&episode.content)
            .await
            .map_err(embedding_failed)?;
        let payload = EpisodePayload::from(&episode);

        let (doc_result, index_result) = tokio::join!(
            self.documents.write(&episode),
            self.index.upsert(&episode.episode_id, vector, payload),
        );
        if let (Err(doc), Err(idx)) = (&doc_result, &index_result) {
            warn!(episode_id = %episode.episode_id, doc_error = %doc, index_error = %idx, "both episode writes failed");
        }
        doc_result.map_err(store_failed)?;
        index_result.map_err(index_failed)?;

        self.sessions.record(&episode.session_id, &episode.episode_id);
        debug!(
            episode_id = %episode.episode_id,
            session_id = %episode.session_id,
            model = self.embedder.name(),
            "episode added"
        );
        Ok(episode.episode_id)
    }

    /// Up to `limit` memory items most relevant to `query`, best first.
    ///
    /// A short (possibly empty) list is a valid result when filtering
    /// discards most candidates.
    pub async fn retrieve(
        &self,
        query: &str,
        limit: usize,
        filter: &RetrieveFilter,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        let scored = self.retrieve_scored(query, limit, filter).await?;
        Ok(scored.into_iter().map(ScoredHit::into_item).collect())
    }

    /// Like [`retrieve`][Self::retrieve] but keeps the score breakdown.
    #[instrument(skip_all, fields(limit = limit, query_len = query.len()))]
    pub async fn retrieve_scored(
        &self,
        query: &str,
        limit: usize,
        filter: &RetrieveFilter,
    ) -> Result<Vec<ScoredHit>, MemoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let allowed: Option<HashSet<String>> = filter
            .session_id
            .as_deref()
            .map(|s| self.sessions.episodes_for(s).into_iter().collect());

        let vector = self.embedder.embed(query).await.map_err(embedding_failed)?;
        let k = ranker::overfetch(limit);
        let hits = self
            .index
            .search(&vector, k, filter.index_filter().as_ref())
            .await
            .map_err(index_failed)?;
        let candidates = hits.len();

        let ranked = ranker::rank(hits, filter, allowed.as_ref(), limit, Utc::now());
        debug!(
            limit,
            requested = k,
            candidates,
            returned = ranked.len(),
            "retrieval ranked"
        );
        Ok(ranked)
    }

    /// Point lookup in the document store.
    pub async fn get(&self, episode_id: &str) -> Result<Option<Episode>, MemoryError> {
        self.documents.read(episode_id).await.map_err(store_failed)
    }

    /// Episode ids recorded for `session_id`, in arrival order.
    pub fn episodes_for(&self, session_id: &str) -> Vec<String> {
        self.sessions.episodes_for(session_id)
    }

    /// All session ids seen by this instance, sorted.
    pub fn sessions(&self) -> Vec<String> {
        self.sessions.sessions()
    }

    /// Full episodes of `session_id` in arrival order.
    ///
    /// Ids with no record in the document store are skipped.
    pub async fn session_episodes(&self, session_id: &str) -> Result<Vec<Episode>, MemoryError> {
        let mut episodes = Vec::new();
        for id in self.sessions.episodes_for(session_id) {
            match self.documents.read(&id).await.map_err(store_failed)? {
                Some(ep) => episodes.push(ep),
                None => warn!(episode_id = %id, session_id, "session references missing episode"),
            }
        }
        Ok(episodes)
    }

    /// Rebuild the session index from the document store.
    ///
    /// Returns the number of sessions restored.
    pub async fn restore_sessions(&self) -> Result<usize, MemoryError> {
        let episodes = self.documents.scan().await.map_err(store_failed)?;
        self.sessions.restore(&episodes);
        let restored = self.sessions.len();
        debug!(episodes = episodes.len(), sessions = restored, "session index restored");
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::index::InMemoryVectorIndex;
    use crate::store::SqliteDocumentStore;

    fn memory() -> EpisodicMemory {
        EpisodicMemory::new(
            Arc::new(SqliteDocumentStore::open_in_memory().unwrap()),
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(HashEmbedder::default()),
        )
    }

    #[tokio::test]
    async fn add_returns_id_and_records_session() {
        let mem = memory();
        let id = mem
            .add(MemoryItem::new("e1", "lunch with Bob").with_session("s1").with_importance(0.9))
            .await
            .unwrap();
        assert_eq!(id, "e1");
        assert_eq!(mem.episodes_for("s1"), vec!["e1"]);
        assert_eq!(mem.get("e1").await.unwrap().unwrap().content, "lunch with Bob");
    }

    #[tokio::test]
    async fn invalid_item_writes_nothing() {
        let mem = memory();
        let mut item = MemoryItem::new("e1", "x").with_session("s1");
        item.timestamp = None;
        assert!(matches!(mem.add(item).await, Err(MemoryError::InvalidEpisode(_))));
        assert!(mem.get("e1").await.unwrap().is_none());
        assert!(mem.sessions().is_empty());
    }

    #[tokio::test]
    async fn zero_limit_returns_empty() {
        let mem = memory();
        mem.add(MemoryItem::new("e1", "lunch")).await.unwrap();
        assert!(mem.retrieve("lunch", 0, &RetrieveFilter::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn session_episodes_resolves_records() {
        let mem = memory();
        mem.add(MemoryItem::new("a", "first").with_session("s1")).await.unwrap();
        mem.add(MemoryItem::new("b", "second").with_session("s1")).await.unwrap();
        let eps = mem.session_episodes("s1").await.unwrap();
        let contents: Vec<_> = eps.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    // ── spans ──

    #[derive(Clone, Default)]
    struct SpanNames(Arc<std::sync::Mutex<Vec<String>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SpanNames {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::span::Id,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            self.0.lock().unwrap().push(attrs.metadata().name().to_string());
        }
    }

    #[tokio::test]
    async fn add_and_retrieve_open_spans() {
        use tracing_subscriber::layer::SubscriberExt;

        let names = SpanNames::default();
        let subscriber = tracing_subscriber::registry().with(names.clone());
        let _default = tracing::subscriber::set_default(subscriber);

        let mem = memory();
        mem.add(MemoryItem::new("e1", "lunch with Bob")).await.unwrap();
        mem.retrieve("lunch", 3, &RetrieveFilter::new()).await.unwrap();

        let seen = names.0.lock().unwrap().clone();
        assert!(seen.iter().any(|n| n == "add"), "spans: {seen:?}");
        assert!(seen.iter().any(|n| n == "retrieve_scored"), "spans: {seen:?}");
    }
}
