//! Vector index seam.
//!
//! [`VectorIndex`] is the nearest-neighbour collaborator: it stores one
//! embedding per episode together with an [`EpisodePayload`] and answers
//! similarity queries with scored hits.  [`InMemoryVectorIndex`] is the
//! in-process implementation (exact cosine scan); a networked
//! implementation lives in `mnemo-runtime`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mnemo_types::{MemoryItem, MetaValue, Metadata};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::episode::Episode;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from vector index operations.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Query vector must be non-empty")]
    EmptyVector,
    #[error("Vector index backend error: {0}")]
    Backend(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Payload and hits
// ─────────────────────────────────────────────────────────────────────────────

/// Everything needed to rebuild a [`MemoryItem`] from a search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodePayload {
    pub episode_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// The episode's context bag.
    pub metadata: Metadata,
}

impl From<&Episode> for EpisodePayload {
    fn from(ep: &Episode) -> Self {
        Self {
            episode_id: ep.episode_id.clone(),
            content: ep.content.clone(),
            timestamp: ep.timestamp,
            metadata: ep.context.clone(),
        }
    }
}

impl From<EpisodePayload> for MemoryItem {
    fn from(p: EpisodePayload) -> Self {
        MemoryItem {
            id: p.episode_id,
            content: p.content,
            timestamp: Some(p.timestamp),
            metadata: p.metadata,
        }
    }
}

/// One raw nearest-neighbour result.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    /// Similarity as reported by the index; not guaranteed to lie in `[0, 1]`.
    pub score: f32,
    pub payload: EpisodePayload,
}

/// Constraint pushed down into the index query.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexFilter {
    pub user_id: MetaValue,
}

impl IndexFilter {
    pub fn matches(&self, metadata: &Metadata) -> bool {
        metadata
            .get("user_id")
            .is_some_and(|v| v.matches(&self.user_id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// VectorIndex trait
// ─────────────────────────────────────────────────────────────────────────────

/// Approximate nearest-neighbour store keyed by episode id.
///
/// # Contract
///
/// * `upsert` replaces any previous vector and payload stored under `id`.
/// * `search` returns at most `k` hits ordered by descending score, keeping
///   only payloads accepted by `filter` when one is given.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        payload: EpisodePayload,
    ) -> Result<(), IndexError>;

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&IndexFilter>,
    ) -> Result<Vec<VectorHit>, IndexError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Cosine similarity
// ─────────────────────────────────────────────────────────────────────────────

/// Compute the cosine similarity between two equal-length vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` if either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// InMemoryVectorIndex
// ─────────────────────────────────────────────────────────────────────────────

/// Exact-scan cosine index held in process memory.
///
/// Rows are kept in id order, so hits with equal scores come back in id
/// order.  Rows whose dimension differs from the query are skipped.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    rows: RwLock<BTreeMap<String, (Vec<f32>, EpisodePayload)>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vectors stored.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        payload: EpisodePayload,
    ) -> Result<(), IndexError> {
        if vector.is_empty() {
            return Err(IndexError::EmptyVector);
        }
        self.rows.write().await.insert(id.to_string(), (vector, payload));
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&IndexFilter>,
    ) -> Result<Vec<VectorHit>, IndexError> {
        if query.is_empty() {
            return Err(IndexError::EmptyVector);
        }
        let rows = self.rows.read().await;
        let mut hits: Vec<VectorHit> = rows
            .iter()
            .filter(|(_, (vector, payload))| {
                vector.len() == query.len() && filter.is_none_or(|f| f.matches(&payload.metadata))
            })
            .map(|(id, (vector, payload))| VectorHit {
                id: id.clone(),
                score: cosine_similarity(vector, query),
                payload: payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
