//! Retrieval Ranker.
//!
//! Turns raw nearest-neighbour hits into the final ranked result list.
//!
//! ## Scoring
//!
//! For a hit with similarity `v`, age `a` and metadata importance `i`
//! (default `0.5`, not clamped):
//!
//! ```text
//! recency          = 0.5 ^ (a / 7 days)         (1.0 for a <= 0)
//! base_relevance   = 0.8 * v + 0.2 * recency
//! importance_weight = 0.8 + 0.4 * i
//! final_score      = base_relevance * importance_weight
//! ```
//!
//! ## Ordering
//!
//! Hits are sorted by `final_score` descending with a stable sort, so equal
//! scores keep the order the vector index returned them in.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use mnemo_types::{MemoryItem, Metadata};

use crate::filter::RetrieveFilter;
use crate::index::{EpisodePayload, VectorHit};

pub const SIMILARITY_WEIGHT: f64 = 0.8;
pub const RECENCY_WEIGHT: f64 = 0.2;
pub const IMPORTANCE_BASE: f64 = 0.8;
pub const IMPORTANCE_SPAN: f64 = 0.4;
pub const DEFAULT_IMPORTANCE: f64 = 0.5;

/// Age at which the recency score halves.
pub const RECENCY_HALF_LIFE_SECS: f64 = 7.0 * 24.0 * 60.0 * 60.0;

/// Candidates requested from the vector index per requested result.
pub const OVERFETCH_FACTOR: usize = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Score components
// ─────────────────────────────────────────────────────────────────────────────

/// Recency for an episode `age_secs` old: `1.0` at age zero (and for
/// timestamps in the future), halving every [`RECENCY_HALF_LIFE_SECS`].
pub fn recency_score(age_secs: f64) -> f64 {
    if age_secs.is_nan() || age_secs <= 0.0 {
        return 1.0;
    }
    0.5f64.powf(age_secs / RECENCY_HALF_LIFE_SECS)
}

/// Recency of `timestamp` as seen from `now`.
pub fn recency_at(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_ms = (now - timestamp).num_milliseconds();
    recency_score(age_ms as f64 / 1000.0)
}

/// `metadata["importance"]` when numeric, otherwise [`DEFAULT_IMPORTANCE`].
pub fn importance_of(metadata: &Metadata) -> f64 {
    metadata
        .get("importance")
        .and_then(|v| v.as_f64())
        .unwrap_or(DEFAULT_IMPORTANCE)
}

pub fn final_score(similarity: f64, recency: f64, importance: f64) -> f64 {
    let base_relevance = SIMILARITY_WEIGHT * similarity + RECENCY_WEIGHT * recency;
    let importance_weight = IMPORTANCE_BASE + IMPORTANCE_SPAN * importance;
    base_relevance * importance_weight
}

/// Number of candidates to request from the vector index for `limit` results.
pub fn overfetch(limit: usize) -> usize {
    limit.saturating_mul(OVERFETCH_FACTOR)
}

// ─────────────────────────────────────────────────────────────────────────────
// ScoredHit
// ─────────────────────────────────────────────────────────────────────────────

/// A hit with its score breakdown. Lives only for one retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredHit {
    pub episode_id: String,
    pub similarity: f64,
    pub recency: f64,
    pub importance: f64,
    pub final_score: f64,
    pub payload: EpisodePayload,
}

impl ScoredHit {
    pub fn score(hit: VectorHit, now: DateTime<Utc>) -> Self {
        let similarity = f64::from(hit.score);
        let recency = recency_at(hit.payload.timestamp, now);
        let importance = importance_of(&hit.payload.metadata);
        Self {
            episode_id: hit.id,
            similarity,
            recency,
            importance,
            final_score: final_score(similarity, recency, importance),
            payload: hit.payload,
        }
    }

    pub fn into_item(self) -> MemoryItem {
        self.payload.into()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// rank
// ─────────────────────────────────────────────────────────────────────────────

/// Filter, score, sort and truncate `hits`.
///
/// A hit survives only if its metadata satisfies `filter` and, when an
/// `allowed` id set is given, its id is in that set.  At most `limit` hits
/// are returned; fewer survivors simply produce a shorter list.
pub fn rank(
    hits: Vec<VectorHit>,
    filter: &RetrieveFilter,
    allowed: Option<&HashSet<String>>,
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<ScoredHit> {
    let mut scored: Vec<ScoredHit> = hits
        .into_iter()
        .filter(|hit| allowed.is_none_or(|ids| ids.contains(&hit.id)))
        .filter(|hit| filter.matches(&hit.payload.metadata))
        .map(|hit| ScoredHit::score(hit, now))
        .collect();
    scored.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
    scored.truncate(limit);
    scored
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
