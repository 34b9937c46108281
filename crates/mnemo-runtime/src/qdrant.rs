//! [`QdrantIndex`] – [`VectorIndex`] backed by a Qdrant server over REST.
//!
//! | Operation | Request |
//! |---|---|
//! | [`QdrantIndex::ensure_collection`] | `GET /collections/{c}`, then `PUT /collections/{c}` if missing |
//! | [`VectorIndex::upsert`] | `PUT /collections/{c}/points?wait=true` |
//! | [`VectorIndex::search`] | `POST /collections/{c}/points/search` |
//!
//! Qdrant point ids must be unsigned integers or UUIDs, so each episode id
//! is mapped to a name-based UUID (v5); the original id travels in the
//! payload as `episode_id`.  A `user_id` [`IndexFilter`] becomes a `must`
//! match on `metadata.user_id`.  Float and null user ids cannot be matched
//! server-side and are filtered after the response instead.
//!
//! # Example
//!
//! ```rust,no_run
//! use mnemo_runtime::qdrant::QdrantIndex;
//!
//! let index = QdrantIndex::new("http://localhost:6333", "episodes", None);
//! // Requires a running Qdrant instance – skipped in unit tests.
//! // index.ensure_collection(768).await?;
//! ```

use async_trait::async_trait;
use mnemo_memory::{EpisodePayload, IndexError, IndexFilter, VectorHit, VectorIndex};
use mnemo_types::MetaValue;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from Qdrant operations.
#[derive(Error, Debug)]
pub enum QdrantError {
    /// The HTTP request to the Qdrant server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// A hit carried a payload that is not an episode.
    #[error("Point {id} has an unreadable payload: {reason}")]
    BadPayload { id: String, reason: String },
}

impl From<QdrantError> for IndexError {
    fn from(e: QdrantError) -> Self {
        IndexError::Backend(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Point<'a> {
    id: Uuid,
    vector: &'a [f32],
    payload: &'a EpisodePayload,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    points: [Point<'a>; 1],
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// QdrantIndex
// ─────────────────────────────────────────────────────────────────────────────

/// Async Qdrant REST client bound to a single collection.
pub struct QdrantIndex {
    base_url: String,
    collection: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl QdrantIndex {
    /// Create a client for `collection` on the server at `base_url`
    /// (e.g. `"http://localhost:6333"`).  `api_key` is sent as the
    /// `api-key` header when present.
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client: reqwest::Client::new(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    /// Create the collection with cosine distance and `dim`-sized vectors
    /// unless it already exists.
    ///
    /// # Errors
    ///
    /// Returns [`QdrantError::Http`] if either request fails.
    pub async fn ensure_collection(&self, dim: usize) -> Result<(), QdrantError> {
        let url = self.collection_url();
        let probe = self.request(reqwest::Method::GET, &url).send().await?;
        if probe.status() != reqwest::StatusCode::NOT_FOUND {
            probe.error_for_status()?;
            debug!(collection = %self.collection, "Qdrant collection present");
            return Ok(());
        }
        self.request(reqwest::Method::PUT, &url)
            .json(&json!({ "vectors": { "size": dim, "distance": "Cosine" } }))
            .send()
            .await?
            .error_for_status()?;
        info!(collection = %self.collection, dim, "Qdrant collection created");
        Ok(())
    }

    async fn upsert_point(
        &self,
        id: &str,
        vector: &[f32],
        payload: &EpisodePayload,
    ) -> Result<(), QdrantError> {
        let url = format!("{}/points?wait=true", self.collection_url());
        let body = UpsertRequest {
            points: [Point {
                id: point_id(id),
                vector,
                payload,
            }],
        };
        self.request(reqwest::Method::PUT, &url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn search_points(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&IndexFilter>,
    ) -> Result<Vec<VectorHit>, QdrantError> {
        let url = format!("{}/points/search", self.collection_url());
        let body = SearchRequest {
            vector: query,
            limit: k,
            with_payload: true,
            filter: filter.and_then(filter_clause),
        };
        let response: SearchResponse = self
            .request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let hits = into_hits(response)?;
        Ok(match filter {
            Some(f) => hits.into_iter().filter(|h| f.matches(&h.payload.metadata)).collect(),
            None => hits,
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        payload: EpisodePayload,
    ) -> Result<(), IndexError> {
        if vector.is_empty() {
            return Err(IndexError::EmptyVector);
        }
        Ok(self.upsert_point(id, &vector, &payload).await?)
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
        if k == 0 {
            return Ok(Vec::new());
        }
        Ok(self.search_points(query, k, filter).await?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Stable Qdrant point id for an episode id.
pub fn point_id(episode_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, episode_id.as_bytes())
}

/// Qdrant `filter` clause for `filter`, or `None` when the value type has
/// no exact-match form in Qdrant.
fn filter_clause(filter: &IndexFilter) -> Option<Value> {
    let value = match &filter.user_id {
        MetaValue::Text(s) => json!(s),
        MetaValue::Int(i) => json!(i),
        MetaValue::Bool(b) => json!(b),
        MetaValue::Float(_) | MetaValue::Null => return None,
    };
    Some(json!({
        "must": [ { "key": "metadata.user_id", "match": { "value": value } } ]
    }))
}

fn into_hits(response: SearchResponse) -> Result<Vec<VectorHit>, QdrantError> {
    response
        .result
        .into_iter()
        .map(|point| {
            let raw_id = match &point.id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let payload: EpisodePayload = point
                .payload
                .ok_or_else(|| QdrantError::BadPayload {
                    id: raw_id.clone(),
                    reason: "missing payload".into(),
                })
                .and_then(|p| {
                    serde_json::from_value(p).map_err(|e| QdrantError::BadPayload {
                        id: raw_id.clone(),
                        reason: e.to_string(),
                    })
                })?;
            Ok(VectorHit {
                id: payload.episode_id.clone(),
                score: point.score,
                payload,
            })
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
