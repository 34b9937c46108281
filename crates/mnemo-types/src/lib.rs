use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// A single scalar value stored in an episode's metadata bag.
///
/// Serialised untagged, so metadata reads and writes as plain JSON scalars
/// (`{"importance": 0.9, "user_id": "alice"}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetaValue {
    /// Numeric view of the value; `None` for non-numeric variants.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Int(i) => Some(*i as f64),
            MetaValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Equality used by metadata constraints.
    ///
    /// `Int` and `Float` compare numerically (`Int(1)` matches `Float(1.0)`);
    /// every other cross-variant pair is unequal.
    pub fn matches(&self, other: &MetaValue) -> bool {
        match (self, other) {
            (MetaValue::Int(_) | MetaValue::Float(_), MetaValue::Int(_) | MetaValue::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Null => write!(f, "null"),
            MetaValue::Bool(b) => write!(f, "{b}"),
            MetaValue::Int(i) => write!(f, "{i}"),
            MetaValue::Float(x) => write!(f, "{x}"),
            MetaValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Text(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Text(v)
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<i32> for MetaValue {
    fn from(v: i32) -> Self {
        MetaValue::Int(v as i64)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

/// String-keyed metadata bag attached to every memory item.
pub type Metadata = BTreeMap<String, MetaValue>;

/// Caller-facing memory item: what `add` accepts and `retrieve` returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub content: String,
    /// Point in time the item describes. Required by `add`; modelled as an
    /// `Option` so a missing timestamp can be rejected instead of defaulted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl MemoryItem {
    /// Build an item stamped with the current UTC time and no metadata.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            timestamp: Some(Utc::now()),
            metadata: Metadata::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_session(self, session_id: impl Into<String>) -> Self {
        self.with_meta("session_id", session_id.into())
    }

    pub fn with_user(self, user_id: impl Into<String>) -> Self {
        self.with_meta("user_id", user_id.into())
    }

    /// Importance is expected in `[0, 1]` but is stored as given.
    pub fn with_importance(self, importance: f64) -> Self {
        self.with_meta("importance", importance)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.metadata.get("session_id").and_then(MetaValue::as_str)
    }
}

/// Error taxonomy surfaced by the episodic memory facade.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemoryError {
    /// Malformed input to `add`; rejected before any write.
    #[error("Invalid episode: {0}")]
    InvalidEpisode(String),

    /// A document-store or vector-index write (or read) failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Neither the primary nor any fallback embedding model produced a vector.
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
}
