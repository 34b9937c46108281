//! Episode Model.
//!
//! An [`Episode`] is the canonical, immutable record of one thing that
//! happened: timestamped content plus the metadata bag it arrived with,
//! grouped into a session.  Episodes are derived from caller-facing
//! [`MemoryItem`]s by [`Episode::from_item`] and converted back with
//! [`Episode::to_item`].
//!
//! The derived `context` is a snapshot of the item's metadata with two
//! keys normalised so that filtering and ranking can work from metadata
//! alone:
//!
//! | key          | value                                             |
//! |--------------|---------------------------------------------------|
//! | `timestamp`  | the item timestamp as fractional epoch seconds    |
//! | `session_id` | the resolved session id (`"default"` when absent) |

use chrono::{DateTime, Utc};
use mnemo_types::{MemoryError, MemoryItem, MetaValue, Metadata};
use serde::{Deserialize, Serialize};

/// Session assigned to items whose metadata carries no `session_id`.
pub const DEFAULT_SESSION: &str = "default";

/// A single stored unit of episodic memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Caller-supplied identifier, unique across the store.
    pub episode_id: String,
    /// Grouping key; [`DEFAULT_SESSION`] when the item did not name one.
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    /// Raw text; the unit that gets embedded.
    pub content: String,
    /// Snapshot of the item's metadata bag (see module docs).
    pub context: Metadata,
}

impl Episode {
    /// Derive an episode from a memory item.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidEpisode`] when the timestamp is missing.
    /// Any id and content string, empty included, is accepted verbatim.
    pub fn from_item(item: &MemoryItem) -> Result<Self, MemoryError> {
        let timestamp = item.timestamp.ok_or_else(|| {
            MemoryError::InvalidEpisode(format!("episode {} has no timestamp", item.id))
        })?;

        let session_id = match item.metadata.get("session_id") {
            None | Some(MetaValue::Null) => DEFAULT_SESSION.to_string(),
            Some(value) => value.to_string(),
        };

        let mut context = item.metadata.clone();
        context.insert("session_id".into(), MetaValue::Text(session_id.clone()));
        context.insert("timestamp".into(), MetaValue::Float(epoch_seconds(timestamp)));

        Ok(Self {
            episode_id: item.id.clone(),
            session_id,
            timestamp,
            content: item.content.clone(),
            context,
        })
    }

    /// Convert back into the caller-facing shape.
    pub fn to_item(&self) -> MemoryItem {
        MemoryItem {
            id: self.episode_id.clone(),
            content: self.content.clone(),
            timestamp: Some(self.timestamp),
            metadata: self.context.clone(),
        }
    }
}

/// Fractional seconds since the Unix epoch.
pub fn epoch_seconds(ts: DateTime<Utc>) -> f64 {
    ts.timestamp_micros() as f64 / 1_000_000.0
}
