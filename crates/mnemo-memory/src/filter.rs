//! Structured Filter.
//!
//! Evaluates caller-supplied constraints against an episode's metadata.
//! [`RetrieveFilter`] enumerates the recognised keys (`user_id`,
//! `session_id`, an inclusive `since`/`until` time range) plus an open map
//! of extra equality constraints.  Key constraints are equality checks
//! against the metadata value under the same key; the time range is checked
//! against the `timestamp` entry (epoch seconds).  An absent key never
//! matches.  An empty filter matches everything, and evaluation never
//! fails.
//!
//! The filter runs on the over-fetched candidate set returned by the vector
//! index.  Only `user_id` is also pushed into the index query (see
//! [`RetrieveFilter::index_filter`]).

use chrono::{DateTime, Utc};
use mnemo_types::{MetaValue, Metadata};
use serde::{Deserialize, Serialize};

use crate::episode::epoch_seconds;
use crate::index::IndexFilter;

/// Constraints accepted by `retrieve`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrieveFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<MetaValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Earliest accepted episode timestamp (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    /// Latest accepted episode timestamp (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    /// Additional `metadata[key] == value` constraints.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub extra: Metadata,
}

impl RetrieveFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(mut self, user_id: impl Into<MetaValue>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn for_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn since(mut self, earliest: DateTime<Utc>) -> Self {
        self.since = Some(earliest);
        self
    }

    pub fn until(mut self, latest: DateTime<Utc>) -> Self {
        self.until = Some(latest);
        self
    }

    pub fn with_eq(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none()
            && self.session_id.is_none()
            && self.since.is_none()
            && self.until.is_none()
            && self.extra.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        matches(metadata, self)
    }

    /// The part of this filter the vector index can evaluate itself.
    pub fn index_filter(&self) -> Option<IndexFilter> {
        self.user_id.clone().map(|user_id| IndexFilter { user_id })
    }
}

/// `true` when `metadata` satisfies every constraint in `filter`.
pub fn matches(metadata: &Metadata, filter: &RetrieveFilter) -> bool {
    if let Some(user) = &filter.user_id
        && !key_matches(metadata, "user_id", user)
    {
        return false;
    }
    if let Some(session) = &filter.session_id
        && !key_matches(metadata, "session_id", &MetaValue::Text(session.clone()))
    {
        return false;
    }
    if (filter.since.is_some() || filter.until.is_some())
        && !in_time_range(metadata, filter.since, filter.until)
    {
        return false;
    }
    filter
        .extra
        .iter()
        .all(|(key, expected)| key_matches(metadata, key, expected))
}

fn in_time_range(
    metadata: &Metadata,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> bool {
    let Some(ts) = metadata.get("timestamp").and_then(MetaValue::as_f64) else {
        return false;
    };
    since.is_none_or(|s| ts >= epoch_seconds(s)) && until.is_none_or(|u| ts <= epoch_seconds(u))
}

fn key_matches(metadata: &Metadata, key: &str, expected: &MetaValue) -> bool {
    metadata.get(key).is_some_and(|actual| actual.matches(expected))
}
