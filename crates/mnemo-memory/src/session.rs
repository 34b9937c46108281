//! Session Index.
//!
//! In-process mapping from session id to the ordered list of episode ids
//! recorded for it.  Insertion order is arrival order.  The index is owned
//! by the [`EpisodicMemory`][crate::memory::EpisodicMemory] instance and is
//! not persisted; see
//! [`restore_sessions`][crate::memory::EpisodicMemory::restore_sessions] for
//! rebuilding it from the document store.
//!
//! Recording is not idempotent: recording the same episode id twice appends
//! it twice.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::episode::Episode;

/// Thread-safe session-to-episodes index.
///
/// A single lock guards the whole map so every [`record`][Self::record] is
/// atomic and concurrent appends are never lost.
#[derive(Debug, Default)]
pub struct SessionIndex {
    sessions: RwLock<HashMap<String, Vec<String>>>,
}

impl SessionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `episode_id` to the sequence for `session_id`, creating the
    /// sequence if needed.
    pub fn record(&self, session_id: &str, episode_id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(session_id.to_string())
            .or_default()
            .push(episode_id.to_string());
    }

    /// Episode ids recorded for `session_id` in arrival order; empty for an
    /// unknown session.
    pub fn episodes_for(&self, session_id: &str) -> Vec<String> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// All known session ids, sorted.
    pub fn sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Replace the whole index with `episodes`, taken in arrival order.
    pub fn restore<'a>(&self, episodes: impl IntoIterator<Item = &'a Episode>) {
        let mut rebuilt: HashMap<String, Vec<String>> = HashMap::new();
        for ep in episodes {
            rebuilt
                .entry(ep.session_id.clone())
                .or_default()
                .push(ep.episode_id.clone());
        }
        *self.sessions.write().unwrap_or_else(PoisonError::into_inner) = rebuilt;
    }

    /// Number of sessions tracked.
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_types::MemoryItem;
    use std::sync::Arc;

    #[test]
    fn records_in_arrival_order() {
        let idx = SessionIndex::new();
        idx.record("s1", "a");
        idx.record("s1", "b");
        idx.record("s1", "c");
        assert_eq!(idx.episodes_for("s1"), vec!["a", "b", "c"]);
    }

    #[test]
    fn unknown_session_is_empty() {
        let idx = SessionIndex::new();
        assert!(idx.episodes_for("nope").is_empty());
        assert!(idx.is_empty());
    }

    #[test]
    fn sessions_are_kept_apart() {
        let idx = SessionIndex::new();
        idx.record("s1", "a");
        idx.record("s2", "b");
        assert_eq!(idx.episodes_for("s1"), vec!["a"]);
        assert_eq!(idx.episodes_for("s2"), vec!["b"]);
        assert_eq!(idx.sessions(), vec!["s1", "s2"]);
        assert_eq!(idx.len(), 2);
    }

    // Duplicate ids are appended again; the index does not de-duplicate.
    #[test]
    fn duplicate_record_appends_twice() {
        let idx = SessionIndex::new();
        idx.record("s1", "a");
        idx.record("s1", "a");
        assert_eq!(idx.episodes_for("s1"), vec!["a", "a"]);
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        let idx = Arc::new(SessionIndex::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let idx = idx.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        idx.record(&format!("s{}", t % 2), &format!("{t}-{i}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(idx.episodes_for("s0").len(), 400);
        assert_eq!(idx.episodes_for("s1").len(), 400);
    }

    #[test]
    fn restore_replaces_contents() {
        let idx = SessionIndex::new();
        idx.record("stale", "x");
        let eps: Vec<Episode> = [("a", "s1"), ("b", "s2"), ("c", "s1")]
            .iter()
            .map(|(id, s)| Episode::from_item(&MemoryItem::new(*id, "text").with_session(*s)).unwrap())
            .collect();
        idx.restore(&eps);
        assert!(idx.episodes_for("stale").is_empty());
        assert_eq!(idx.episodes_for("s1"), vec!["a", "c"]);
        assert_eq!(idx.episodes_for("s2"), vec!["b"]);
    }
}
