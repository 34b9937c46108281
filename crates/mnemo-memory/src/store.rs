//! Episode document store.
//!
//! [`DocumentStore`] is the durable record collaborator: it persists full
//! [`Episode`]s and serves point lookups by id.  [`SqliteDocumentStore`]
//! implements it on a local SQLite database.
//!
//! # Storage layout
//!
//! A single table `episodes` is created (if it does not already exist) with
//! the following columns:
//!
//! | column     | type    | description                                   |
//! |------------|---------|-----------------------------------------------|
//! | id         | TEXT    | Episode id, primary key                       |
//! | seq        | INTEGER | Arrival order of the latest write             |
//! | session_id | TEXT    | Resolved session id                           |
//! | timestamp  | TEXT    | RFC-3339 episode time (UTC)                   |
//! | content    | TEXT    | Raw episode text                              |
//! | context    | TEXT    | JSON object holding the metadata snapshot     |
//!
//! Writing an existing id replaces the row (last write wins) and moves it to
//! the end of the arrival order.
//!
//! # Blocking
//!
//! `rusqlite` is synchronous.  Each trait method moves its query onto Tokio's
//! blocking pool with [`tokio::task::spawn_blocking`], so an episode write
//! overlaps the vector upsert instead of stalling the worker thread.  Calls
//! on one store still take turns on its single connection.
//!
//! # Example
//!
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use mnemo_memory::episode::Episode;
//! use mnemo_memory::store::{DocumentStore, SqliteDocumentStore};
//! use mnemo_types::MemoryItem;
//!
//! let store = SqliteDocumentStore::open_in_memory().unwrap();
//! let episode = Episode::from_item(&MemoryItem::new("e1", "lunch with Bob")).unwrap();
//! store.write(&episode).await.unwrap();
//!
//! let back = store.read("e1").await.unwrap().unwrap();
//! assert_eq!(back.content, "lunch with Bob");
//! # }
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mnemo_types::Metadata;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::info;

use crate::episode::Episode;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from document store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Context serialisation error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("Store task failed: {0}")]
    Task(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// DocumentStore trait
// ─────────────────────────────────────────────────────────────────────────────

/// Durable episode store with point lookups by id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist `episode`, replacing any record with the same id.
    async fn write(&self, episode: &Episode) -> Result<(), StoreError>;

    /// Fetch the episode stored under `id`, if any.
    async fn read(&self, id: &str) -> Result<Option<Episode>, StoreError>;

    /// Every stored episode in arrival order.
    async fn scan(&self) -> Result<Vec<Episode>, StoreError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// SqliteDocumentStore
// ─────────────────────────────────────────────────────────────────────────────

type RawRow = (String, String, String, String, String);

/// SQLite-backed [`DocumentStore`].
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDocumentStore {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening episode store");
        Self::init(Connection::open(path)?)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS episodes (
                id         TEXT    NOT NULL PRIMARY KEY,
                seq        INTEGER NOT NULL,
                session_id TEXT    NOT NULL,
                timestamp  TEXT    NOT NULL,
                content    TEXT    NOT NULL,
                context    TEXT    NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_episodes_session ON episodes (session_id, seq);",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Number of stored episodes.
    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM episodes", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

fn decode(row: RawRow) -> Result<Episode, StoreError> {
    let (id, session_id, ts_str, content, context_json) = row;
    let timestamp = ts_str
        .parse::<DateTime<Utc>>()
        .map_err(|e| StoreError::Corrupt {
            id: id.clone(),
            reason: format!("bad timestamp {ts_str:?}: {e}"),
        })?;
    let context: Metadata = serde_json::from_str(&context_json)?;
    Ok(Episode {
        episode_id: id,
        session_id,
        timestamp,
        content,
        context,
    })
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn write(&self, episode: &Episode) -> Result<(), StoreError> {
        let context = serde_json::to_string(&episode.context)?;
        let id = episode.episode_id.clone();
        let session_id = episode.session_id.clone();
        let timestamp = episode.timestamp.to_rfc3339();
        let content = episode.content.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO episodes (id, seq, session_id, timestamp, content, context)
                 VALUES (?1, (SELECT COALESCE(MAX(seq), 0) + 1 FROM episodes), ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     seq        = excluded.seq,
                     session_id = excluded.session_id,
                     timestamp  = excluded.timestamp,
                     content    = excluded.content,
                     context    = excluded.context",
                params![id, session_id, timestamp, content, context],
            )?;
            Ok(())
        })
        .await
    }

    async fn read(&self, id: &str) -> Result<Option<Episode>, StoreError> {
        let id = id.to_string();
        let row: Option<RawRow> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, session_id, timestamp, content, context
                         FROM episodes WHERE id = ?1",
                        params![id],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
                    )
                    .optional()?)
            })
            .await?;
        row.map(decode).transpose()
    }

    async fn scan(&self) -> Result<Vec<Episode>, StoreError> {
        let raw: Vec<RawRow> = self
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, session_id, timestamp, content, context
                     FROM episodes ORDER BY seq ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                })?;
                Ok(rows.collect::<Result<_, _>>()?)
            })
            .await?;
        raw.into_iter().map(decode).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mnemo_types::{MemoryItem, MetaValue};

    fn episode(id: &str, content: &str, session: &str) -> Episode {
        let item = MemoryItem::new(id, content)
            .with_timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 15).unwrap())
            .with_session(session)
            .with_importance(0.75);
        Episode::from_item(&item).unwrap()
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let ep = episode("e1", "lunch with Bob", "s1");
        store.write(&ep).await.unwrap();

        let back = store.read("e1").await.unwrap().unwrap();
        assert_eq!(back, ep);
        assert_eq!(back.context["importance"], MetaValue::Float(0.75));
    }

    #[tokio::test]
    async fn read_missing_returns_none() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        assert!(store.read("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rewrite_same_id_replaces_record() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.write(&episode("e1", "original", "s1")).await.unwrap();
        store.write(&episode("e1", "updated", "s1")).await.unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.read("e1").await.unwrap().unwrap().content, "updated");
    }

    #[tokio::test]
    async fn scan_returns_arrival_order() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.write(&episode("b", "first", "s1")).await.unwrap();
        store.write(&episode("a", "second", "s2")).await.unwrap();
        store.write(&episode("c", "third", "s1")).await.unwrap();
        // Re-adding moves the record to the end.
        store.write(&episode("b", "fourth", "s1")).await.unwrap();

        let ids: Vec<_> = store
            .scan()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.episode_id)
            .collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("episodes.db");
        {
            let store = SqliteDocumentStore::open(&path).unwrap();
            store.write(&episode("e1", "kept", "s1")).await.unwrap();
        }
        let store = SqliteDocumentStore::open(&path).unwrap();
        assert_eq!(store.read("e1").await.unwrap().unwrap().content, "kept");
    }

    #[tokio::test]
    async fn corrupt_timestamp_is_reported() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO episodes (id, seq, session_id, timestamp, content, context)
                 VALUES ('bad', 1, 'default', 'yesterday', 'x', '{}')",
                [],
            )
            .unwrap();
        assert!(matches!(
            store.read("bad").await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn empty_store_counts_zero() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_writes_all_land() {
        let store = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            tasks.spawn(async move {
                store
                    .write(&episode(&format!("e{i}"), "parallel", "s1"))
                    .await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }
        assert_eq!(store.count().unwrap(), 16);
        assert_eq!(store.scan().await.unwrap().len(), 16);
    }

    #[test]
    fn current_thread_runtime_serves_queries() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        rt.block_on(async {
            store.write(&episode("e1", "solo", "s1")).await.unwrap();
            assert_eq!(store.read("e1").await.unwrap().unwrap().content, "solo");
        });
    }
}
