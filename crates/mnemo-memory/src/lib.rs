//! `mnemo-memory` – episodic memory for agents and assistants.
//!
//! Records timestamped episodes grouped into sessions and retrieves the
//! ones most relevant to a query by combining semantic similarity, recency
//! decay, importance weighting and structured filtering.
//!
//! # Modules
//!
//! - [`episode`] – [`Episode`][episode::Episode]: the canonical record and
//!   its derivation from a [`MemoryItem`][mnemo_types::MemoryItem].
//! - [`session`] – [`SessionIndex`][session::SessionIndex]: session id to
//!   ordered episode ids.
//! - [`filter`] – [`RetrieveFilter`][filter::RetrieveFilter]: user, session,
//!   time-range and free-form equality constraints over episode metadata.
//! - [`ranker`] – scoring (`0.8·similarity + 0.2·recency`, scaled by
//!   `0.8 + 0.4·importance`), stable sorting and truncation.
//! - [`store`] – [`DocumentStore`][store::DocumentStore] and its SQLite
//!   implementation.
//! - [`index`] – [`VectorIndex`][index::VectorIndex] and an in-process
//!   cosine implementation.
//! - [`embedding`] – [`Embedder`][embedding::Embedder], the offline
//!   [`HashEmbedder`][embedding::HashEmbedder] and the
//!   [`FallbackEmbedder`][embedding::FallbackEmbedder] chain.
//! - [`memory`] – [`EpisodicMemory`][memory::EpisodicMemory]: the `add` /
//!   `retrieve` facade tying everything together.

pub mod embedding;
pub mod episode;
pub mod filter;
pub mod index;
pub mod memory;
pub mod ranker;
pub mod session;
pub mod store;

pub use embedding::{Embedder, EmbeddingError, FallbackEmbedder, HashEmbedder};
pub use episode::{DEFAULT_SESSION, Episode};
pub use filter::RetrieveFilter;
pub use index::{EpisodePayload, InMemoryVectorIndex, IndexError, IndexFilter, VectorHit, VectorIndex};
pub use memory::{DEFAULT_LIMIT, EpisodicMemory};
pub use ranker::ScoredHit;
pub use session::SessionIndex;
pub use store::{DocumentStore, SqliteDocumentStore, StoreError};
