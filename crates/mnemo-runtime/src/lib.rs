//! `mnemo-runtime` – Collaborators and wiring for the episodic memory.
//!
//! `mnemo-memory` defines the memory and its seams; this crate supplies the
//! networked implementations and turns a [`Config`] into a ready
//! [`EpisodicMemory`][mnemo_memory::EpisodicMemory].
//!
//! # Modules
//!
//! - [`config`] – [`Config`]: the configuration vault at
//!   `~/.mnemo/config.toml` with `MNEMO_*` environment overrides.
//! - [`qdrant`] – [`QdrantIndex`]: a
//!   [`VectorIndex`][mnemo_memory::VectorIndex] backed by a Qdrant server.
//! - [`ollama`] – [`OllamaEmbedder`]: an
//!   [`Embedder`][mnemo_memory::Embedder] served by a local Ollama instance.
//! - [`builder`] – [`open_memory`] and [`build_embedder`]: config-driven
//!   assembly of store, index and embedder chain.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export
//!   to Jaeger, Grafana Tempo, or any OTLP-compatible collector.

pub mod builder;
pub mod config;
pub mod ollama;
pub mod qdrant;
pub mod telemetry;

pub use builder::{BuildError, build_embedder, open_memory};
pub use config::{Config, ConfigError, EmbeddingProvider};
pub use ollama::OllamaEmbedder;
pub use qdrant::{QdrantError, QdrantIndex};
pub use telemetry::{TracerProviderGuard, init_tracing};
