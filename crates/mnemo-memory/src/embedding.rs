//! Embedding seam.
//!
//! [`Embedder`] maps text to a fixed-size vector.  [`FallbackEmbedder`]
//! chains several embedders and substitutes the next one transparently when
//! a model fails; only when every model fails does the caller see
//! [`EmbeddingError::AllFailed`].  The chain pins the length of the first
//! vector it returns: a later vector of another length counts as a failure
//! of that model, so a fallback never feeds the index vectors of a
//! different dimension.
//!
//! [`HashEmbedder`] is a deterministic, dependency-free embedder based on
//! signed feature hashing of word tokens and character trigrams.  It needs
//! no model server, which makes it the offline choice and the default in
//! tests.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

/// Errors that can arise from embedding operations.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding model {model} failed: {reason}")]
    Backend { model: String, reason: String },
    #[error("All embedding models failed: {0}")]
    AllFailed(String),
    #[error("Embedding model {model} returned {got} dimensions, expected {expected}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        got: usize,
    },
}

/// Text-to-vector model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Human-readable model name, used in logs and errors.
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HashEmbedder
// ─────────────────────────────────────────────────────────────────────────────

pub const DEFAULT_HASH_DIM: usize = 256;

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic feature-hashing embedder.
///
/// Each lowercase alphanumeric word contributes to one bucket, and each
/// character trigram of `#word#` contributes at half weight.  The sign of
/// a contribution comes from the top bit of the hash.  The result is
/// L2-normalised; text without any word yields the zero vector.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    /// `dim` is raised to at least 1.
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let h = fnv1a(feature.as_bytes());
        let bucket = (h % self.dim as u64) as usize;
        let sign = if h >> 63 == 1 { -1.0 } else { 1.0 };
        vector[bucket] += sign * weight;
    }

    /// Synchronous core of [`Embedder::embed`].
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        let lowered = text.to_lowercase();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.add_feature(&mut vector, word, WORD_WEIGHT);
            let padded: Vec<char> = std::iter::once('#')
                .chain(word.chars())
                .chain(std::iter::once('#'))
                .collect();
            for tri in padded.windows(3) {
                let tri: String = tri.iter().collect();
                self.add_feature(&mut vector, &tri, TRIGRAM_WEIGHT);
            }
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIM)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_text(text))
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME))
}

// ─────────────────────────────────────────────────────────────────────────────
// FallbackEmbedder
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered chain of embedders; the first success of the pinned dimension
/// wins.
#[derive(Clone)]
pub struct FallbackEmbedder {
    chain: Vec<Arc<dyn Embedder>>,
    dim: OnceLock<usize>,
}

impl FallbackEmbedder {
    pub fn new(primary: Arc<dyn Embedder>) -> Self {
        Self {
            chain: vec![primary],
            dim: OnceLock::new(),
        }
    }

    /// Append a model to try after every model already in the chain.
    pub fn with_fallback(mut self, fallback: Arc<dyn Embedder>) -> Self {
        self.chain.push(fallback);
        self
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Vector length fixed by the first successful embedding, if any yet.
    pub fn dimension(&self) -> Option<usize> {
        self.dim.get().copied()
    }

    fn check_dimension(&self, model: &dyn Embedder, vector: &[f32]) -> Result<(), EmbeddingError> {
        let expected = *self.dim.get_or_init(|| vector.len());
        if vector.len() == expected {
            Ok(())
        } else {
            Err(EmbeddingError::DimensionMismatch {
                model: model.name().to_string(),
                expected,
                got: vector.len(),
            })
        }
    }
}

#[async_trait]
impl Embedder for FallbackEmbedder {
    fn name(&self) -> &str {
        self.chain.first().map_or("none", |e| e.name())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut failures = Vec::new();
        for model in &self.chain {
            let result = model
                .embed(text)
                .await
                .and_then(|v| self.check_dimension(model.as_ref(), &v).map(|()| v));
            match result {
                Ok(vector) => return Ok(vector),
                Err(e) => {
                    warn!(model = model.name(), error = %e, "embedding model failed; trying next");
                    failures.push(e.to_string());
                }
            }
        }
        if failures.is_empty() {
            return Err(EmbeddingError::AllFailed("no embedding models configured".into()));
        }
        Err(EmbeddingError::AllFailed(failures.join("; ")))
    }
}
