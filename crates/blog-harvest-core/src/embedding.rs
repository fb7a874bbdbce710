//! Embedding provider trait, vector validation, and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, the [`validate_embedding`] gate every vector must pass before
//! it is attached to an article, and pure helpers for similarity and BLOB
//! serialization.
//!
//! Concrete providers (fastembed, OpenAI, Ollama) live in the
//! `blog-harvest` app crate.

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

/// Trait for embedding providers.
///
/// Implementations are constructed once at process start and shared
/// read-only (behind an `Arc`) by the classification service.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"bge-base-en-v1.5"`).
    fn model_name(&self) -> &str;

    /// Returns the expected vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    ///
    /// Vectors are returned as produced by the model; callers validate
    /// them with [`validate_embedding`].
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Why a text could not be turned into a usable vector.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmbeddingError {
    #[error("invalid embedding dimension: expected {expected}, got {actual}")]
    WrongDimension { expected: usize, actual: usize },
    #[error("non-finite value at index {index}")]
    NonFinite { index: usize },
    #[error("embedding is the zero vector")]
    ZeroVector,
    #[error("embedding model failed: {0}")]
    Model(String),
}

/// Check that a model output is usable for similarity ranking.
///
/// Rejects vectors of the wrong length, vectors with any NaN or infinite
/// component, and the all-zero vector.
///
/// # Example
///
/// ```rust
/// use blog_harvest_core::embedding::{validate_embedding, EmbeddingError};
///
/// assert!(validate_embedding(&[0.1, 0.2, 0.3], 3).is_ok());
/// assert_eq!(
///     validate_embedding(&[0.1, f32::NAN, 0.3], 3),
///     Err(EmbeddingError::NonFinite { index: 1 })
/// );
/// ```
pub fn validate_embedding(vector: &[f32], expected_dims: usize) -> Result<(), EmbeddingError> {
    if vector.len() != expected_dims {
        return Err(EmbeddingError::WrongDimension {
            expected: expected_dims,
            actual: vector.len(),
        });
    }
    if let Some(index) = vector.iter().position(|v| !v.is_finite()) {
        return Err(EmbeddingError::NonFinite { index });
    }
    if vector.iter().all(|v| *v == 0.0) {
        return Err(EmbeddingError::ZeroVector);
    }
    Ok(())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing
/// a BLOB of `vec.len() × 4` bytes.
///
/// # Example
///
/// ```rust
/// use blog_harvest_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths, and zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
