//! Text-to-vector embedding seam.
//!
//! The model itself is an external collaborator: anything implementing
//! [`EmbeddingProvider`] can back semantic search. Implementations produce
//! L2-normalized vectors of exactly [`EMBEDDING_DIM`] dimensions; all methods
//! are synchronous.
//!
//! When no provider is configured (or a provider fails), the engine degrades
//! to lexical-only search instead of failing outright.

use crate::error::{EngineError, Result};

/// Number of dimensions in the embedding vectors.
pub const EMBEDDING_DIM: usize = 384;

/// Trait for embedding text into vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into an L2-normalized vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings. Implementations may override for
    /// batched inference.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Validate a provider-produced vector before it reaches the store.
pub fn check_dimensions(embedding: &[f32]) -> Result<()> {
    if embedding.len() != EMBEDDING_DIM {
        return Err(EngineError::Embedding(format!(
            "expected {EMBEDDING_DIM} dimensions, provider returned {}",
            embedding.len()
        )));
    }
    Ok(())
}

/// Convert an f32 embedding slice to raw bytes for sqlite-vec.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            embedding.len() * std::mem::size_of::<f32>(),
        )
    }
}

/// Cosine similarity recovered from the L2 distance of two unit vectors.
///
/// For normalized vectors, d² = 2 − 2·cos, so cos = 1 − d²/2. Clamped to
/// [0, 1]; negative similarity carries no ranking value here.
pub fn l2_distance_to_cosine(distance: f64) -> f64 {
    (1.0 - (distance * distance) / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_to_bytes_length() {
        let v = vec![0.5f32; EMBEDDING_DIM];
        assert_eq!(embedding_to_bytes(&v).len(), EMBEDDING_DIM * 4);
    }

    #[test]
    fn check_dimensions_rejects_wrong_size() {
        assert!(check_dimensions(&vec![0.0; EMBEDDING_DIM]).is_ok());
        let err = check_dimensions(&vec![0.0; 128]).unwrap_err();
        assert!(matches!(err, EngineError::Embedding(_)));
    }

    #[test]
    fn identical_vectors_have_cosine_one() {
        assert!((l2_distance_to_cosine(0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn orthogonal_unit_vectors_have_cosine_zero() {
        // Two orthogonal unit vectors are sqrt(2) apart
        let d = std::f64::consts::SQRT_2;
        assert!(l2_distance_to_cosine(d).abs() < 1e-12);
    }
}
