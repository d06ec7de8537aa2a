//! Embedding seam
//!
//! Embedding generation is an excluded collaborator's function: the core
//! receives already-computed vectors. This trait is the only contract —
//! `embed(text) -> vector` with a fixed dimensionality.

use crate::error::Result;
use async_trait::async_trait;

/// Interface for external embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Compute an embedding for the given text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Fixed dimensionality of vectors produced by this embedder
    fn dimension(&self) -> usize;
}
