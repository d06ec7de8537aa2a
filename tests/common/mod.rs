//! Shared fixtures for integration tests

use async_trait::async_trait;
use cortex::{CortexError, Embedder};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Deterministic embedder returning canned vectors by exact text match
///
/// Unknown texts get a stable byte-derived unit vector, so fixtures never
/// depend on registration order.
pub struct CannedEmbedder {
    dimension: usize,
    canned: Mutex<HashMap<String, Vec<f32>>>,
}

impl CannedEmbedder {
    pub fn new(dimension: usize) -> Arc<Self> {
        Arc::new(Self {
            dimension,
            canned: Mutex::new(HashMap::new()),
        })
    }

    pub async fn register(&self, text: &str, vector: Vec<f32>) {
        assert_eq!(vector.len(), self.dimension);
        self.canned.lock().await.insert(text.to_string(), vector);
    }
}

#[async_trait]
impl Embedder for CannedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CortexError> {
        if let Some(v) = self.canned.lock().await.get(text) {
            return Ok(v.clone());
        }
        let mut v = vec![0.0f32; self.dimension];
        for (i, b) in text.bytes().enumerate() {
            v[i % self.dimension] += b as f32;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        Ok(v)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
