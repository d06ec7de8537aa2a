//! Composite memory scoring — semantic, recency, and importance
//!
//! All functions are pure: for fixed inputs (item, query embedding, strategy,
//! timestamp) the score is reproducible, so tests freeze the clock instead of
//! mocking hidden state.

use crate::types::{KnowledgeFact, MemoryItem, Strategy};
use chrono::{DateTime, Utc};

/// Recency half-life in days: an item untouched for 7 days scores exactly 0.5
pub const HALF_LIFE_DAYS: f64 = 7.0;

/// Cosine similarity between two vectors
///
/// Returns 0.0 for zero-norm or mismatched-length inputs rather than
/// propagating an error; a degenerate embedding should rank last, not crash
/// retrieval.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Semantic component: cosine similarity mapped from [-1,1] to [0,1]
pub fn semantic_score(item_embedding: &[f32], query_embedding: &[f32]) -> f32 {
    (cosine_similarity(item_embedding, query_embedding) + 1.0) / 2.0
}

/// Recency component: exponential decay `2^(-age_days / 7)` from last access
pub fn recency_score(last_access: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    let age_days = (now - last_access).num_milliseconds().max(0) as f64 / 86_400_000.0;
    (-age_days / HALF_LIFE_DAYS).exp2() as f32
}

/// Weighted composite of the three components under the given strategy
pub fn composite_score(semantic: f32, recency: f32, importance: f32, strategy: Strategy) -> f32 {
    let (w_sem, w_rec, w_imp) = strategy.weights();
    w_sem * semantic + w_rec * recency + w_imp * importance
}

/// Score a memory item against a query embedding
pub fn score_item(
    item: &MemoryItem,
    query_embedding: &[f32],
    strategy: Strategy,
    now: DateTime<Utc>,
) -> f32 {
    composite_score(
        semantic_score(&item.embedding, query_embedding),
        recency_score(item.last_access, now),
        item.importance(),
        strategy,
    )
}

/// Score a knowledge fact against a query embedding
///
/// Facts carry the no-decay flag: recency is pinned to 1.0, and a verified
/// claim counts as maximally important.
pub fn score_fact(fact: &KnowledgeFact, query_embedding: &[f32], strategy: Strategy) -> f32 {
    composite_score(
        semantic_score(&fact.embedding, query_embedding),
        1.0,
        1.0,
        strategy,
    )
}
