//! Layered memory engine
//!
//! - **store**: shared arena of tiered memory items
//! - **scoring**: pure composite relevance scoring
//! - **knowledge**: verified, non-decaying fact cache
//! - **retrieval**: permission-filtered ranked retrieval
//! - **consolidation**: background promote/merge/prune job

pub mod consolidation;
pub mod knowledge;
pub mod retrieval;
pub mod scoring;
pub mod store;

pub use consolidation::{ConsolidationConfig, ConsolidationJob, ConsolidationReport};
pub use knowledge::{FactDraft, KnowledgeCache};
pub use retrieval::{HitSource, RetrievalService, ScoredHit};
pub use store::MemoryStore;
