//! Cortex - Agent Task Bus and Layered Memory Engine
//!
//! An in-process component library coordinating a small fixed set of
//! specialized agent roles:
//! - Permission-checked task routing with a strict status lifecycle
//! - Role-scoped context snapshots for every dispatched task
//! - Composite memory scoring (semantic / recency / importance strategies)
//! - A verified knowledge cache with fingerprint deduplication
//! - Background consolidation (promote, merge, prune) off the hot path
//! - Bounded sub-agent fan-out with partial-completion degradation
//!
//! # Architecture
//!
//! The system is organized into several layers:
//! - **Types**: Core data structures (AgentMessage, MemoryItem, KnowledgeFact)
//! - **Bus**: Permission matrix, context scoping, task routing
//! - **Memory**: Store, scoring, retrieval, knowledge cache, consolidation
//! - **Pool**: Fan-out/fan-in sub-agent execution
//!
//! # Example
//!
//! ```ignore
//! use cortex::{CoreConfig, PermissionEnforcer, TaskBus, TaskDraft};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CoreConfig::load(Some("cortex.toml".as_ref()))?;
//!     let enforcer = Arc::new(PermissionEnforcer::new(config.matrix()?));
//!     let bus = TaskBus::new(enforcer, config.task_retention());
//!
//!     let task_id = bus.submit(TaskDraft { /* ... */ }).await?;
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod memory;
pub mod pool;
pub mod types;

// Re-export commonly used types
pub use bus::{
    Action, BusStats, CandidateContext, PermissionEnforcer, PermissionMatrix, ResourceClass,
    ScopePolicy, TaskBus,
};
pub use config::CoreConfig;
pub use embeddings::Embedder;
pub use error::{CortexError, Result};
pub use memory::{
    ConsolidationConfig, ConsolidationJob, ConsolidationReport, FactDraft, HitSource,
    KnowledgeCache, MemoryStore, RetrievalService, ScoredHit,
};
pub use pool::{FanInOutcome, PoolConfig, SubAgentPool, SubResult, SubTask};
pub use types::{
    AgentMessage, AgentRole, FactId, ImportanceSignal, KnowledgeFact, MemoryDraft, MemoryId,
    MemoryItem, MemoryTier, Strategy, TaskConstraints, TaskContext, TaskDraft, TaskId, TaskResult,
    TaskStatus,
};
