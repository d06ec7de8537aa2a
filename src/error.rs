//! Error types for the Cortex task bus and memory engine
//!
//! This module provides structured error handling using thiserror for
//! error definitions and anyhow for error propagation at the edges.
//!
//! Taxonomy notes:
//! - An empty queue poll is **not** an error; `TaskBus::claim` returns `None`.
//! - `PermissionDenied` is never retried automatically; it is surfaced to the
//!   caller unchanged.
//! - `InvalidTransition` indicates bus misuse and is fatal to the call, not
//!   to the process.

use crate::types::{AgentRole, TaskStatus};
use thiserror::Error;

/// Main error type for Cortex operations
#[derive(Error, Debug)]
pub enum CortexError {
    /// Role lacks the capability required for the attempted operation
    #[error("Permission denied: role '{role}' lacks capability '{capability}'")]
    PermissionDenied { role: AgentRole, capability: String },

    /// Illegal task status transition
    #[error("Invalid transition: {from:?} -> {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    /// Referenced task, memory item, or fact does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Sub-agent pool asked to run more tasks than its concurrency bound
    #[error("Capacity exceeded: requested {requested} sub-tasks, limit is {limit}")]
    CapacityExceeded { limit: usize, requested: usize },

    /// Task exceeded one of its declared budget/time/scope limits
    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    /// Embedding dimensionality differs from the store-wide dimensionality
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimension { expected: usize, actual: usize },

    /// Invalid operation (e.g., retrieval with k = 0)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Cortex operations
pub type Result<T> = std::result::Result<T, CortexError>;

/// Convert anyhow::Error to CortexError
impl From<anyhow::Error> for CortexError {
    fn from(err: anyhow::Error) -> Self {
        CortexError::Other(err.to_string())
    }
}
