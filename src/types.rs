//! Core data types for the Cortex task bus and memory engine
//!
//! This module defines the fundamental data structures used throughout cortex:
//! agent roles, task messages and their status machine, tiered memory items,
//! and verified knowledge facts. These types form the foundation of the
//! multi-agent coordination core.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for tasks on the bus
///
/// Wraps a UUID to provide type safety and prevent mixing task IDs
/// with other UUID-based identifiers in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

/// Unique identifier for memory items
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub Uuid);

/// Unique identifier for knowledge facts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactId(pub Uuid);

macro_rules! impl_id {
    ($name:ident) => {
        impl $name {
            /// Create a new random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse an id from a string
            pub fn from_string(s: &str) -> std::result::Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

impl_id!(TaskId);
impl_id!(MemoryId);
impl_id!(FactId);

/// Agent roles in the fixed 5-role architecture
///
/// A closed set: adding a role means adding a variant and a permission-matrix
/// row, never a subclass. Role-specific behavior lives in lookup tables keyed
/// by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// User-facing orchestrator; constructs scoped tasks and writes results
    Brain,

    /// Implementation specialist
    Builder,

    /// Claim verification specialist; may write knowledge facts
    FactChecker,

    /// Research and synthesis specialist; may write memory and knowledge
    Researcher,

    /// Safety role holding the `block` capability
    Guardian,
}

impl AgentRole {
    /// All roles, used by startup validation of the permission matrix
    pub const ALL: [AgentRole; 5] = [
        AgentRole::Brain,
        AgentRole::Builder,
        AgentRole::FactChecker,
        AgentRole::Researcher,
        AgentRole::Guardian,
    ];

    /// Config-facing name (matches the serde rename)
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Brain => "brain",
            AgentRole::Builder => "builder",
            AgentRole::FactChecker => "fact_checker",
            AgentRole::Researcher => "researcher",
            AgentRole::Guardian => "guardian",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "brain" => Ok(AgentRole::Brain),
            "builder" => Ok(AgentRole::Builder),
            "fact_checker" => Ok(AgentRole::FactChecker),
            "researcher" => Ok(AgentRole::Researcher),
            "guardian" => Ok(AgentRole::Guardian),
            other => Err(format!("unknown agent role: {}", other)),
        }
    }
}

/// Memory tier classification driving retention and decay policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    /// Freshly written, highest churn
    Working,

    /// Survived the first promotion threshold
    ShortTerm,

    /// High-importance durable memory
    LongTerm,
}

/// Qualitative importance signals stamped on a memory item
///
/// Each signal contributes a fixed weight; item importance is the capped sum
/// of its signal weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceSignal {
    /// User explicitly asked for this to be remembered
    UserExplicit,

    /// A decision was made
    Decision,

    /// A mistake was corrected
    ErrorCorrection,

    /// A stated user preference
    Preference,

    /// Topic recurred across turns
    Repetition,
}

impl ImportanceSignal {
    /// Fixed contribution of this signal to item importance
    pub fn weight(&self) -> f32 {
        match self {
            ImportanceSignal::UserExplicit => 0.9,
            ImportanceSignal::Preference => 0.85,
            ImportanceSignal::Decision => 0.8,
            ImportanceSignal::ErrorCorrection => 0.8,
            ImportanceSignal::Repetition => 0.6,
        }
    }
}

/// Named weighting scheme for composite retrieval scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Even blend of semantic, recency, and importance
    Balanced,

    /// Favors recently accessed items
    Recency,

    /// Favors high-importance items
    Importance,

    /// Fingerprint lookup in the knowledge cache first; falls back to
    /// balanced semantic scoring over memory items on a miss
    Exact,
}

impl Strategy {
    /// Weight triple (semantic, recency, importance)
    ///
    /// `Exact` returns the balanced weights used by its fallback path.
    pub fn weights(&self) -> (f32, f32, f32) {
        match self {
            Strategy::Balanced | Strategy::Exact => (0.4, 0.3, 0.3),
            Strategy::Recency => (0.3, 0.5, 0.2),
            Strategy::Importance => (0.3, 0.2, 0.5),
        }
    }
}

/// A single tiered memory item
///
/// Embedding dimensionality is constant across the store; the store rejects
/// writes that disagree with the dimensionality pinned by the first insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Unique identifier
    pub id: MemoryId,

    /// Textual content
    pub content: String,

    /// Opaque embedding vector (produced by an external embedder)
    pub embedding: Vec<f32>,

    /// Current tier
    pub tier: MemoryTier,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last retrieval access (drives the recency signal)
    pub last_access: DateTime<Utc>,

    /// Qualitative importance signals
    pub signals: BTreeSet<ImportanceSignal>,

    /// Role that wrote the item
    pub owner: AgentRole,
}

impl MemoryItem {
    /// Composite importance: capped sum of signal weights
    pub fn importance(&self) -> f32 {
        let sum: f32 = self.signals.iter().map(|s| s.weight()).sum();
        sum.min(1.0)
    }
}

/// A memory write request, before the store assigns identity and timestamps
///
/// Carried inside task results so the Permission Enforcer can gate the write
/// independently of task completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDraft {
    /// Textual content
    pub content: String,

    /// Embedding vector
    pub embedding: Vec<f32>,

    /// Importance signals to stamp
    #[serde(default)]
    pub signals: BTreeSet<ImportanceSignal>,
}

/// A verified, non-decaying claim distinct from ordinary memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeFact {
    /// Unique identifier
    pub id: FactId,

    /// Content fingerprint used for deduplication and exact lookup
    pub fingerprint: String,

    /// The verified claim text
    pub claim: String,

    /// Embedding of the claim
    pub embedding: Vec<f32>,

    /// Source citations backing the claim
    pub citations: Vec<String>,

    /// Role that verified the claim
    pub verified_by: AgentRole,

    /// Verification timestamp
    pub verified_at: DateTime<Utc>,

    /// Recency never reduces a fact's score (always true)
    pub no_decay: bool,

    /// Bumped each time the fact is superseded in place
    pub version: u32,
}

/// Content fingerprint: SHA-256 over lowercased, whitespace-collapsed text
///
/// Normalization makes the exact-strategy lookup robust to trivial
/// formatting differences between the stored claim and the query.
pub fn content_fingerprint(text: &str) -> String {
    let normalized = text
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let digest = Sha256::digest(normalized.as_bytes());
    format!("{:x}", digest)
}

/// Task status lifecycle
///
/// `Pending -> InProgress -> {Completed | Failed | NeedsReview}` and
/// `NeedsReview -> {Completed | Failed}`. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted, waiting in the destination's inbox
    Pending,

    /// Claimed by the destination role
    InProgress,

    /// Finished with a result attached
    Completed,

    /// Finished without a result; reason recorded
    Failed,

    /// Requires explicit human or Guardian resolution
    NeedsReview,
}

impl TaskStatus {
    /// Whether a transition to `next` is legal
    pub fn can_transition(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, NeedsReview)
                | (NeedsReview, Completed)
                | (NeedsReview, Failed)
        )
    }

    /// Terminal states are never re-entered
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Optional budget bounds attached to a task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskConstraints {
    /// Maximum spend in abstract cost units
    pub max_cost: Option<f64>,

    /// Maximum wall-clock time in seconds
    pub max_time_secs: Option<u64>,

    /// Maximum fan-out / scope size
    pub max_scope: Option<usize>,
}

impl TaskConstraints {
    /// Check observed usage against the declared bounds
    ///
    /// Returns `ConstraintViolation` naming the first violated constraint.
    pub fn check(&self, cost: f64, elapsed_secs: u64, scope: usize) -> crate::error::Result<()> {
        if let Some(max) = self.max_cost {
            if cost > max {
                return Err(crate::error::CortexError::ConstraintViolation(format!(
                    "max_cost exceeded: {:.2} > {:.2}",
                    cost, max
                )));
            }
        }
        if let Some(max) = self.max_time_secs {
            if elapsed_secs > max {
                return Err(crate::error::CortexError::ConstraintViolation(format!(
                    "max_time exceeded: {}s > {}s",
                    elapsed_secs, max
                )));
            }
        }
        if let Some(max) = self.max_scope {
            if scope > max {
                return Err(crate::error::CortexError::ConstraintViolation(format!(
                    "max_scope exceeded: {} > {}",
                    scope, max
                )));
            }
        }
        Ok(())
    }

    /// Constraint-derived deadline for sub-agent fan-out, if any
    pub fn deadline(&self) -> Option<std::time::Duration> {
        self.max_time_secs.map(std::time::Duration::from_secs)
    }
}

/// Scoped context snapshot carried by a task
///
/// Always a value copy: later mutation of the source can never retroactively
/// change an already-dispatched message. Memory/fact references are by id so
/// downstream roles cannot mutate what they were shown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskContext {
    /// Role-scoped context fields (subset of the candidate context)
    pub fields: serde_json::Map<String, Value>,

    /// Memory items referenced by this context (value-copied ids)
    #[serde(default)]
    pub memory_refs: Vec<MemoryId>,

    /// Knowledge facts referenced by this context
    #[serde(default)]
    pub fact_refs: Vec<FactId>,
}

/// Result attached to a completed task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResult {
    /// Opaque result payload
    pub data: Value,

    /// Memory writes proposed by the responding role; each is gated
    /// independently by the Permission Enforcer
    #[serde(default)]
    pub proposed_memories: Vec<MemoryDraft>,
}

/// A routed task on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Unique, immutable task id
    pub id: TaskId,

    /// Sending role
    pub source: AgentRole,

    /// Destination role
    pub destination: AgentRole,

    /// Action tag (checked against `receive:<action>` permissions)
    pub action: String,

    /// Opaque structured payload
    pub payload: Value,

    /// Scoped context snapshot
    pub context: TaskContext,

    /// Optional budget bounds
    pub constraints: TaskConstraints,

    /// Current lifecycle status
    pub status: TaskStatus,

    /// Present only when status is Completed
    pub result: Option<TaskResult>,

    /// Failure or review reason
    pub error: Option<String>,

    /// Submission timestamp
    pub created_at: DateTime<Utc>,

    /// Claim timestamp
    pub claimed_at: Option<DateTime<Utc>>,

    /// Terminal-transition timestamp (drives retention sweeps)
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentMessage {
    /// Whether the task is past its retention window and may be archived
    pub fn retention_elapsed(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        match self.completed_at {
            Some(done) if self.status.is_terminal() => now - done >= retention,
            _ => false,
        }
    }
}

/// Fields needed to submit a task; the bus assigns id, status, and timestamps
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub source: AgentRole,
    pub destination: AgentRole,
    pub action: String,
    pub payload: Value,
    pub context: TaskContext,
    pub constraints: TaskConstraints,
}
