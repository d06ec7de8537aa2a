//! Agent task bus
//!
//! - **permissions**: immutable matrix and pure enforcement predicate
//! - **scope**: role-appropriate context value-copies
//! - **routing**: the durable queue and status state machine

pub mod permissions;
pub mod routing;
pub mod scope;

pub use permissions::{Action, PermissionEnforcer, PermissionMatrix, ResourceClass};
pub use routing::{BusStats, TaskBus};
pub use scope::{CandidateContext, ScopePolicy};
