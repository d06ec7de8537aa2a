//! Permission matrix and enforcer
//!
//! The matrix maps (role, capability string) to allow/deny. It is built once
//! at startup from configuration and is immutable for the life of a run; a
//! config reload constructs a new instance rather than mutating in place.
//!
//! Capability strings:
//! - `delegate`              submit tasks to the bus
//! - `receive:<action>`      accept tasks with a given action tag
//! - `receive:*`             accept any action tag
//! - `memory:read` / `memory:write`
//! - `knowledge:read` / `knowledge:write`
//! - `block`                 Guardian short-circuit of a live task

use crate::error::{CortexError, Result};
use crate::types::AgentRole;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Kind of access being attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
    Delegate,
    Block,
}

/// Class of resource the action targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    Memory,
    Knowledge,
    Task,
}

/// Capability string for an (action, resource) pair
fn capability_key(action: Action, resource: ResourceClass) -> &'static str {
    match (action, resource) {
        (Action::Read, ResourceClass::Memory) => "memory:read",
        (Action::Write, ResourceClass::Memory) => "memory:write",
        (Action::Read, ResourceClass::Knowledge) => "knowledge:read",
        (Action::Write, ResourceClass::Knowledge) => "knowledge:write",
        (Action::Delegate, _) => "delegate",
        (Action::Block, _) => "block",
        // Reading a task is enumeration, always permitted; writing one goes
        // through the bus state machine, not the matrix.
        (Action::Read, ResourceClass::Task) | (Action::Write, ResourceClass::Task) => "task",
    }
}

/// Immutable (role, capability) -> allow map
#[derive(Debug, Clone)]
pub struct PermissionMatrix {
    grants: HashMap<AgentRole, HashSet<String>>,
}

impl PermissionMatrix {
    /// Build a matrix from per-role capability lists
    ///
    /// Aborts (returns an error) when any known role is missing a row: a
    /// matrix without a required role is an unrecoverable startup condition.
    pub fn from_grants(grants: HashMap<AgentRole, HashSet<String>>) -> Result<Self> {
        for role in AgentRole::ALL {
            if !grants.contains_key(&role) {
                return Err(CortexError::Config(config::ConfigError::Message(format!(
                    "permission matrix missing required role '{}'",
                    role
                ))));
            }
        }
        Ok(Self { grants })
    }

    /// Raw capability lookup; default deny
    pub fn is_granted(&self, role: AgentRole, capability: &str) -> bool {
        self.grants
            .get(&role)
            .map(|caps| caps.contains(capability))
            .unwrap_or(false)
    }

    /// Default matrix for the standard 5-role deployment
    pub fn standard() -> Self {
        let mut grants: HashMap<AgentRole, HashSet<String>> = HashMap::new();
        let caps = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<HashSet<_>>();
        grants.insert(
            AgentRole::Brain,
            caps(&["delegate", "receive:*", "memory:read", "memory:write", "knowledge:read"]),
        );
        grants.insert(
            AgentRole::Builder,
            caps(&["delegate", "receive:build", "memory:read", "knowledge:read"]),
        );
        grants.insert(
            AgentRole::Researcher,
            caps(&[
                "delegate",
                "receive:research",
                "memory:read",
                "memory:write",
                "knowledge:read",
                "knowledge:write",
            ]),
        );
        grants.insert(
            AgentRole::FactChecker,
            caps(&["receive:verify", "memory:read", "knowledge:read", "knowledge:write"]),
        );
        grants.insert(
            AgentRole::Guardian,
            caps(&["block", "receive:review", "memory:read", "knowledge:read"]),
        );
        Self { grants }
    }
}

/// Pure permission predicate over an immutable matrix
#[derive(Debug, Clone)]
pub struct PermissionEnforcer {
    matrix: Arc<PermissionMatrix>,
}

impl PermissionEnforcer {
    pub fn new(matrix: PermissionMatrix) -> Self {
        Self {
            matrix: Arc::new(matrix),
        }
    }

    /// Whether `role` may perform `action` on `resource`
    pub fn allowed(&self, role: AgentRole, action: Action, resource: ResourceClass) -> bool {
        self.matrix.is_granted(role, capability_key(action, resource))
    }

    /// Whether `role` may receive tasks tagged `action_tag`
    pub fn may_receive(&self, role: AgentRole, action_tag: &str) -> bool {
        self.matrix.is_granted(role, "receive:*")
            || self
                .matrix
                .is_granted(role, &format!("receive:{}", action_tag))
    }

    /// `allowed`, lifted into a Result for call sites that must refuse
    pub fn require(&self, role: AgentRole, action: Action, resource: ResourceClass) -> Result<()> {
        if self.allowed(role, action, resource) {
            Ok(())
        } else {
            Err(CortexError::PermissionDenied {
                role,
                capability: capability_key(action, resource).to_string(),
            })
        }
    }
}
