//! Context scoping — minimal, role-appropriate value-copies
//!
//! Every dispatched task carries a `TaskContext` produced here: a subset of
//! the full candidate context filtered through the destination role's field
//! allow-list, deep-copied so later mutation of the source can never
//! retroactively change an already-dispatched message. Absence of a field is
//! not an error; downstream roles treat missing context as unknown.

use crate::types::{AgentRole, FactId, MemoryId, TaskContext};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Full candidate context assembled by the orchestrator before scoping
#[derive(Debug, Clone, Default)]
pub struct CandidateContext {
    /// Conversation history, memory hits, tool state, and anything else the
    /// orchestrator gathered; keyed by field name
    pub fields: serde_json::Map<String, Value>,

    /// Memory items the candidate context was built from
    pub memory_refs: Vec<MemoryId>,

    /// Knowledge facts the candidate context was built from
    pub fact_refs: Vec<FactId>,
}

impl CandidateContext {
    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }
}

/// Per-role field allow-lists
#[derive(Debug, Clone)]
pub struct ScopePolicy {
    allow: HashMap<AgentRole, HashSet<String>>,
}

impl ScopePolicy {
    pub fn new(allow: HashMap<AgentRole, HashSet<String>>) -> Self {
        Self { allow }
    }

    /// Default policy for the standard 5-role deployment
    pub fn standard() -> Self {
        let fields = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<HashSet<_>>();
        let mut allow = HashMap::new();
        allow.insert(
            AgentRole::Brain,
            fields(&["conversation_history", "memory_hits", "knowledge_hits", "tool_state"]),
        );
        allow.insert(AgentRole::Builder, fields(&["task_brief", "tool_state", "memory_hits"]));
        allow.insert(
            AgentRole::Researcher,
            fields(&["task_brief", "memory_hits", "knowledge_hits"]),
        );
        allow.insert(AgentRole::FactChecker, fields(&["task_brief", "knowledge_hits"]));
        allow.insert(
            AgentRole::Guardian,
            fields(&["task_brief", "conversation_history", "memory_hits"]),
        );
        Self { allow }
    }

    /// Produce the scoped value-copy for `role`
    ///
    /// The output never contains a field outside the role's allow-list.
    pub fn scope(&self, role: AgentRole, candidate: &CandidateContext) -> TaskContext {
        let allowed = self.allow.get(&role);
        let mut fields = serde_json::Map::new();
        if let Some(allowed) = allowed {
            for (name, value) in &candidate.fields {
                if allowed.contains(name) {
                    fields.insert(name.clone(), value.clone());
                }
            }
        }
        TaskContext {
            fields,
            memory_refs: candidate.memory_refs.clone(),
            fact_refs: candidate.fact_refs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate() -> CandidateContext {
        CandidateContext::default()
            .with_field("conversation_history", json!(["turn one", "turn two"]))
            .with_field("memory_hits", json!([{"id": "m1", "content": "note"}]))
            .with_field("tool_state", json!({"cwd": "/work"}))
            .with_field("secrets", json!({"api_key": "sk-test"}))
    }

    #[test]
    fn test_output_never_exceeds_allow_list() {
        let policy = ScopePolicy::standard();
        let candidate = candidate();
        for role in AgentRole::ALL {
            let scoped = policy.scope(role, &candidate);
            for field in scoped.fields.keys() {
                assert!(
                    policy.allow[&role].contains(field),
                    "{} leaked into {} context",
                    field,
                    role
                );
            }
            // "secrets" is on no allow-list
            assert!(!scoped.fields.contains_key("secrets"));
        }
    }

    #[test]
    fn test_missing_fields_are_simply_absent() {
        let policy = ScopePolicy::standard();
        let sparse = CandidateContext::default().with_field("task_brief", json!("do the thing"));
        let scoped = policy.scope(AgentRole::Researcher, &sparse);
        assert_eq!(scoped.fields.len(), 1);
        assert!(!scoped.fields.contains_key("memory_hits"));
    }

    #[test]
    fn test_scoped_context_is_a_value_copy() {
        let policy = ScopePolicy::standard();
        let mut candidate = candidate();
        let scoped = policy.scope(AgentRole::Builder, &candidate);

        // Mutating the source after dispatch must not change the snapshot
        candidate
            .fields
            .insert("tool_state".to_string(), json!({"cwd": "/elsewhere"}));
        assert_eq!(scoped.fields["tool_state"], json!({"cwd": "/work"}));
    }

    #[test]
    fn test_refs_are_carried_by_value() {
        let policy = ScopePolicy::standard();
        let id = MemoryId::new();
        let mut candidate = CandidateContext::default();
        candidate.memory_refs.push(id);

        let scoped = policy.scope(AgentRole::Guardian, &candidate);
        candidate.memory_refs.clear();
        assert_eq!(scoped.memory_refs, vec![id]);
    }
}
