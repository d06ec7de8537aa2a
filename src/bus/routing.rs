//! Task bus — durable queue and status state machine
//!
//! Routes `AgentMessage` tasks between roles: permission-checked submission,
//! FIFO per-destination delivery, and the status lifecycle
//! `pending -> in_progress -> {completed | failed | needs_review}` with
//! `needs_review` resolving only through an explicit complete or fail.
//!
//! All bus state sits behind one mutex, so `claim` is a single atomic
//! pop-and-transition: at most one claimant per task id even under concurrent
//! pollers from the same role.

use crate::bus::permissions::{Action, PermissionEnforcer, ResourceClass};
use crate::error::{CortexError, Result};
use crate::types::{
    AgentMessage, AgentRole, MemoryId, TaskDraft, TaskId, TaskResult, TaskStatus,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct BusInner {
    tasks: HashMap<TaskId, AgentMessage>,
    inboxes: HashMap<AgentRole, VecDeque<TaskId>>,
}

/// Per-status task counts, exposed for external reporting tooling
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusStats {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub needs_review: usize,
}

/// Durable in-process task queue with a status state machine
pub struct TaskBus {
    inner: Mutex<BusInner>,
    enforcer: Arc<PermissionEnforcer>,
    /// Terminal tasks older than this are dropped by `sweep_archived`
    retention: Duration,
}

impl TaskBus {
    pub fn new(enforcer: Arc<PermissionEnforcer>, retention: Duration) -> Self {
        Self {
            inner: Mutex::new(BusInner {
                tasks: HashMap::new(),
                inboxes: HashMap::new(),
            }),
            enforcer,
            retention,
        }
    }

    /// Submit a task: permission-check, persist as pending, enqueue FIFO
    ///
    /// Checks `(source, delegate)` and `(destination, receive:<action>)`;
    /// either refusal is `PermissionDenied`.
    pub async fn submit(&self, draft: TaskDraft) -> Result<TaskId> {
        if !self
            .enforcer
            .allowed(draft.source, Action::Delegate, ResourceClass::Task)
        {
            return Err(CortexError::PermissionDenied {
                role: draft.source,
                capability: "delegate".to_string(),
            });
        }
        if !self.enforcer.may_receive(draft.destination, &draft.action) {
            return Err(CortexError::PermissionDenied {
                role: draft.destination,
                capability: format!("receive:{}", draft.action),
            });
        }

        let message = AgentMessage {
            id: TaskId::new(),
            source: draft.source,
            destination: draft.destination,
            action: draft.action,
            payload: draft.payload,
            context: draft.context,
            constraints: draft.constraints,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            claimed_at: None,
            completed_at: None,
        };
        let id = message.id;
        debug!(%id, source = %message.source, destination = %message.destination,
               action = %message.action, "task submitted");

        let mut inner = self.inner.lock().await;
        inner
            .inboxes
            .entry(message.destination)
            .or_default()
            .push_back(id);
        inner.tasks.insert(id, message);
        Ok(id)
    }

    /// Claim the next pending task addressed to `role`, FIFO per destination
    ///
    /// An empty inbox is a normal poll result, not an error.
    pub async fn claim(&self, role: AgentRole) -> Option<AgentMessage> {
        let mut inner = self.inner.lock().await;
        let id = inner.inboxes.get_mut(&role)?.pop_front()?;
        // Pop and transition under one lock: at most one claimant wins
        let task = inner.tasks.get_mut(&id)?;
        task.status = TaskStatus::InProgress;
        task.claimed_at = Some(Utc::now());
        debug!(%id, %role, "task claimed");
        Some(task.clone())
    }

    /// Attach a result and complete the task
    ///
    /// Memory writes proposed inside the result are gated separately by
    /// `MemoryStore::apply_proposed`; a rejected write never un-completes the
    /// task.
    pub async fn complete(&self, task_id: TaskId, result: TaskResult) -> Result<()> {
        self.transition(task_id, TaskStatus::Completed, |task| {
            task.result = Some(result);
        })
        .await
    }

    /// Fail the task with a reason; the bus never retries on its own
    pub async fn fail(&self, task_id: TaskId, reason: &str) -> Result<()> {
        let reason = reason.to_string();
        self.transition(task_id, TaskStatus::Failed, move |task| {
            task.error = Some(reason);
        })
        .await
    }

    /// Fail the task because one of its constraints was violated
    ///
    /// The violated constraint is named in the recorded reason.
    pub async fn fail_constraint(&self, task_id: TaskId, violation: CortexError) -> Result<()> {
        let reason = violation.to_string();
        warn!(%task_id, %reason, "task exceeded its constraints");
        self.fail(task_id, &reason).await
    }

    /// Park the task for explicit human or Guardian resolution
    pub async fn flag_for_review(&self, task_id: TaskId, reason: &str) -> Result<()> {
        let reason = reason.to_string();
        self.transition(task_id, TaskStatus::NeedsReview, move |task| {
            task.error = Some(reason);
        })
        .await
    }

    /// Guardian short-circuit: force an immediate failure from any
    /// non-terminal status
    ///
    /// This is the single authorized bypass of the status machine. Tasks
    /// already terminal are untouched.
    pub async fn block(&self, task_id: TaskId, role: AgentRole) -> Result<()> {
        self.enforcer.require(role, Action::Block, ResourceClass::Task)?;

        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| CortexError::NotFound(format!("task {}", task_id)))?;
        if task.status.is_terminal() {
            return Ok(());
        }
        info!(%task_id, %role, previous = ?task.status, "task blocked");
        task.status = TaskStatus::Failed;
        task.error = Some(format!("blocked by {}", role));
        task.completed_at = Some(Utc::now());
        let destination = task.destination;
        // A blocked pending task must also leave its inbox
        if let Some(inbox) = inner.inboxes.get_mut(&destination) {
            inbox.retain(|id| *id != task_id);
        }
        Ok(())
    }

    /// Fetch a copy of a task
    pub async fn get(&self, task_id: TaskId) -> Result<AgentMessage> {
        self.inner
            .lock()
            .await
            .tasks
            .get(&task_id)
            .cloned()
            .ok_or_else(|| CortexError::NotFound(format!("task {}", task_id)))
    }

    /// Per-status counts for external reporting
    pub async fn stats(&self) -> BusStats {
        let inner = self.inner.lock().await;
        let mut stats = BusStats::default();
        for task in inner.tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::NeedsReview => stats.needs_review += 1,
            }
        }
        stats
    }

    /// Memory ids referenced from in-progress task contexts
    ///
    /// Consolidation must not delete these while the tasks are live.
    pub async fn pinned_memory_ids(&self) -> HashSet<MemoryId> {
        let inner = self.inner.lock().await;
        inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::InProgress)
            .flat_map(|t| t.context.memory_refs.iter().copied())
            .collect()
    }

    /// Drop terminal tasks whose retention window has elapsed
    pub async fn sweep_archived(&self, now: DateTime<Utc>) -> usize {
        let retention = self.retention;
        let mut inner = self.inner.lock().await;
        let before = inner.tasks.len();
        inner
            .tasks
            .retain(|_, task| !task.retention_elapsed(now, retention));
        let removed = before - inner.tasks.len();
        if removed > 0 {
            info!(removed, "archived terminal tasks past retention");
        }
        removed
    }

    async fn transition<F>(&self, task_id: TaskId, to: TaskStatus, apply: F) -> Result<()>
    where
        F: FnOnce(&mut AgentMessage),
    {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| CortexError::NotFound(format!("task {}", task_id)))?;
        if !task.status.can_transition(to) {
            return Err(CortexError::InvalidTransition {
                from: task.status,
                to,
            });
        }
        debug!(%task_id, from = ?task.status, to = ?to, "task transition");
        task.status = to;
        if to.is_terminal() {
            task.completed_at = Some(Utc::now());
        }
        apply(task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::permissions::PermissionMatrix;
    use crate::types::{TaskConstraints, TaskContext};
    use serde_json::json;

    fn bus() -> Arc<TaskBus> {
        Arc::new(TaskBus::new(
            Arc::new(PermissionEnforcer::new(PermissionMatrix::standard())),
            Duration::days(7),
        ))
    }

    fn draft(source: AgentRole, destination: AgentRole, action: &str) -> TaskDraft {
        TaskDraft {
            source,
            destination,
            action: action.to_string(),
            payload: json!({"brief": "work"}),
            context: TaskContext::default(),
            constraints: TaskConstraints::default(),
        }
    }

    #[tokio::test]
    async fn test_submit_checks_both_sides() {
        let bus = bus();
        // FactChecker holds no delegate capability
        let err = bus
            .submit(draft(AgentRole::FactChecker, AgentRole::Builder, "build"))
            .await
            .unwrap_err();
        assert!(matches!(err, CortexError::PermissionDenied { .. }));

        // Builder does not receive "research"
        let err = bus
            .submit(draft(AgentRole::Brain, AgentRole::Builder, "research"))
            .await
            .unwrap_err();
        assert!(matches!(err, CortexError::PermissionDenied { .. }));

        bus.submit(draft(AgentRole::Brain, AgentRole::Builder, "build"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_claim_is_fifo_per_destination() {
        let bus = bus();
        let first = bus
            .submit(draft(AgentRole::Brain, AgentRole::Builder, "build"))
            .await
            .unwrap();
        let second = bus
            .submit(draft(AgentRole::Brain, AgentRole::Builder, "build"))
            .await
            .unwrap();

        assert_eq!(bus.claim(AgentRole::Builder).await.unwrap().id, first);
        assert_eq!(bus.claim(AgentRole::Builder).await.unwrap().id, second);
        // Empty inbox is a normal poll result
        assert!(bus.claim(AgentRole::Builder).await.is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_and_illegal_transitions() {
        let bus = bus();
        let id = bus
            .submit(draft(AgentRole::Brain, AgentRole::Builder, "build"))
            .await
            .unwrap();

        // pending -> completed is non-adjacent
        let err = bus.complete(id, TaskResult::default()).await.unwrap_err();
        assert!(matches!(err, CortexError::InvalidTransition { .. }));

        bus.claim(AgentRole::Builder).await.unwrap();
        bus.complete(id, TaskResult::default()).await.unwrap();
        let task = bus.get(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.result.is_some());
        assert!(task.completed_at.is_some());

        // Terminal states are final
        let err = bus.fail(id, "too late").await.unwrap_err();
        assert!(matches!(err, CortexError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_needs_review_resolves_only_explicitly() {
        let bus = bus();
        let id = bus
            .submit(draft(AgentRole::Brain, AgentRole::Researcher, "research"))
            .await
            .unwrap();
        bus.claim(AgentRole::Researcher).await.unwrap();
        bus.flag_for_review(id, "partial fan-in").await.unwrap();

        let task = bus.get(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::NeedsReview);
        assert_eq!(task.error.as_deref(), Some("partial fan-in"));

        bus.complete(id, TaskResult::default()).await.unwrap();
        assert_eq!(bus.get(id).await.unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_claim_exclusive_under_concurrency() {
        let bus = bus();
        let mut expected = HashSet::new();
        for _ in 0..20 {
            expected.insert(
                bus.submit(draft(AgentRole::Brain, AgentRole::Builder, "build"))
                    .await
                    .unwrap(),
            );
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let bus = bus.clone();
            handles.push(tokio::spawn(async move {
                let mut claimed = Vec::new();
                while let Some(task) = bus.claim(AgentRole::Builder).await {
                    claimed.push(task.id);
                    tokio::task::yield_now().await;
                }
                claimed
            }));
        }

        let mut seen = Vec::new();
        for handle in handles {
            seen.extend(handle.await.unwrap());
        }
        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(seen.len(), 20, "every task claimed exactly once");
        assert_eq!(unique, expected);
    }

    #[tokio::test]
    async fn test_guardian_block_bypasses_from_any_live_state() {
        let bus = bus();

        // Only Guardian may block
        let id = bus
            .submit(draft(AgentRole::Brain, AgentRole::Builder, "build"))
            .await
            .unwrap();
        let err = bus.block(id, AgentRole::Brain).await.unwrap_err();
        assert!(matches!(err, CortexError::PermissionDenied { .. }));

        // Pending task: blocked and removed from the inbox
        bus.block(id, AgentRole::Guardian).await.unwrap();
        let task = bus.get(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("blocked by guardian"));
        assert!(bus.claim(AgentRole::Builder).await.is_none());

        // In-progress task
        let id = bus
            .submit(draft(AgentRole::Brain, AgentRole::Builder, "build"))
            .await
            .unwrap();
        bus.claim(AgentRole::Builder).await.unwrap();
        bus.block(id, AgentRole::Guardian).await.unwrap();
        assert_eq!(bus.get(id).await.unwrap().status, TaskStatus::Failed);

        // Terminal task is untouched
        let id = bus
            .submit(draft(AgentRole::Brain, AgentRole::Builder, "build"))
            .await
            .unwrap();
        bus.claim(AgentRole::Builder).await.unwrap();
        bus.complete(id, TaskResult::default()).await.unwrap();
        bus.block(id, AgentRole::Guardian).await.unwrap();
        let task = bus.get(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.result.is_some());
    }

    #[tokio::test]
    async fn test_constraint_violation_names_the_limit() {
        let bus = bus();
        let mut d = draft(AgentRole::Brain, AgentRole::Builder, "build");
        d.constraints.max_time_secs = Some(10);
        let id = bus.submit(d).await.unwrap();
        let task = bus.claim(AgentRole::Builder).await.unwrap();

        let violation = task.constraints.check(0.0, 25, 0).unwrap_err();
        bus.fail_constraint(id, violation).await.unwrap();

        let task = bus.get(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.as_deref().unwrap().contains("max_time"));
    }

    #[tokio::test]
    async fn test_sweep_archives_only_expired_terminal_tasks() {
        let bus = bus();
        let done = bus
            .submit(draft(AgentRole::Brain, AgentRole::Builder, "build"))
            .await
            .unwrap();
        bus.claim(AgentRole::Builder).await.unwrap();
        bus.complete(done, TaskResult::default()).await.unwrap();

        let live = bus
            .submit(draft(AgentRole::Brain, AgentRole::Builder, "build"))
            .await
            .unwrap();
        bus.claim(AgentRole::Builder).await.unwrap();

        // Within retention: nothing removed
        assert_eq!(bus.sweep_archived(Utc::now()).await, 0);

        // Past retention: the completed task goes, the live one stays
        let removed = bus.sweep_archived(Utc::now() + Duration::days(8)).await;
        assert_eq!(removed, 1);
        assert!(bus.get(done).await.is_err());
        assert!(bus.get(live).await.is_ok());
    }

    #[tokio::test]
    async fn test_pinned_ids_cover_in_progress_contexts_only() {
        let bus = bus();
        let pinned_id = MemoryId::new();

        let mut d = draft(AgentRole::Brain, AgentRole::Builder, "build");
        d.context.memory_refs.push(pinned_id);
        let id = bus.submit(d).await.unwrap();

        // Pending context is not pinned yet
        assert!(bus.pinned_memory_ids().await.is_empty());

        bus.claim(AgentRole::Builder).await.unwrap();
        assert!(bus.pinned_memory_ids().await.contains(&pinned_id));

        bus.complete(id, TaskResult::default()).await.unwrap();
        assert!(bus.pinned_memory_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_stats_enumeration() {
        let bus = bus();
        for _ in 0..3 {
            bus.submit(draft(AgentRole::Brain, AgentRole::Builder, "build"))
                .await
                .unwrap();
        }
        let claimed = bus.claim(AgentRole::Builder).await.unwrap();
        bus.fail(claimed.id, "broke").await.unwrap();

        let stats = bus.stats().await;
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 0);
    }
}
