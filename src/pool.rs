//! Sub-agent pool — bounded fan-out/fan-in execution
//!
//! A pool launches up to its concurrency bound of isolated sub-tasks (each
//! with its own context copy, never a shared mutable object) and joins them
//! behind a deadline. On timeout, unfinished sub-tasks are cancelled
//! best-effort and their partial results discarded; the parent proceeds with
//! whatever subset completed, degrading to needs-review when the completed
//! fraction falls below the configured minimum.

use crate::error::{CortexError, Result};
use crate::types::TaskContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

/// Hard bounds on the pool's concurrency
pub const MIN_CONCURRENCY: usize = 3;
pub const MAX_CONCURRENCY: usize = 6;

/// Pool sizing and degradation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on concurrent sub-tasks, clamped to 3..=6
    pub max_concurrency: usize,

    /// Default join deadline when the parent task carries no max-time
    /// constraint
    pub task_timeout_secs: u64,

    /// Below this completed fraction the fan-in degrades to needs-review
    pub min_complete_fraction: f32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            task_timeout_secs: 60,
            min_complete_fraction: 0.9,
        }
    }
}

/// A lightweight unit of parallel work for one sub-agent
#[derive(Debug, Clone)]
pub struct SubTask {
    pub id: Uuid,
    pub description: String,
    /// Isolated value copy; sub-tasks never share a mutable context
    pub context: TaskContext,
}

impl SubTask {
    pub fn new(description: &str, context: TaskContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.to_string(),
            context,
        }
    }
}

/// Result from a single sub-task that returned before the deadline
#[derive(Debug, Clone)]
pub struct SubResult {
    pub task_id: Uuid,
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Joined outcome of a fan-out
#[derive(Debug, Clone)]
pub struct FanInOutcome {
    /// Results from sub-tasks that returned in time, successful or not
    pub results: Vec<SubResult>,

    /// How many sub-tasks were launched
    pub launched: usize,

    /// How many were cancelled at the deadline
    pub cancelled: usize,

    /// Completed fraction fell below the configured minimum; the parent
    /// task should be flagged for review rather than failed
    pub needs_review: bool,
}

impl FanInOutcome {
    /// Outputs of the successful sub-tasks, for result synthesis
    pub fn synthesized(&self) -> Value {
        Value::Array(
            self.results
                .iter()
                .filter(|r| r.success)
                .filter_map(|r| r.output.clone())
                .collect(),
        )
    }
}

/// Bounded fan-out/fan-in executor
pub struct SubAgentPool {
    max_concurrency: usize,
    default_timeout: Duration,
    min_complete_fraction: f32,
}

impl SubAgentPool {
    pub fn new(config: PoolConfig) -> Self {
        let max_concurrency = config.max_concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        if max_concurrency != config.max_concurrency {
            warn!(
                requested = config.max_concurrency,
                clamped = max_concurrency,
                "pool concurrency clamped to the supported range"
            );
        }
        Self {
            max_concurrency,
            default_timeout: Duration::from_secs(config.task_timeout_secs),
            min_complete_fraction: config.min_complete_fraction.clamp(0.0, 1.0),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Fan out `tasks`, join behind `deadline` (or the pool default), fan in
    ///
    /// Asking for more sub-tasks than the bound is `CapacityExceeded`: the
    /// caller must queue or reduce fan-out, the pool never queues silently.
    pub async fn execute<F, Fut>(
        &self,
        tasks: Vec<SubTask>,
        deadline: Option<Duration>,
        runner: F,
    ) -> Result<FanInOutcome>
    where
        F: Fn(SubTask) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        if tasks.len() > self.max_concurrency {
            return Err(CortexError::CapacityExceeded {
                limit: self.max_concurrency,
                requested: tasks.len(),
            });
        }
        let launched = tasks.len();
        let deadline = deadline.unwrap_or(self.default_timeout);

        let mut join_set: JoinSet<SubResult> = JoinSet::new();
        for task in tasks {
            let runner = runner.clone();
            let task_id = task.id;
            join_set.spawn(async move {
                let started = Instant::now();
                let outcome = runner(task).await;
                let duration_ms = started.elapsed().as_millis() as u64;
                match outcome {
                    Ok(output) => SubResult {
                        task_id,
                        success: true,
                        output: Some(output),
                        error: None,
                        duration_ms,
                    },
                    Err(err) => SubResult {
                        task_id,
                        success: false,
                        output: None,
                        error: Some(err.to_string()),
                        duration_ms,
                    },
                }
            });
        }

        let mut results = Vec::with_capacity(launched);
        let join_all = async {
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(result) => results.push(result),
                    // A panicked sub-task is a discarded partial, not a pool error
                    Err(err) => warn!(%err, "sub-task join error"),
                }
            }
        };

        let timed_out = tokio::time::timeout(deadline, join_all).await.is_err();
        if timed_out {
            // Best-effort cancellation; unfinished partials are discarded
            join_set.abort_all();
            while join_set.join_next().await.is_some() {}
        }

        let cancelled = launched - results.len();
        let completed_fraction = if launched == 0 {
            1.0
        } else {
            results.len() as f32 / launched as f32
        };
        let needs_review = completed_fraction < self.min_complete_fraction;
        debug!(
            launched,
            cancelled,
            completed_fraction,
            needs_review,
            "fan-in complete"
        );

        Ok(FanInOutcome {
            results,
            launched,
            cancelled,
            needs_review,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pool() -> SubAgentPool {
        SubAgentPool::new(PoolConfig::default())
    }

    fn tasks(n: usize) -> Vec<SubTask> {
        (0..n)
            .map(|i| SubTask::new(&format!("sub-{}", i), TaskContext::default()))
            .collect()
    }

    #[tokio::test]
    async fn test_over_bound_is_capacity_exceeded() {
        let pool = pool();
        let err = pool
            .execute(tasks(7), None, |t| async move { Ok(json!(t.description)) })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CortexError::CapacityExceeded { limit: 5, requested: 7 }
        ));
    }

    #[tokio::test]
    async fn test_bound_clamped_to_supported_range() {
        let config = PoolConfig {
            max_concurrency: 100,
            ..PoolConfig::default()
        };
        assert_eq!(SubAgentPool::new(config).max_concurrency(), MAX_CONCURRENCY);

        let config = PoolConfig {
            max_concurrency: 1,
            ..PoolConfig::default()
        };
        assert_eq!(SubAgentPool::new(config).max_concurrency(), MIN_CONCURRENCY);
    }

    #[tokio::test]
    async fn test_all_complete_no_review() {
        let pool = pool();
        let outcome = pool
            .execute(tasks(4), None, |t| async move { Ok(json!(t.description)) })
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 4);
        assert_eq!(outcome.cancelled, 0);
        assert!(!outcome.needs_review);
        assert_eq!(outcome.synthesized().as_array().unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_straggler_is_cancelled_and_parent_degrades_to_review() {
        // Five sub-tasks, one never returns in time
        let pool = pool();
        let outcome = pool
            .execute(
                tasks(5),
                Some(Duration::from_secs(1)),
                |t| async move {
                    if t.description == "sub-4" {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                    }
                    Ok(json!(t.description))
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 4);
        assert_eq!(outcome.cancelled, 1);
        assert!(outcome.needs_review);
        assert_eq!(outcome.synthesized().as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_subtask_still_counts_as_returned() {
        let pool = pool();
        let outcome = pool
            .execute(tasks(3), None, |t| async move {
                if t.description == "sub-1" {
                    Err(CortexError::Other("flaky".to_string()))
                } else {
                    Ok(json!(t.description))
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 3);
        assert!(!outcome.needs_review, "errors returned in time are not stragglers");
        assert_eq!(outcome.synthesized().as_array().unwrap().len(), 2);
        let failed = outcome.results.iter().find(|r| !r.success).unwrap();
        assert_eq!(failed.error.as_deref(), Some("flaky"));
    }

    #[tokio::test]
    async fn test_contexts_are_isolated_copies() {
        let pool = pool();
        let mut shared = TaskContext::default();
        shared
            .fields
            .insert("task_brief".to_string(), json!("original"));

        let subtasks: Vec<SubTask> = (0..3)
            .map(|i| SubTask::new(&format!("sub-{}", i), shared.clone()))
            .collect();

        let outcome = pool
            .execute(subtasks, None, |mut t| async move {
                // Mutating one sub-task's copy must not leak anywhere
                t.context
                    .fields
                    .insert("task_brief".to_string(), json!("mutated"));
                Ok(t.context.fields["task_brief"].clone())
            })
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(shared.fields["task_brief"], json!("original"));
    }
}
