//! Background consolidation — promote, merge, prune
//!
//! The job plans against a point-in-time snapshot of the store, so live
//! retrieval is never blocked for the length of a run and never observes a
//! half-modified item.
//!
//! A run is idempotent for a fixed `now`: merging happens before promotion so
//! signal unions feed the same run's tier decisions, greedy clustering is
//! seeded in descending importance order so surviving representatives are
//! pairwise below the merge threshold, and promotion cascades working ->
//! short_term -> long_term within a single pass. A second run with no
//! intervening writes finds nothing left to do.
//!
//! Items referenced from an in-progress task's context scope are pinned:
//! they are never merged away and never pruned. Knowledge facts live outside
//! the store and are exempt by construction.

use crate::bus::routing::TaskBus;
use crate::error::Result;
use crate::memory::scoring::{cosine_similarity, recency_score};
use crate::memory::store::MemoryStore;
use crate::types::{MemoryId, MemoryItem, MemoryTier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Thresholds and period for the consolidation job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Working items older than this are promotion candidates
    pub promotion_age_days: f64,

    /// Minimum importance for working -> short_term promotion
    pub promotion_floor: f32,

    /// Importance above this promotes short_term -> long_term
    pub long_term_floor: f32,

    /// Cosine similarity at or above this merges near-duplicates
    pub merge_threshold: f32,

    /// Items with a retention score below this are prune candidates
    pub prune_score_floor: f32,

    /// Only items older than this are ever pruned
    pub max_age_days: f64,

    /// Period between background runs
    pub period_secs: u64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            promotion_age_days: 1.0,
            promotion_floor: 0.3,
            long_term_floor: 0.7,
            merge_threshold: 0.92,
            prune_score_floor: 0.25,
            max_age_days: 30.0,
            period_secs: 3600,
        }
    }
}

/// What a single run changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidationReport {
    pub promoted_short_term: usize,
    pub promoted_long_term: usize,
    pub merged: usize,
    pub pruned: usize,
}

impl ConsolidationReport {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Periodic promote/merge/prune pass over the memory store
pub struct ConsolidationJob {
    store: Arc<MemoryStore>,
    config: ConsolidationConfig,
}

impl ConsolidationJob {
    pub fn new(store: Arc<MemoryStore>, config: ConsolidationConfig) -> Self {
        Self { store, config }
    }

    /// Execute one consolidation pass at `now`, sparing `pinned` items
    pub async fn run_once(
        &self,
        now: DateTime<Utc>,
        pinned: &HashSet<MemoryId>,
    ) -> Result<ConsolidationReport> {
        let mut report = ConsolidationReport::default();
        let mut snapshot = self.store.snapshot().await;

        self.merge_near_duplicates(&mut snapshot, pinned, &mut report)
            .await?;
        self.promote_tiers(&mut snapshot, now, &mut report).await?;
        self.prune_stale(&snapshot, now, pinned, &mut report).await;

        if report.is_noop() {
            debug!("consolidation run: no changes");
        } else {
            info!(
                promoted_short = report.promoted_short_term,
                promoted_long = report.promoted_long_term,
                merged = report.merged,
                pruned = report.pruned,
                "consolidation run applied"
            );
        }
        Ok(report)
    }

    /// Greedy merge of near-duplicate items
    ///
    /// Candidates are visited in descending importance order (ties by id),
    /// so every cluster keeps its highest-importance member and surviving
    /// representatives are pairwise below the threshold.
    async fn merge_near_duplicates(
        &self,
        snapshot: &mut Vec<MemoryItem>,
        pinned: &HashSet<MemoryId>,
        report: &mut ConsolidationReport,
    ) -> Result<()> {
        snapshot.sort_by(|a, b| {
            b.importance()
                .partial_cmp(&a.importance())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut absorbed_ids: HashSet<MemoryId> = HashSet::new();
        let mut survivors: Vec<MemoryItem> = Vec::with_capacity(snapshot.len());

        for i in 0..snapshot.len() {
            if absorbed_ids.contains(&snapshot[i].id) {
                continue;
            }
            let mut keep = snapshot[i].clone();
            let mut absorbed: Vec<MemoryId> = Vec::new();

            for member in snapshot.iter().skip(i + 1) {
                if absorbed_ids.contains(&member.id) || pinned.contains(&member.id) {
                    continue;
                }
                if cosine_similarity(&keep.embedding, &member.embedding)
                    >= self.config.merge_threshold
                {
                    // Union of signals; content and embedding stay with the
                    // higher-importance survivor
                    keep.signals.extend(member.signals.iter().copied());
                    if member.last_access > keep.last_access {
                        keep.last_access = member.last_access;
                    }
                    absorbed.push(member.id);
                }
            }

            if !absorbed.is_empty() {
                report.merged += absorbed.len();
                absorbed_ids.extend(absorbed.iter().copied());
                self.store
                    .absorb(keep.id, &absorbed, keep.signals.clone(), keep.last_access)
                    .await?;
            }
            survivors.push(keep);
        }

        *snapshot = survivors;
        Ok(())
    }

    /// Tier promotion, cascading within a single pass
    async fn promote_tiers(
        &self,
        snapshot: &mut [MemoryItem],
        now: DateTime<Utc>,
        report: &mut ConsolidationReport,
    ) -> Result<()> {
        for item in snapshot.iter_mut() {
            let age_days = (now - item.created_at).num_milliseconds().max(0) as f64 / 86_400_000.0;
            let importance = item.importance();

            if item.tier == MemoryTier::Working
                && age_days > self.config.promotion_age_days
                && importance >= self.config.promotion_floor
            {
                item.tier = MemoryTier::ShortTerm;
                report.promoted_short_term += 1;
                self.store.promote(item.id, MemoryTier::ShortTerm).await?;
            }

            if item.tier == MemoryTier::ShortTerm && importance > self.config.long_term_floor {
                item.tier = MemoryTier::LongTerm;
                report.promoted_long_term += 1;
                self.store.promote(item.id, MemoryTier::LongTerm).await?;
            }
        }
        Ok(())
    }

    /// Prune items past the maximum age whose retention score fell below the
    /// floor
    ///
    /// Retention score is the query-free composite: the mean of recency and
    /// importance.
    async fn prune_stale(
        &self,
        snapshot: &[MemoryItem],
        now: DateTime<Utc>,
        pinned: &HashSet<MemoryId>,
        report: &mut ConsolidationReport,
    ) {
        for item in snapshot {
            if pinned.contains(&item.id) {
                continue;
            }
            let age_days = (now - item.created_at).num_milliseconds().max(0) as f64 / 86_400_000.0;
            if age_days <= self.config.max_age_days {
                continue;
            }
            let retention = 0.5 * recency_score(item.last_access, now) + 0.5 * item.importance();
            if retention < self.config.prune_score_floor {
                debug!(id = %item.id, retention, "pruning stale item");
                self.store.remove(item.id).await;
                report.pruned += 1;
            }
        }
    }

    /// Run the job on a fixed period, independent of request traffic
    ///
    /// Pinned ids are re-read from the bus at the start of every run.
    pub fn spawn(self: Arc<Self>, bus: Arc<TaskBus>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(self.config.period_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let pinned = bus.pinned_memory_ids().await;
                if let Err(err) = self.run_once(Utc::now(), &pinned).await {
                    warn!(%err, "consolidation run failed");
                }
            }
        })
    }
}
