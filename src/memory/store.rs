//! Memory store — the shared arena of tiered memory items
//!
//! Items are addressed by stable ids; all cross-component references are by
//! id, never by live handle. Mutations are applied under per-item atomicity
//! (the map lock covers each field change as one unit) and readers of a
//! `snapshot()` never observe a half-modified item.

use crate::bus::permissions::{Action, PermissionEnforcer, ResourceClass};
use crate::error::{CortexError, Result};
use crate::types::{AgentRole, ImportanceSignal, MemoryDraft, MemoryId, MemoryItem, MemoryTier};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

struct StoreInner {
    items: HashMap<MemoryId, MemoryItem>,
    /// Pinned by the first insert; all later writes must agree
    dimension: Option<usize>,
}

/// Shared, permission-gated memory store
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
    enforcer: Arc<PermissionEnforcer>,
}

impl MemoryStore {
    pub fn new(enforcer: Arc<PermissionEnforcer>) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                items: HashMap::new(),
                dimension: None,
            }),
            enforcer,
        }
    }

    /// Write a new memory item on behalf of `role`
    ///
    /// Fails with `PermissionDenied` when the role lacks memory:write, and
    /// with `EmbeddingDimension` when the vector disagrees with the
    /// store-wide dimensionality.
    pub async fn write(&self, draft: MemoryDraft, role: AgentRole) -> Result<MemoryId> {
        self.enforcer
            .require(role, Action::Write, ResourceClass::Memory)?;

        let mut inner = self.inner.write().await;
        match inner.dimension {
            None => inner.dimension = Some(draft.embedding.len()),
            Some(dim) if dim != draft.embedding.len() => {
                return Err(CortexError::EmbeddingDimension {
                    expected: dim,
                    actual: draft.embedding.len(),
                });
            }
            Some(_) => {}
        }

        let now = Utc::now();
        let item = MemoryItem {
            id: MemoryId::new(),
            content: draft.content,
            embedding: draft.embedding,
            tier: MemoryTier::Working,
            created_at: now,
            last_access: now,
            signals: draft.signals,
            owner: role,
        };
        let id = item.id;
        debug!(%id, %role, "memory item stored");
        inner.items.insert(id, item);
        Ok(id)
    }

    /// Apply the memory writes proposed by a task result
    ///
    /// Each write is gated independently; rejections are logged and returned,
    /// never escalated — the task that carried them still completes.
    pub async fn apply_proposed(
        &self,
        drafts: Vec<MemoryDraft>,
        role: AgentRole,
    ) -> (Vec<MemoryId>, usize) {
        let mut stored = Vec::new();
        let mut rejected = 0usize;
        for draft in drafts {
            match self.write(draft, role).await {
                Ok(id) => stored.push(id),
                Err(err) => {
                    warn!(%role, %err, "proposed memory write rejected");
                    rejected += 1;
                }
            }
        }
        (stored, rejected)
    }

    /// Fetch a single item by id
    pub async fn get(&self, id: MemoryId) -> Result<MemoryItem> {
        self.inner
            .read()
            .await
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| CortexError::NotFound(format!("memory item {}", id)))
    }

    /// Update importance signals; only the authoring role may do this
    pub async fn update_signals(
        &self,
        id: MemoryId,
        signals: BTreeSet<ImportanceSignal>,
        role: AgentRole,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let item = inner
            .items
            .get_mut(&id)
            .ok_or_else(|| CortexError::NotFound(format!("memory item {}", id)))?;
        if item.owner != role {
            return Err(CortexError::PermissionDenied {
                role,
                capability: "memory:update-signals (authoring role only)".to_string(),
            });
        }
        item.signals = signals;
        Ok(())
    }

    /// Bump last-access on the given items
    ///
    /// The documented retrieval side effect: returned items feed the recency
    /// signal for the next access.
    pub async fn touch(&self, ids: &[MemoryId], now: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        for id in ids {
            if let Some(item) = inner.items.get_mut(id) {
                item.last_access = now;
            }
        }
    }

    /// Point-in-time copy of every item
    ///
    /// Consolidation plans against this copy so live retrieval is never
    /// blocked for the length of a run.
    pub async fn snapshot(&self) -> Vec<MemoryItem> {
        self.inner.read().await.items.values().cloned().collect()
    }

    /// Number of stored items
    pub async fn len(&self) -> usize {
        self.inner.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Read-only per-tier counts for external reporting tooling
    pub async fn tier_counts(&self) -> HashMap<MemoryTier, usize> {
        let inner = self.inner.read().await;
        let mut counts = HashMap::new();
        for item in inner.items.values() {
            *counts.entry(item.tier).or_insert(0) += 1;
        }
        counts
    }

    // Consolidation-only mutations. Crate-private: tier changes and deletions
    // are reserved to the job, not to arbitrary roles.

    pub(crate) async fn promote(&self, id: MemoryId, tier: MemoryTier) -> Result<()> {
        let mut inner = self.inner.write().await;
        let item = inner
            .items
            .get_mut(&id)
            .ok_or_else(|| CortexError::NotFound(format!("memory item {}", id)))?;
        item.tier = tier;
        Ok(())
    }

    pub(crate) async fn absorb(
        &self,
        keep: MemoryId,
        absorbed: &[MemoryId],
        signals: BTreeSet<ImportanceSignal>,
        last_access: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(item) = inner.items.get_mut(&keep) {
            item.signals = signals;
            if last_access > item.last_access {
                item.last_access = last_access;
            }
        }
        for id in absorbed {
            inner.items.remove(id);
        }
        Ok(())
    }

    pub(crate) async fn remove(&self, id: MemoryId) {
        self.inner.write().await.items.remove(&id);
    }
}
