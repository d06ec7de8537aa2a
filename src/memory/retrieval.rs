//! Retrieval service — permission-filtered, strategy-weighted ranking
//!
//! Candidates are permission-filtered first and scored second, so permission
//! filtering never leaks into the ranked output. Ordering is total and
//! deterministic: score descending, then more-recent access, then lower id.
//!
//! Side effect: `last_access` is bumped on returned memory items. That bump
//! is the recency signal for the next access and is the only store mutation
//! retrieval performs.

use crate::bus::permissions::{Action, PermissionEnforcer, ResourceClass};
use crate::embeddings::Embedder;
use crate::error::{CortexError, Result};
use crate::memory::knowledge::KnowledgeCache;
use crate::memory::scoring::{score_fact, score_item};
use crate::memory::store::MemoryStore;
use crate::types::{content_fingerprint, AgentRole, KnowledgeFact, MemoryItem, Strategy};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Where a scored hit came from
#[derive(Debug, Clone)]
pub enum HitSource {
    Memory(MemoryItem),
    Fact(KnowledgeFact),
}

/// One ranked retrieval result
#[derive(Debug, Clone)]
pub struct ScoredHit {
    pub score: f32,
    pub source: HitSource,
}

impl ScoredHit {
    /// Recency timestamp used for tie-breaking
    fn accessed_at(&self) -> DateTime<Utc> {
        match &self.source {
            HitSource::Memory(item) => item.last_access,
            HitSource::Fact(fact) => fact.verified_at,
        }
    }

    /// Stable id string used as the final tie-breaker
    fn id_key(&self) -> String {
        match &self.source {
            HitSource::Memory(item) => item.id.to_string(),
            HitSource::Fact(fact) => fact.id.to_string(),
        }
    }
}

/// Ranked retrieval over the memory store and knowledge cache
pub struct RetrievalService {
    store: Arc<MemoryStore>,
    knowledge: Arc<KnowledgeCache>,
    enforcer: Arc<PermissionEnforcer>,
    embedder: Arc<dyn Embedder>,
}

impl RetrievalService {
    pub fn new(
        store: Arc<MemoryStore>,
        knowledge: Arc<KnowledgeCache>,
        enforcer: Arc<PermissionEnforcer>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            store,
            knowledge,
            enforcer,
            embedder,
        }
    }

    /// Retrieve at most `k` scored items for `query`, visible to `role`
    pub async fn retrieve(
        &self,
        query: &str,
        role: AgentRole,
        strategy: Strategy,
        k: usize,
    ) -> Result<Vec<ScoredHit>> {
        self.retrieve_at(query, role, strategy, k, Utc::now()).await
    }

    /// Frozen-clock variant: scoring is pure in `now`, so fixing it makes the
    /// full output reproducible
    pub async fn retrieve_at(
        &self,
        query: &str,
        role: AgentRole,
        strategy: Strategy,
        k: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredHit>> {
        if k == 0 {
            return Err(CortexError::InvalidOperation(
                "retrieval requires k >= 1".to_string(),
            ));
        }

        let may_read_memory = self.enforcer.allowed(role, Action::Read, ResourceClass::Memory);
        let may_read_knowledge =
            self.enforcer.allowed(role, Action::Read, ResourceClass::Knowledge);

        // Exact strategy: fingerprint lookup first, memory scoring only on a miss
        if strategy == Strategy::Exact && may_read_knowledge {
            let fingerprint = content_fingerprint(query);
            if let Some(fact) = self.knowledge.lookup_fingerprint(&fingerprint).await {
                debug!(%role, "exact fingerprint hit, bypassing memory scoring");
                return Ok(vec![ScoredHit {
                    score: 1.0,
                    source: HitSource::Fact(fact),
                }]);
            }
        }

        // Query embedding is computed once per call
        let query_embedding = self.embedder.embed(query).await?;

        let mut hits: Vec<ScoredHit> = Vec::new();

        if may_read_memory {
            for item in self.store.snapshot().await {
                let score = score_item(&item, &query_embedding, strategy, now);
                hits.push(ScoredHit {
                    score,
                    source: HitSource::Memory(item),
                });
            }
        }

        // The exact fallback ranks memory items only; other strategies blend
        // facts into the same ranking with recency pinned to 1.0.
        if strategy != Strategy::Exact && may_read_knowledge {
            for fact in self.knowledge.snapshot().await {
                let score = score_fact(&fact, &query_embedding, strategy);
                hits.push(ScoredHit {
                    score,
                    source: HitSource::Fact(fact),
                });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.accessed_at().cmp(&a.accessed_at()))
                .then_with(|| a.id_key().cmp(&b.id_key()))
        });
        hits.truncate(k);

        let touched: Vec<_> = hits
            .iter()
            .filter_map(|h| match &h.source {
                HitSource::Memory(item) => Some(item.id),
                HitSource::Fact(_) => None,
            })
            .collect();
        self.store.touch(&touched, now).await;

        Ok(hits)
    }
}
