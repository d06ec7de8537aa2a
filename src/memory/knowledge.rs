//! Knowledge cache — verified, non-decaying facts
//!
//! Facts are deduplicated by content fingerprint. Writing a claim whose
//! fingerprint already exists supersedes the stored fact in place (version
//! bump) instead of creating a duplicate. Facts are never auto-pruned by
//! consolidation; they leave the cache only through explicit supersession.

use crate::bus::permissions::{Action, PermissionEnforcer, ResourceClass};
use crate::error::{CortexError, Result};
use crate::types::{content_fingerprint, AgentRole, FactId, KnowledgeFact};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

struct CacheInner {
    facts: HashMap<FactId, KnowledgeFact>,
    by_fingerprint: HashMap<String, FactId>,
}

/// Fingerprint-indexed store of verified claims
pub struct KnowledgeCache {
    inner: RwLock<CacheInner>,
    enforcer: Arc<PermissionEnforcer>,
}

/// A claim to be recorded, before the cache assigns identity
#[derive(Debug, Clone)]
pub struct FactDraft {
    pub claim: String,
    pub embedding: Vec<f32>,
    pub citations: Vec<String>,
}

impl KnowledgeCache {
    pub fn new(enforcer: Arc<PermissionEnforcer>) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                facts: HashMap::new(),
                by_fingerprint: HashMap::new(),
            }),
            enforcer,
        }
    }

    /// Record a verified claim on behalf of `role`
    ///
    /// A fingerprint collision supersedes the existing fact in place and
    /// returns its id.
    pub async fn record(&self, draft: FactDraft, role: AgentRole) -> Result<FactId> {
        self.enforcer
            .require(role, Action::Write, ResourceClass::Knowledge)?;

        let fingerprint = content_fingerprint(&draft.claim);
        let mut inner = self.inner.write().await;

        if let Some(&existing_id) = inner.by_fingerprint.get(&fingerprint) {
            if let Some(fact) = inner.facts.get_mut(&existing_id) {
                fact.claim = draft.claim;
                fact.embedding = draft.embedding;
                fact.citations = draft.citations;
                fact.verified_by = role;
                fact.verified_at = Utc::now();
                fact.version += 1;
                debug!(%existing_id, %role, version = fact.version, "fact superseded in place");
            }
            return Ok(existing_id);
        }

        let fact = KnowledgeFact {
            id: FactId::new(),
            fingerprint: fingerprint.clone(),
            claim: draft.claim,
            embedding: draft.embedding,
            citations: draft.citations,
            verified_by: role,
            verified_at: Utc::now(),
            no_decay: true,
            version: 1,
        };
        let id = fact.id;
        debug!(%id, %role, "fact recorded");
        inner.by_fingerprint.insert(fingerprint, id);
        inner.facts.insert(id, fact);
        Ok(id)
    }

    /// Explicitly replace an existing fact with a new claim
    ///
    /// The old fingerprint index entry is dropped; the fact id is retained so
    /// existing context references stay valid.
    pub async fn supersede(&self, id: FactId, draft: FactDraft, role: AgentRole) -> Result<()> {
        self.enforcer
            .require(role, Action::Write, ResourceClass::Knowledge)?;

        let new_fingerprint = content_fingerprint(&draft.claim);
        let mut inner = self.inner.write().await;
        let old_fingerprint = {
            let fact = inner
                .facts
                .get_mut(&id)
                .ok_or_else(|| CortexError::NotFound(format!("knowledge fact {}", id)))?;
            let old = fact.fingerprint.clone();
            fact.fingerprint = new_fingerprint.clone();
            fact.claim = draft.claim;
            fact.embedding = draft.embedding;
            fact.citations = draft.citations;
            fact.verified_by = role;
            fact.verified_at = Utc::now();
            fact.version += 1;
            old
        };
        inner.by_fingerprint.remove(&old_fingerprint);
        inner.by_fingerprint.insert(new_fingerprint, id);
        Ok(())
    }

    /// Exact-strategy lookup by content fingerprint
    pub async fn lookup_fingerprint(&self, fingerprint: &str) -> Option<KnowledgeFact> {
        let inner = self.inner.read().await;
        inner
            .by_fingerprint
            .get(fingerprint)
            .and_then(|id| inner.facts.get(id))
            .cloned()
    }

    /// Fetch a fact by id
    pub async fn get(&self, id: FactId) -> Result<KnowledgeFact> {
        self.inner
            .read()
            .await
            .facts
            .get(&id)
            .cloned()
            .ok_or_else(|| CortexError::NotFound(format!("knowledge fact {}", id)))
    }

    /// Point-in-time copy of every fact
    pub async fn snapshot(&self) -> Vec<KnowledgeFact> {
        self.inner.read().await.facts.values().cloned().collect()
    }

    /// Number of cached facts (read-only enumeration for reporting)
    pub async fn len(&self) -> usize {
        self.inner.read().await.facts.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
