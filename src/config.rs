//! Startup configuration
//!
//! The core never reads configuration files on its own initiative: an
//! excluded collaborator (the setup wizard or deployment tooling) points
//! `CoreConfig::load` at a file, and the loader layers defaults, the file,
//! and `CORTEX_`-prefixed environment overrides through the `config` crate.
//!
//! Validation failures abort startup: a permission matrix missing a required
//! role must never run degraded.

use crate::bus::permissions::PermissionMatrix;
use crate::bus::scope::ScopePolicy;
use crate::error::{CortexError, Result};
use crate::memory::consolidation::ConsolidationConfig;
use crate::pool::{PoolConfig, MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::types::AgentRole;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

/// Immutable startup configuration for the core
///
/// A reload constructs a fresh instance (and from it a fresh matrix and
/// policy); nothing here is mutated in place during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Role name -> capability strings for the permission matrix
    pub permissions: HashMap<String, Vec<String>>,

    /// Role name -> context field allow-list
    pub context_allow: HashMap<String, Vec<String>>,

    /// Consolidation thresholds and period
    pub consolidation: ConsolidationConfig,

    /// Sub-agent pool sizing and degradation policy
    pub pool: PoolConfig,

    /// Days a terminal task survives before the retention sweep drops it
    pub task_retention_days: i64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let caps = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let mut permissions = HashMap::new();
        permissions.insert(
            "brain".to_string(),
            caps(&["delegate", "receive:*", "memory:read", "memory:write", "knowledge:read"]),
        );
        permissions.insert(
            "builder".to_string(),
            caps(&["delegate", "receive:build", "memory:read", "knowledge:read"]),
        );
        permissions.insert(
            "researcher".to_string(),
            caps(&[
                "delegate",
                "receive:research",
                "memory:read",
                "memory:write",
                "knowledge:read",
                "knowledge:write",
            ]),
        );
        permissions.insert(
            "fact_checker".to_string(),
            caps(&["receive:verify", "memory:read", "knowledge:read", "knowledge:write"]),
        );
        permissions.insert(
            "guardian".to_string(),
            caps(&["block", "receive:review", "memory:read", "knowledge:read"]),
        );

        let mut context_allow = HashMap::new();
        context_allow.insert(
            "brain".to_string(),
            caps(&["conversation_history", "memory_hits", "knowledge_hits", "tool_state"]),
        );
        context_allow.insert(
            "builder".to_string(),
            caps(&["task_brief", "tool_state", "memory_hits"]),
        );
        context_allow.insert(
            "researcher".to_string(),
            caps(&["task_brief", "memory_hits", "knowledge_hits"]),
        );
        context_allow.insert(
            "fact_checker".to_string(),
            caps(&["task_brief", "knowledge_hits"]),
        );
        context_allow.insert(
            "guardian".to_string(),
            caps(&["task_brief", "conversation_history", "memory_hits"]),
        );

        Self {
            permissions,
            context_allow,
            consolidation: ConsolidationConfig::default(),
            pool: PoolConfig::default(),
            task_retention_days: 7,
        }
    }
}

impl CoreConfig {
    /// Load configuration: defaults <- optional file <- `CORTEX_` env vars
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&CoreConfig::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let loaded: CoreConfig = builder
            .add_source(config::Environment::with_prefix("CORTEX").separator("__"))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        info!("configuration loaded and validated");
        Ok(loaded)
    }

    /// Check startup invariants; any failure aborts startup
    pub fn validate(&self) -> Result<()> {
        for role in AgentRole::ALL {
            if !self.permissions.contains_key(role.as_str()) {
                return Err(config_error(format!(
                    "permission matrix missing required role '{}'",
                    role
                )));
            }
        }
        for name in self.permissions.keys().chain(self.context_allow.keys()) {
            name.parse::<AgentRole>().map_err(config_error)?;
        }
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.pool.max_concurrency) {
            return Err(config_error(format!(
                "pool.max_concurrency must be in {}..={}, got {}",
                MIN_CONCURRENCY, MAX_CONCURRENCY, self.pool.max_concurrency
            )));
        }
        if !(0.0..=1.0).contains(&self.pool.min_complete_fraction) {
            return Err(config_error(
                "pool.min_complete_fraction must be in [0, 1]".to_string(),
            ));
        }
        let c = &self.consolidation;
        if c.promotion_floor > c.long_term_floor {
            return Err(config_error(
                "consolidation.promotion_floor must not exceed long_term_floor".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&c.merge_threshold) {
            return Err(config_error(
                "consolidation.merge_threshold must be in [0, 1]".to_string(),
            ));
        }
        if self.task_retention_days <= 0 {
            return Err(config_error(
                "task_retention_days must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the immutable permission matrix
    pub fn matrix(&self) -> Result<PermissionMatrix> {
        let mut grants = HashMap::new();
        for (name, caps) in &self.permissions {
            let role: AgentRole = name.parse().map_err(config_error)?;
            grants.insert(role, caps.iter().cloned().collect::<HashSet<_>>());
        }
        PermissionMatrix::from_grants(grants)
    }

    /// Build the context scoping policy
    pub fn scope_policy(&self) -> Result<ScopePolicy> {
        let mut allow = HashMap::new();
        for (name, fields) in &self.context_allow {
            let role: AgentRole = name.parse().map_err(config_error)?;
            allow.insert(role, fields.iter().cloned().collect::<HashSet<_>>());
        }
        Ok(ScopePolicy::new(allow))
    }

    /// Retention window for terminal tasks
    pub fn task_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.task_retention_days)
    }
}

fn config_error(message: String) -> CortexError {
    CortexError::Config(config::ConfigError::Message(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = CoreConfig::default();
        config.validate().unwrap();
        config.matrix().unwrap();
        config.scope_policy().unwrap();
    }

    #[test]
    fn test_missing_role_aborts_startup() {
        let mut config = CoreConfig::default();
        config.permissions.remove("guardian");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("guardian"));
    }

    #[test]
    fn test_unknown_role_name_rejected() {
        let mut config = CoreConfig::default();
        config
            .permissions
            .insert("oracle".to_string(), vec!["delegate".to_string()]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pool_bound_outside_range_rejected() {
        let mut config = CoreConfig::default();
        config.pool.max_concurrency = 12;
        assert!(config.validate().is_err());
        config.pool.max_concurrency = 2;
        assert!(config.validate().is_err());
        config.pool.max_concurrency = 6;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
task_retention_days = 14

[pool]
max_concurrency = 3
"#
        )
        .unwrap();

        let config = CoreConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.task_retention_days, 14);
        assert_eq!(config.pool.max_concurrency, 3);
        // Untouched sections keep their defaults
        assert!(config.permissions.contains_key("brain"));
        assert!((config.consolidation.merge_threshold - 0.92).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_file_aborts() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[pool]\nmax_concurrency = 50").unwrap();
        assert!(CoreConfig::load(Some(file.path())).is_err());
    }
}
