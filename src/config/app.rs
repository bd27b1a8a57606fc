//! Root application configuration: what the teacher calls `SchedulerConfig`,
//! generalized to this crate's worker pool, router, and cluster.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::worker_pool::WorkerPoolConfig;
use crate::router::RouterConfig;

/// A per-label token-bucket rate limit, applied via
/// `PriorityWorkerPool::set_rate_limit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// The label this limit governs.
    pub label: String,
    /// Tokens refilled per second.
    pub fill_rate: f64,
    /// Maximum token bucket size.
    pub capacity: f64,
}

/// A per-label in-flight concurrency cap, applied via
/// `PriorityWorkerPool::set_concurrency_limit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyLimitConfig {
    /// The label this cap governs.
    pub label: String,
    /// Maximum simultaneously in-flight tasks carrying this label.
    pub max: u32,
}

/// A remote executor the dispatcher can route work to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteNodeConfig {
    /// Human-readable node name.
    pub name: String,
    /// Base URL the wire protocol is relative to (no trailing slash).
    pub base_url: String,
    /// Capability labels this node advertises.
    pub labels: HashSet<String>,
    /// Bearer token sent with every request, if configured.
    pub auth_token: Option<String>,
    /// Positive weight; higher weight is preferred among equally-loaded nodes.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

const fn default_weight() -> u32 {
    1
}

/// Root configuration for a deployment: the local pool, the router, the
/// cluster's remote nodes, and rate/concurrency limit tables.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Local worker pool configuration.
    #[serde(default)]
    pub pool: WorkerPoolConfig,
    /// Router tunables.
    #[serde(default)]
    pub router: RouterConfig,
    /// Remote nodes to register with the dispatcher at startup.
    #[serde(default)]
    pub nodes: Vec<RemoteNodeConfig>,
    /// Rate limits to install on the pool at startup.
    #[serde(default)]
    pub rate_limits: Vec<RateLimitConfig>,
    /// Concurrency limits to install on the pool at startup.
    #[serde(default)]
    pub concurrency_limits: Vec<ConcurrencyLimitConfig>,
}

impl AppConfig {
    /// Validate every nested section.
    ///
    /// # Errors
    /// Returns a description string naming the first invalid section.
    pub fn validate(&self) -> Result<(), String> {
        self.pool
            .validate()
            .map_err(|e| format!("pool config invalid: {e}"))?;
        for limit in &self.rate_limits {
            if limit.fill_rate <= 0.0 || limit.capacity <= 0.0 {
                return Err(format!(
                    "rate limit for label `{}` must have positive fill_rate and capacity",
                    limit.label
                ));
            }
        }
        for limit in &self.concurrency_limits {
            if limit.max == 0 {
                return Err(format!(
                    "concurrency limit for label `{}` must be greater than 0",
                    limit.label
                ));
            }
        }
        for node in &self.nodes {
            if node.base_url.is_empty() {
                return Err(format!("node `{}` has an empty base_url", node.name));
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate it.
    ///
    /// # Errors
    /// Returns a description string on a parse error or a failed validation.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_rate_limit() {
        let mut cfg = AppConfig::default();
        cfg.rate_limits.push(RateLimitConfig {
            label: "llm".into(),
            fill_rate: 0.0,
            capacity: 1.0,
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_from_json() {
        let json = r#"{"nodes": [{"name": "a", "base_url": "http://x", "labels": ["llm"]}]}"#;
        let cfg = AppConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.nodes.len(), 1);
        assert_eq!(cfg.nodes[0].weight, 1);
    }
}
