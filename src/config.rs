//! Configuration: store address, limiter algorithm and per-type policies.
//!
//! Loaded once at startup from JSON and immutable afterwards:
//!
//! ```json
//! {
//!   "redis": { "host": "localhost", "port": 6379 },
//!   "rate_limit": {
//!     "type": "sliding_window",
//!     "limits": [ { "type": "status", "limit": 2, "window_size_ms": 60000 } ]
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::rate_limit::LimiterKind;

/// Limit applied to one notification type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitPolicy {
    pub kind: String,
    pub limit: u64,
    pub window: Duration,
}

/// Immutable notification type → policy lookup.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: HashMap<String, LimitPolicy>,
}

impl PolicyTable {
    /// Build a table, rejecting empty types, duplicates, zero limits and
    /// windows shorter than one millisecond.
    pub fn new(policies: impl IntoIterator<Item = LimitPolicy>) -> Result<Self, ConfigError> {
        let mut table = HashMap::new();
        for policy in policies {
            if policy.kind.trim().is_empty() {
                return Err(invalid("limit entry with empty type"));
            }
            if policy.limit == 0 {
                return Err(invalid(format!("limit for '{}' must be positive", policy.kind)));
            }
            if policy.window < Duration::from_millis(1) {
                return Err(invalid(format!(
                    "window for '{}' must be at least 1ms",
                    policy.kind
                )));
            }
            if table.contains_key(&policy.kind) {
                return Err(invalid(format!("duplicate limit for '{}'", policy.kind)));
            }
            table.insert(policy.kind.clone(), policy);
        }
        Ok(Self { policies: table })
    }

    pub fn get(&self, kind: &str) -> Option<&LimitPolicy> {
        self.policies.get(kind)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { reason: reason.into() }
}

/// Redis connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisSettings {
    pub host: String,
    #[serde(default)]
    pub port: u16,
}

impl RedisSettings {
    /// `host:port`, or just `host` when no port is configured.
    pub fn address(&self) -> String {
        if self.port != 0 {
            format!("{}:{}", self.host, self.port)
        } else {
            self.host.clone()
        }
    }

    /// Connection URL for `redis::Client::open`.
    pub fn url(&self) -> String {
        if self.host.contains("://") {
            self.address()
        } else {
            format!("redis://{}", self.address())
        }
    }
}

/// One entry of `rate_limit.limits`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub limit: u64,
    pub window_size_ms: u64,
}

impl From<&LimitEntry> for LimitPolicy {
    fn from(entry: &LimitEntry) -> Self {
        LimitPolicy {
            kind: entry.kind.clone(),
            limit: entry.limit,
            window: Duration::from_millis(entry.window_size_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// `fixed_window` or `sliding_window`.
    #[serde(rename = "type")]
    pub algorithm: String,
    #[serde(default)]
    pub limits: Vec<LimitEntry>,
    /// Optional per-check deadline against the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_timeout_ms: Option<u64>,
}

/// Whole configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub redis: RedisSettings,
    pub rate_limit: RateLimitSettings,
}

impl Settings {
    /// Read and validate the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        let settings = Self::from_json(&content)?;
        tracing::info!(
            path = %path.display(),
            limiter = %settings.rate_limit.algorithm,
            policies = settings.rate_limit.limits.len(),
            "loaded rate limit configuration"
        );
        Ok(settings)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.redis.host.trim().is_empty() {
            return Err(invalid("redis host must not be empty"));
        }
        self.limiter_kind()?;
        self.policies()?;
        if self.rate_limit.check_timeout_ms == Some(0) {
            return Err(invalid("check_timeout_ms must be positive"));
        }
        Ok(())
    }

    pub fn limiter_kind(&self) -> Result<LimiterKind, ConfigError> {
        self.rate_limit.algorithm.parse()
    }

    pub fn policies(&self) -> Result<PolicyTable, ConfigError> {
        PolicyTable::new(self.rate_limit.limits.iter().map(LimitPolicy::from))
    }

    pub fn check_timeout(&self) -> Option<Duration> {
        self.rate_limit.check_timeout_ms.map(Duration::from_millis)
    }
}
