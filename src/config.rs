//! Configuration for the trinity run loop.
//!
//! Represents `.trinity/config.yaml`. Unknown fields are ignored for forward
//! compatibility, optional fields get sensible defaults, and values are
//! validated on load. Policy (retries, concurrency, timeouts, blocked
//! routing) is plain configuration data so variations are testable without
//! code changes.

use crate::error::{Result, TrinityError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Order in which eligible items are dispatched when there are more of them
/// than free concurrency slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOrder {
    /// Lowest attempt count first, ties by insertion order (default).
    ///
    /// Gives fresh items priority over already-retried ones so a single
    /// flaky item cannot starve the rest of the backlog.
    #[default]
    FewestAttemptsFirst,
    /// Strict insertion order.
    Insertion,
}

/// Configuration for the external code-generation agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Command template for one agent invocation.
    ///
    /// Placeholders substituted at dispatch time:
    /// - `{item_id}` - work item identifier
    /// - `{description_file}` - path to the item description written for
    ///   this attempt
    /// - `{project_dir}` - absolute project root
    pub command: String,

    /// Extra environment variables for the agent process.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            environment: BTreeMap::new(),
        }
    }
}

/// Configuration for a trinity project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum simultaneous agent invocations.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: u32,

    /// Retry ceiling per work item.
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_item: u32,

    /// Timeout for a single agent attempt, in seconds.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_seconds: u64,

    /// Consecutive crashed-process outcomes after which an item is routed to
    /// Blocked instead of being retried. 0 disables the predicate, in which
    /// case crash-looping items exhaust retries into Failed.
    #[serde(default = "default_blocked_after_crashes")]
    pub blocked_after_crashes: u32,

    /// Dispatch ordering policy for eligible items.
    #[serde(default)]
    pub dispatch_order: DispatchOrder,

    /// Retries for a failed backlog persist before the run halts.
    #[serde(default = "default_persist_retries")]
    pub persist_retries: u32,

    /// Backoff between persist retries, in milliseconds (doubled per retry).
    #[serde(default = "default_persist_backoff_ms")]
    pub persist_backoff_ms: u64,

    /// External agent invocation settings.
    #[serde(default)]
    pub agent: AgentConfig,
}

fn default_concurrency_limit() -> u32 {
    2
}
fn default_max_attempts() -> u32 {
    3
}
fn default_attempt_timeout() -> u64 {
    900
}
fn default_blocked_after_crashes() -> u32 {
    2
}
fn default_persist_retries() -> u32 {
    3
}
fn default_persist_backoff_ms() -> u64 {
    250
}
fn default_agent_command() -> String {
    "claude -p {description_file}".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            max_attempts_per_item: default_max_attempts(),
            attempt_timeout_seconds: default_attempt_timeout(),
            blocked_after_crashes: default_blocked_after_crashes(),
            dispatch_order: DispatchOrder::default(),
            persist_retries: default_persist_retries(),
            persist_backoff_ms: default_persist_backoff_ms(),
            agent: AgentConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TrinityError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    ///
    /// Unknown fields are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| TrinityError::UserError(format!("failed to parse config YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize config to a YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            TrinityError::UserError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(TrinityError::UserError(
                "config validation failed: concurrency_limit must be greater than 0".to_string(),
            ));
        }
        if self.max_attempts_per_item == 0 {
            return Err(TrinityError::UserError(
                "config validation failed: max_attempts_per_item must be greater than 0"
                    .to_string(),
            ));
        }
        if self.attempt_timeout_seconds == 0 {
            return Err(TrinityError::UserError(
                "config validation failed: attempt_timeout_seconds must be greater than 0"
                    .to_string(),
            ));
        }
        if self.agent.command.trim().is_empty() {
            return Err(TrinityError::UserError(
                "config validation failed: agent.command must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-attempt timeout as a Duration.
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_seconds)
    }
}
