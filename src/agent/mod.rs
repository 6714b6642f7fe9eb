//! Agent invocation layer.
//!
//! The code-generation agent is an external black box behind the
//! [`AgentRunner`] trait: given a work item and a timeout it produces exactly
//! one [`Outcome`]. The production implementation ([`CommandRunner`]) spawns
//! a configured subprocess; tests drive the run loop with deterministic
//! stubs instead.

mod command;
mod template;

pub use command::CommandRunner;
pub use template::{render_template, TemplateError};

use crate::backlog::WorkItem;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of one agent invocation for one work item.
///
/// These are operational outcomes, not errors: the run loop maps them to
/// state transitions via the retry policy and the run continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// The agent completed the item (exit code 0).
    Success,
    /// The agent ran but reported failure (non-zero exit code).
    AgentFailure { reason: String },
    /// The attempt exceeded its timeout; the process was killed and reaped.
    Timeout,
    /// The process terminated abnormally (signal, no exit code).
    CrashedProcess { code: i32 },
}

impl Outcome {
    /// Whether the retry policy may dispatch the item again.
    ///
    /// Timeouts and crashes are always retryable; agent failures are
    /// retryable too, bounded by the attempt ceiling the controller applies.
    /// Success is terminal-positive.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Outcome::Success)
    }

    /// Short label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::AgentFailure { .. } => "agent_failure",
            Outcome::Timeout => "timeout",
            Outcome::CrashedProcess { .. } => "crashed",
        }
    }
}

/// One invocation of the external code-generation agent.
///
/// Implementations block the calling thread until the agent completes, the
/// timeout elapses, or the process dies. On timeout the implementation must
/// kill and reap the underlying process before returning; a runner never
/// leaks a live process past this call.
///
/// Errors are reserved for invocation-level problems (unspawnable command);
/// everything the agent itself does maps to an [`Outcome`].
pub trait AgentRunner: Send + Sync {
    fn run(&self, item: &WorkItem, timeout: Duration) -> crate::error::Result<Outcome>;
}
