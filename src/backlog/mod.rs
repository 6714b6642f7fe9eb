//! Work item model for trinity.
//!
//! A work item is one unit of backlog derived from the PRD: an opaque
//! description the agent implements, plus lifecycle state, attempt count,
//! and dependencies on other items. Items move through a fixed state
//! machine; `Succeeded`, `Failed`, and `Blocked` are terminal.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

mod store;

pub use store::BacklogStore;

/// Regex pattern for valid work item IDs.
static ITEM_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ITEM-\d{3,}$").expect("Invalid item ID regex"));

/// Lifecycle state of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Waiting for dispatch (initial state).
    Pending,
    /// Currently being worked by an agent invocation.
    InProgress,
    /// Agent completed the item (terminal).
    Succeeded,
    /// Retries exhausted (terminal).
    Failed,
    /// Routed out of retry by policy, e.g. repeated crashes (terminal).
    Blocked,
}

impl ItemState {
    /// Whether the item can never be dispatched again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Blocked)
    }

    /// Whether `self -> to` is a legal state machine transition.
    ///
    /// ```text
    /// Pending    -> InProgress   (dispatch)
    /// InProgress -> Succeeded    (agent success)
    /// InProgress -> Pending      (retryable outcome, attempts remain)
    /// InProgress -> Failed       (retries exhausted)
    /// InProgress -> Blocked      (blocked predicate matched)
    /// ```
    pub fn can_transition_to(self, to: ItemState) -> bool {
        matches!(
            (self, to),
            (ItemState::Pending, ItemState::InProgress)
                | (ItemState::InProgress, ItemState::Succeeded)
                | (ItemState::InProgress, ItemState::Pending)
                | (ItemState::InProgress, ItemState::Failed)
                | (ItemState::InProgress, ItemState::Blocked)
        )
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemState::Pending => "pending",
            ItemState::InProgress => "in_progress",
            ItemState::Succeeded => "succeeded",
            ItemState::Failed => "failed",
            ItemState::Blocked => "blocked",
        };
        write!(f, "{}", s)
    }
}

/// A single backlog unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Stable unique identifier (e.g. "ITEM-001").
    pub id: String,

    /// Free-form specification text; opaque to the loop.
    pub description: String,

    /// Lifecycle state.
    pub state: ItemState,

    /// Number of dispatches so far.
    #[serde(default)]
    pub attempt_count: u32,

    /// Item IDs that must be Succeeded before this item is eligible.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// Create a fresh pending item.
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            state: ItemState::Pending,
            attempt_count: 0,
            depends_on: Vec::new(),
            created_at: Some(Utc::now()),
        }
    }

    /// Builder-style dependency list.
    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }
}

/// Validate a work item ID, normalizing to uppercase.
///
/// Valid IDs match `ITEM-NNN` with at least 3 digits. Path separators are
/// rejected because IDs name log directories on disk.
pub fn validate_item_id(item_id: &str) -> crate::error::Result<String> {
    if item_id.contains('/') || item_id.contains('\\') || item_id.contains("..") {
        return Err(crate::error::TrinityError::UserError(format!(
            "invalid item ID '{}': contains path characters.\n\
             Item IDs must be in the format ITEM-NNN (e.g., ITEM-001).",
            item_id
        )));
    }

    let normalized = item_id.to_uppercase();
    if !ITEM_ID_REGEX.is_match(&normalized) {
        return Err(crate::error::TrinityError::UserError(format!(
            "invalid item ID '{}': must be in the format ITEM-NNN (e.g., ITEM-001).\n\
             The number must be at least 3 digits.",
            item_id
        )));
    }

    Ok(normalized)
}

/// Generate an item ID from a number, zero-padded to at least 3 digits.
pub fn generate_item_id(number: u32) -> String {
    format!("ITEM-{:03}", number)
}

/// Extract the numeric part of an item ID.
pub fn item_number(item_id: &str) -> Option<u32> {
    item_id.strip_prefix("ITEM-")?.parse().ok()
}
