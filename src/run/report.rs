//! End-of-run summary.

use crate::agent::Outcome;
use crate::backlog::{BacklogStore, ItemState};
use crate::error::Result;
use crate::ledger::{Attempt, AttemptLedger};
use crate::run::RunStatus;
use std::fmt::Write;

/// Per-item detail for a Failed or Blocked item.
#[derive(Debug)]
pub struct ItemReport {
    pub item_id: String,
    pub state: ItemState,
    pub attempts: Vec<Attempt>,
}

/// What a run session left behind.
#[derive(Debug)]
pub struct RunReport {
    status: RunStatus,
    succeeded: usize,
    failed: Vec<ItemReport>,
    blocked: Vec<ItemReport>,
    /// Pending items that can never run because a dependency ended Failed
    /// or Blocked, with the offending dependencies.
    stuck: Vec<(String, Vec<String>)>,
}

impl RunReport {
    pub fn build(store: &BacklogStore, ledger: &AttemptLedger, cancelled: bool) -> Result<Self> {
        let mut succeeded = 0;
        let mut failed = Vec::new();
        let mut blocked = Vec::new();
        let mut open_dispatchable = false;

        let stuck_ids: Vec<String> = store
            .permanently_ineligible()
            .iter()
            .map(|i| i.id.clone())
            .collect();

        for item in store.all_items() {
            match item.state {
                ItemState::Succeeded => succeeded += 1,
                ItemState::Failed => failed.push(ItemReport {
                    item_id: item.id.clone(),
                    state: item.state,
                    attempts: ledger.history(&item.id)?,
                }),
                ItemState::Blocked => blocked.push(ItemReport {
                    item_id: item.id.clone(),
                    state: item.state,
                    attempts: ledger.history(&item.id)?,
                }),
                ItemState::Pending => {
                    if !stuck_ids.contains(&item.id) {
                        open_dispatchable = true;
                    }
                }
                ItemState::InProgress => open_dispatchable = true,
            }
        }

        let stuck: Vec<(String, Vec<String>)> = store
            .permanently_ineligible()
            .iter()
            .map(|item| {
                let bad_deps = item
                    .depends_on
                    .iter()
                    .filter(|dep| {
                        matches!(
                            store.get(dep).map(|d| d.state),
                            Some(ItemState::Failed) | Some(ItemState::Blocked)
                        )
                    })
                    .cloned()
                    .collect();
                (item.id.clone(), bad_deps)
            })
            .collect();

        let status = if cancelled {
            RunStatus::Cancelled
        } else if open_dispatchable {
            RunStatus::Halted
        } else if !failed.is_empty() || !blocked.is_empty() || !stuck.is_empty() {
            RunStatus::Incomplete
        } else {
            RunStatus::Completed
        };

        Ok(Self {
            status,
            succeeded,
            failed,
            blocked,
            stuck,
        })
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Number of items that ended Failed or Blocked.
    pub fn incomplete_count(&self) -> usize {
        self.failed.len() + self.blocked.len()
    }

    /// State counts as JSON for the audit log.
    pub fn counts_json(&self, store: &BacklogStore) -> serde_json::Value {
        let counts = store.state_counts();
        let count = |s: ItemState| counts.get(&s).copied().unwrap_or(0);
        serde_json::json!({
            "pending": count(ItemState::Pending),
            "in_progress": count(ItemState::InProgress),
            "succeeded": count(ItemState::Succeeded),
            "failed": count(ItemState::Failed),
            "blocked": count(ItemState::Blocked),
        })
    }

    /// Human-readable summary for the terminal.
    pub fn render(&self) -> String {
        let mut out = String::new();

        let headline = match self.status {
            RunStatus::Completed => "Run complete",
            RunStatus::Incomplete => "Run finished with unresolved items",
            RunStatus::Halted => "Run halted",
            RunStatus::Cancelled => "Run cancelled",
        };
        let _ = writeln!(
            out,
            "{}: {} succeeded, {} failed, {} blocked",
            headline,
            self.succeeded,
            self.failed.len(),
            self.blocked.len()
        );

        for (title, items) in [("Failed items:", &self.failed), ("Blocked items:", &self.blocked)]
        {
            if items.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\n{}", title);
            for report in items {
                let _ = writeln!(
                    out,
                    "  {} ({} attempt(s))",
                    report.item_id,
                    report.attempts.len()
                );
                for attempt in &report.attempts {
                    let _ = writeln!(
                        out,
                        "    attempt {}: {}",
                        attempt.sequence,
                        describe_outcome(&attempt.outcome)
                    );
                }
            }
        }

        if !self.stuck.is_empty() {
            let _ = writeln!(out, "\nStuck behind failed or blocked dependencies:");
            for (id, deps) in &self.stuck {
                let _ = writeln!(out, "  {} (depends on {})", id, deps.join(", "));
            }
        }

        out
    }
}

fn describe_outcome(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Success => "success".to_string(),
        Outcome::AgentFailure { reason } => format!("agent failure ({})", reason),
        Outcome::Timeout => "timeout".to_string(),
        Outcome::CrashedProcess { code } => format!("crashed (signal {})", code),
    }
}
