//! Audit event log.
//!
//! Commands and the run loop append structured events to
//! `.trinity/events.ndjson` so an operator can reconstruct what happened and
//! when. The log is advisory: a failed append is reported on stderr but
//! never aborts the operation that produced it.

use crate::context::ProjectContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Init,
    PlanAdd,
    Analyze,
    RunStarted,
    ItemDispatched,
    ItemCompleted,
    ItemFailed,
    ItemBlocked,
    RunCompleted,
    RunCancelled,
}

/// One audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// When the event occurred.
    pub ts: DateTime<Utc>,

    /// What happened.
    pub action: EventAction,

    /// Who did it (`user@host`).
    pub actor: String,

    /// Work item involved, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,

    /// Action-specific details.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl Event {
    pub fn new(action: EventAction) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: current_actor(),
            item: None,
            details: Value::Null,
        }
    }

    pub fn with_item(mut self, item_id: impl Into<String>) -> Self {
        self.item = Some(item_id.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Identify the acting user as `user@host`.
fn current_actor() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}@{}", user, host)
}

/// Append an event to the audit log, best-effort.
pub fn append_event(ctx: &ProjectContext, event: &Event) {
    if let Err(e) = try_append(ctx, event) {
        eprintln!("warning: failed to record audit event: {}", e);
    }
}

fn try_append(ctx: &ProjectContext, event: &Event) -> std::io::Result<()> {
    let line = serde_json::to_string(event)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(ctx.events_path())?;
    writeln!(file, "{}", line)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn append_writes_one_ndjson_line_per_event() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ProjectContext::at_root(temp_dir.path());
        std::fs::create_dir_all(&ctx.state_dir).unwrap();

        append_event(&ctx, &Event::new(EventAction::Init));
        append_event(
            &ctx,
            &Event::new(EventAction::PlanAdd)
                .with_item("ITEM-001")
                .with_details(serde_json::json!({"description_len": 42})),
        );

        let content = std::fs::read_to_string(ctx.events_path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Event = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.action, EventAction::Init);
        assert!(first.actor.contains('@'));
        assert!(first.item.is_none());

        let second: Event = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.action, EventAction::PlanAdd);
        assert_eq!(second.item.as_deref(), Some("ITEM-001"));
        assert_eq!(second.details["description_len"], 42);
    }

    #[test]
    fn append_to_missing_directory_does_not_panic() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ProjectContext::at_root(temp_dir.path().join("nope"));
        // State dir does not exist; the append fails quietly.
        append_event(&ctx, &Event::new(EventAction::RunStarted));
    }

    #[test]
    fn action_serializes_snake_case() {
        let json = serde_json::to_string(&EventAction::ItemDispatched).unwrap();
        assert_eq!(json, "\"item_dispatched\"");
    }
}
