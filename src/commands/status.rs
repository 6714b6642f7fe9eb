//! `trinity status` - backlog overview and recent activity.

use crate::backlog::{BacklogStore, ItemState};
use crate::context::{require_initialized_project, ProjectContext};
use crate::error::Result;
use crate::events::Event;
use std::fmt::Write;

/// How many recent audit events to show.
const RECENT_EVENTS: usize = 5;

pub fn execute() -> Result<()> {
    let ctx = require_initialized_project()?;
    let store = BacklogStore::load(ctx.backlog_path())?;
    print!("{}", render_status(&ctx, &store));
    Ok(())
}

pub(crate) fn render_status(ctx: &ProjectContext, store: &BacklogStore) -> String {
    let mut out = String::new();
    let counts = store.state_counts();
    let count = |s: ItemState| counts.get(&s).copied().unwrap_or(0);

    let _ = writeln!(out, "Backlog: {} item(s)", store.len());
    for state in [
        ItemState::Pending,
        ItemState::InProgress,
        ItemState::Succeeded,
        ItemState::Failed,
        ItemState::Blocked,
    ] {
        let n = count(state);
        if n > 0 {
            let _ = writeln!(out, "  {:<12} {}", state.to_string(), n);
        }
    }

    let stuck = store.permanently_ineligible();
    if !stuck.is_empty() {
        let _ = writeln!(out, "\nStuck behind failed or blocked dependencies:");
        for item in stuck {
            let _ = writeln!(out, "  {} (depends on {})", item.id, item.depends_on.join(", "));
        }
    }

    let recent = recent_events(ctx);
    if !recent.is_empty() {
        let _ = writeln!(out, "\nRecent activity:");
        for event in recent {
            let item = event.item.as_deref().unwrap_or("-");
            let _ = writeln!(
                out,
                "  {} {:?} {}",
                event.ts.format("%Y-%m-%d %H:%M:%S"),
                event.action,
                item
            );
        }
    }
    out
}

/// Last few audit events, oldest first. Unreadable lines are skipped; the
/// audit log is advisory and must not break status.
fn recent_events(ctx: &ProjectContext) -> Vec<Event> {
    let Ok(content) = std::fs::read_to_string(ctx.events_path()) else {
        return Vec::new();
    };
    let events: Vec<Event> = content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();
    let skip = events.len().saturating_sub(RECENT_EVENTS);
    events.into_iter().skip(skip).collect()
}
