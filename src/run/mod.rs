//! The run loop: session setup, dispatch controller, and final report.
//!
//! A run session loads the backlog and attempt ledger, reconciles any state
//! left behind by an interrupted run, then hands control to the
//! [`LoopController`] which dispatches agent attempts until the backlog has
//! no open items or the session is cancelled.

mod controller;
mod report;

pub use controller::LoopController;
pub use report::RunReport;

use crate::agent::AgentRunner;
use crate::backlog::{BacklogStore, ItemState};
use crate::config::Config;
use crate::context::ProjectContext;
use crate::error::Result;
use crate::events::{append_event, Event, EventAction};
use crate::ledger::AttemptLedger;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative cancellation flag shared with signal handlers.
///
/// Cancellation is checked before each dispatch; in-flight attempts are
/// allowed to finish and their outcomes are recorded before the session
/// returns.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// How a run session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every item ended Succeeded.
    Completed,
    /// The backlog has no open items but some ended Failed or Blocked, or
    /// are stuck behind such an item.
    Incomplete,
    /// The session stopped with dispatchable items still pending
    /// (single-attempt mode).
    Halted,
    /// The session was cancelled; remaining items keep their state.
    Cancelled,
}

/// One `trinity run` invocation.
pub struct RunSession {
    ctx: ProjectContext,
    config: Config,
    runner: Arc<dyn AgentRunner>,
}

impl RunSession {
    pub fn new(ctx: ProjectContext, config: Config, runner: Arc<dyn AgentRunner>) -> Self {
        Self {
            ctx,
            config,
            runner,
        }
    }

    /// Run the loop to completion (or cancellation) and report the result.
    ///
    /// With `once` set, at most one attempt is dispatched; the session ends
    /// after its outcome is recorded.
    pub fn start(&self, cancel: &CancelToken, once: bool) -> Result<RunReport> {
        let mut store = BacklogStore::load(self.ctx.backlog_path())?;
        let mut ledger = AttemptLedger::open(self.ctx.ledger_path())?;

        self.reconcile_interrupted(&mut store, &ledger)?;
        persist_with_retry(&store, &self.ctx, &self.config)?;

        append_event(
            &self.ctx,
            &Event::new(EventAction::RunStarted)
                .with_details(serde_json::json!({ "items": store.len(), "once": once })),
        );

        let controller = LoopController::new(&self.ctx, &self.config, Arc::clone(&self.runner));
        controller.run(&mut store, &mut ledger, cancel, once)?;

        let report = RunReport::build(&store, &ledger, cancel.is_cancelled())?;
        let end_action = match report.status() {
            RunStatus::Cancelled => EventAction::RunCancelled,
            _ => EventAction::RunCompleted,
        };
        append_event(
            &self.ctx,
            &Event::new(end_action).with_details(report.counts_json(&store)),
        );

        Ok(report)
    }

    /// Reset items a previous process left InProgress.
    ///
    /// An InProgress item in a fresh session means the old process died
    /// mid-attempt. The item goes back to Pending and its attempt count is
    /// set to the number of attempts the ledger actually recorded, so a
    /// dispatch that never produced an outcome is not charged against the
    /// retry ceiling.
    fn reconcile_interrupted(
        &self,
        store: &mut BacklogStore,
        ledger: &AttemptLedger,
    ) -> Result<()> {
        let interrupted: Vec<String> = store
            .all_items()
            .filter(|i| i.state == ItemState::InProgress)
            .map(|i| i.id.clone())
            .collect();

        for id in interrupted {
            eprintln!("[{}] resuming interrupted attempt", id);
            store.transition(&id, ItemState::Pending)?;
            store.set_attempts(&id, ledger.attempt_count(&id))?;
        }
        Ok(())
    }
}

/// Persist the backlog, retrying transient failures with doubling backoff.
pub(crate) fn persist_with_retry(
    store: &BacklogStore,
    ctx: &ProjectContext,
    config: &Config,
) -> Result<()> {
    let mut delay = Duration::from_millis(config.persist_backoff_ms);
    let mut tries = 0;

    loop {
        match store.persist(ctx.backlog_path()) {
            Ok(()) => return Ok(()),
            Err(e) if tries < config.persist_retries => {
                tries += 1;
                eprintln!(
                    "warning: backlog persist failed ({}), retry {}/{}",
                    e, tries, config.persist_retries
                );
                std::thread::sleep(delay);
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Outcome;
    use crate::backlog::WorkItem;
    use crate::ledger::Attempt;
    use crate::test_support::ScriptedRunner;
    use chrono::Utc;
    use tempfile::TempDir;

    fn make_project(temp_dir: &TempDir) -> ProjectContext {
        let ctx = ProjectContext::at_root(temp_dir.path());
        std::fs::create_dir_all(&ctx.state_dir).unwrap();
        ctx
    }

    fn record(ledger: &mut AttemptLedger, item_id: &str, sequence: u32, outcome: Outcome) {
        let now = Utc::now();
        ledger
            .record(&Attempt {
                item_id: item_id.to_string(),
                sequence,
                started_at: now,
                ended_at: now,
                outcome,
                diagnostic: None,
            })
            .unwrap();
    }

    #[test]
    fn cancel_token_is_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn session_runs_backlog_to_completion() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = make_project(&temp_dir);

        let mut store = BacklogStore::new();
        store.insert(WorkItem::new("ITEM-001", "first")).unwrap();
        store.insert(WorkItem::new("ITEM-002", "second")).unwrap();
        store.persist(ctx.backlog_path()).unwrap();

        let runner = Arc::new(ScriptedRunner::new());
        let session = RunSession::new(ctx.clone(), Config::default(), runner);
        let report = session.start(&CancelToken::new(), false).unwrap();

        assert_eq!(report.status(), RunStatus::Completed);
        let reloaded = BacklogStore::load(ctx.backlog_path()).unwrap();
        assert!(reloaded
            .all_items()
            .all(|i| i.state == ItemState::Succeeded));
    }

    #[test]
    fn interrupted_items_are_reset_to_pending_with_ledger_counts() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = make_project(&temp_dir);

        // Simulate a previous process dying mid-attempt: the backlog says
        // attempt 2 was dispatched but the ledger only recorded attempt 1.
        let mut store = BacklogStore::new();
        store.insert(WorkItem::new("ITEM-001", "work")).unwrap();
        store
            .transition("ITEM-001", ItemState::InProgress)
            .unwrap();
        store.set_attempts("ITEM-001", 2).unwrap();
        store.persist(ctx.backlog_path()).unwrap();

        let mut ledger = AttemptLedger::open(ctx.ledger_path()).unwrap();
        record(&mut ledger, "ITEM-001", 1, Outcome::Timeout);

        let runner = Arc::new(ScriptedRunner::new());
        let session = RunSession::new(ctx.clone(), Config::default(), runner.clone());
        let report = session.start(&CancelToken::new(), false).unwrap();

        assert_eq!(report.status(), RunStatus::Completed);

        // The interrupted dispatch was not charged: the successful attempt
        // was recorded as sequence 2, not 3.
        let reopened = AttemptLedger::open(ctx.ledger_path()).unwrap();
        assert_eq!(reopened.attempt_count("ITEM-001"), 2);
        let history = reopened.history("ITEM-001").unwrap();
        assert_eq!(history.last().map(|a| a.outcome.clone()), Some(Outcome::Success));
    }

    #[test]
    fn cancelled_before_start_dispatches_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = make_project(&temp_dir);

        let mut store = BacklogStore::new();
        store.insert(WorkItem::new("ITEM-001", "work")).unwrap();
        store.persist(ctx.backlog_path()).unwrap();

        let runner = Arc::new(ScriptedRunner::new());
        let token = CancelToken::new();
        token.cancel();

        let session = RunSession::new(ctx.clone(), Config::default(), runner.clone());
        let report = session.start(&token, false).unwrap();

        assert_eq!(report.status(), RunStatus::Cancelled);
        assert_eq!(runner.invocation_count(), 0);
        let reloaded = BacklogStore::load(ctx.backlog_path()).unwrap();
        assert_eq!(reloaded.get("ITEM-001").unwrap().state, ItemState::Pending);
    }

    #[test]
    fn once_dispatches_a_single_attempt() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = make_project(&temp_dir);

        let mut store = BacklogStore::new();
        store.insert(WorkItem::new("ITEM-001", "first")).unwrap();
        store.insert(WorkItem::new("ITEM-002", "second")).unwrap();
        store.persist(ctx.backlog_path()).unwrap();

        let runner = Arc::new(ScriptedRunner::new());
        let session = RunSession::new(ctx.clone(), Config::default(), runner.clone());
        let report = session.start(&CancelToken::new(), true).unwrap();

        assert_eq!(runner.invocation_count(), 1);
        // One item done, one still pending.
        assert_eq!(report.status(), RunStatus::Halted);
        let reloaded = BacklogStore::load(ctx.backlog_path()).unwrap();
        let counts = reloaded.state_counts();
        assert_eq!(counts.get(&ItemState::Succeeded), Some(&1));
        assert_eq!(counts.get(&ItemState::Pending), Some(&1));
    }
}
