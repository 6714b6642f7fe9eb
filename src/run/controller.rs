//! The dispatch loop.
//!
//! The controller owns the backlog and ledger exclusively on the calling
//! thread; agent attempts run on worker threads that report back over a
//! channel. All state transitions and persistence happen on the controller
//! thread, so dispatch decisions always see a consistent backlog.
//!
//! Per iteration: fill free concurrency slots with eligible items, then
//! block on the next completion, record it in the ledger, apply the retry
//! policy, and persist. The loop ends when no items are open, or after
//! cancellation once in-flight attempts have drained.

use crate::agent::{AgentRunner, Outcome};
use crate::backlog::{BacklogStore, ItemState, WorkItem};
use crate::config::{Config, DispatchOrder};
use crate::context::ProjectContext;
use crate::error::{Result, TrinityError};
use crate::events::{append_event, Event, EventAction};
use crate::ledger::{Attempt, AttemptLedger};
use crate::run::persist_with_retry;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Message a worker thread sends when an attempt finishes.
struct AttemptCompletion {
    item_id: String,
    sequence: u32,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    result: Result<Outcome>,
}

/// Drives agent attempts against the backlog until it is drained.
pub struct LoopController<'a> {
    ctx: &'a ProjectContext,
    config: &'a Config,
    runner: Arc<dyn AgentRunner>,
}

impl<'a> LoopController<'a> {
    pub fn new(ctx: &'a ProjectContext, config: &'a Config, runner: Arc<dyn AgentRunner>) -> Self {
        Self {
            ctx,
            config,
            runner,
        }
    }

    /// Run the loop. With `once` set, at most one attempt is dispatched.
    pub fn run(
        &self,
        store: &mut BacklogStore,
        ledger: &mut AttemptLedger,
        cancel: &crate::run::CancelToken,
        once: bool,
    ) -> Result<()> {
        let (tx, rx) = mpsc::channel::<AttemptCompletion>();
        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        let mut in_flight: usize = 0;
        let mut dispatched_total: usize = 0;
        let mut consecutive_crashes: HashMap<String, u32> = HashMap::new();
        let mut fatal: Option<TrinityError> = None;

        loop {
            let dispatch_closed =
                fatal.is_some() || cancel.is_cancelled() || (once && dispatched_total >= 1);

            if !dispatch_closed {
                while in_flight < self.config.concurrency_limit as usize {
                    let Some(id) = self.pick_next(store) else {
                        break;
                    };
                    match self.dispatch(store, &id, &tx, &mut handles) {
                        Ok(()) => {
                            in_flight += 1;
                            dispatched_total += 1;
                        }
                        Err(e) => {
                            fatal = Some(e);
                            break;
                        }
                    }
                    if once {
                        break;
                    }
                }
            }

            if in_flight == 0 {
                break;
            }

            let Ok(completion) = rx.recv() else {
                break;
            };
            in_flight -= 1;

            if let Err(e) =
                self.handle_completion(store, ledger, &mut consecutive_crashes, completion)
            {
                if fatal.is_none() {
                    fatal = Some(e);
                }
            }
        }

        for handle in handles {
            let _ = handle.join();
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Next eligible item id under the configured dispatch order.
    fn pick_next(&self, store: &BacklogStore) -> Option<String> {
        let eligible = store.list_eligible();
        match self.config.dispatch_order {
            DispatchOrder::Insertion => eligible.first().map(|i| i.id.clone()),
            // min_by_key keeps the first of equal keys, so insertion order
            // breaks ties.
            DispatchOrder::FewestAttemptsFirst => eligible
                .iter()
                .min_by_key(|i| i.attempt_count)
                .map(|i| i.id.clone()),
        }
    }

    /// Mark one item InProgress and start a worker thread for it.
    fn dispatch(
        &self,
        store: &mut BacklogStore,
        id: &str,
        tx: &mpsc::Sender<AttemptCompletion>,
        handles: &mut Vec<JoinHandle<()>>,
    ) -> Result<()> {
        store.transition(id, ItemState::InProgress)?;
        let sequence = store.increment_attempts(id)?;
        persist_with_retry(store, self.ctx, self.config)?;

        let item: WorkItem = store
            .get(id)
            .cloned()
            .ok_or_else(|| TrinityError::UserError(format!("item '{}' not found", id)))?;

        append_event(
            self.ctx,
            &Event::new(EventAction::ItemDispatched)
                .with_item(id)
                .with_details(serde_json::json!({ "attempt": sequence })),
        );
        eprintln!("[{}] attempt {} dispatched", id, sequence);

        let runner = Arc::clone(&self.runner);
        let tx = tx.clone();
        let timeout = self.config.attempt_timeout();
        handles.push(std::thread::spawn(move || {
            let started_at = Utc::now();
            let result = runner.run(&item, timeout);
            let ended_at = Utc::now();
            let _ = tx.send(AttemptCompletion {
                item_id: item.id,
                sequence,
                started_at,
                ended_at,
                result,
            });
        }));

        Ok(())
    }

    /// Record an attempt and apply the retry policy.
    fn handle_completion(
        &self,
        store: &mut BacklogStore,
        ledger: &mut AttemptLedger,
        consecutive_crashes: &mut HashMap<String, u32>,
        completion: AttemptCompletion,
    ) -> Result<()> {
        let id = completion.item_id;

        let outcome = match completion.result {
            Ok(outcome) => outcome,
            Err(e) => {
                // Invocation-level failure (unspawnable command): the attempt
                // never ran, so it is not charged. Revert and abort the run.
                store.transition(&id, ItemState::Pending)?;
                store.set_attempts(&id, ledger.attempt_count(&id))?;
                persist_with_retry(store, self.ctx, self.config)?;
                return Err(e);
            }
        };

        ledger.record(&Attempt {
            item_id: id.clone(),
            sequence: completion.sequence,
            started_at: completion.started_at,
            ended_at: completion.ended_at,
            outcome: outcome.clone(),
            diagnostic: None,
        })?;
        eprintln!("[{}] attempt {}: {}", id, completion.sequence, outcome.label());

        if outcome == Outcome::Success {
            consecutive_crashes.remove(&id);
            store.transition(&id, ItemState::Succeeded)?;
            append_event(
                self.ctx,
                &Event::new(EventAction::ItemCompleted)
                    .with_item(&id)
                    .with_details(serde_json::json!({ "attempt": completion.sequence })),
            );
            persist_with_retry(store, self.ctx, self.config)?;
            return Ok(());
        }

        let crashes = if matches!(outcome, Outcome::CrashedProcess { .. }) {
            let entry = consecutive_crashes.entry(id.clone()).or_insert(0);
            *entry += 1;
            *entry
        } else {
            consecutive_crashes.remove(&id);
            0
        };

        let attempts = store.get(&id).map(|i| i.attempt_count).unwrap_or(0);

        if self.config.blocked_after_crashes > 0 && crashes >= self.config.blocked_after_crashes {
            store.transition(&id, ItemState::Blocked)?;
            append_event(
                self.ctx,
                &Event::new(EventAction::ItemBlocked)
                    .with_item(&id)
                    .with_details(serde_json::json!({ "consecutive_crashes": crashes })),
            );
            eprintln!(
                "[{}] blocked after {} consecutive crashed attempts",
                id, crashes
            );
        } else if attempts >= self.config.max_attempts_per_item {
            store.transition(&id, ItemState::Failed)?;
            append_event(
                self.ctx,
                &Event::new(EventAction::ItemFailed)
                    .with_item(&id)
                    .with_details(serde_json::json!({ "attempts": attempts })),
            );
            eprintln!("[{}] failed after {} attempts", id, attempts);
        } else {
            store.transition(&id, ItemState::Pending)?;
        }

        persist_with_retry(store, self.ctx, self.config)
    }
}
