//! Shared helpers for tests.

use crate::agent::{AgentRunner, Outcome};
use crate::backlog::WorkItem;
use crate::context::ProjectContext;
use crate::error::{Result, TrinityError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Deterministic [`AgentRunner`] driven by per-item outcome scripts.
///
/// Each invocation pops the next scripted step for the item; an exhausted
/// or missing script yields `Success`. Tracks invocation order and the peak
/// number of concurrently running invocations.
pub struct ScriptedRunner {
    scripts: Mutex<HashMap<String, VecDeque<std::result::Result<Outcome, String>>>>,
    invocations: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    delay: Duration,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// A runner whose invocations take `delay`, so tests can observe overlap.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            invocations: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            delay,
        }
    }

    /// Queue outcomes for successive invocations of one item.
    pub fn script(&self, item_id: &str, outcomes: Vec<Outcome>) {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.entry(item_id.to_string()).or_default();
        queue.extend(outcomes.into_iter().map(Ok));
    }

    /// Queue an invocation-level error (as from an unspawnable command).
    pub fn script_error(&self, item_id: &str, message: &str) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts
            .entry(item_id.to_string())
            .or_default()
            .push_back(Err(message.to_string()));
    }

    /// Item ids in the order they were dispatched to the runner.
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    /// Peak number of simultaneously running invocations.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl AgentRunner for ScriptedRunner {
    fn run(&self, item: &WorkItem, _timeout: Duration) -> Result<Outcome> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.invocations.lock().unwrap().push(item.id.clone());

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&item.id)
            .and_then(|q| q.pop_front())
            .unwrap_or(Ok(Outcome::Success));

        self.active.fetch_sub(1, Ordering::SeqCst);
        step.map_err(TrinityError::UserError)
    }
}

/// Create a temp project with an initialized state directory.
pub fn temp_project() -> (tempfile::TempDir, ProjectContext) {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let ctx = ProjectContext::at_root(temp_dir.path());
    std::fs::create_dir_all(&ctx.state_dir).unwrap();
    (temp_dir, ctx)
}

/// Change the working directory for the lifetime of the guard.
///
/// The working directory is process-global, so tests using this must run
/// under `#[serial]`.
pub struct DirGuard {
    original: std::path::PathBuf,
}

impl DirGuard {
    pub fn change_to(path: &std::path::Path) -> Self {
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(path).unwrap();
        Self { original }
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.original);
    }
}
