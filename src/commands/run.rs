//! `trinity run` - drive the development loop.

use crate::agent::CommandRunner;
use crate::backlog::BacklogStore;
use crate::cli::RunArgs;
use crate::config::Config;
use crate::context::require_initialized_project;
use crate::error::{Result, TrinityError};
use crate::run::{CancelToken, RunSession, RunStatus};
use std::sync::Arc;

pub fn execute(args: RunArgs) -> Result<()> {
    let ctx = require_initialized_project()?;

    let mut config = Config::load(ctx.config_path())?;
    apply_overrides(&mut config, &args)?;

    let store = BacklogStore::load(ctx.backlog_path())?;
    if store.is_empty() {
        println!("Backlog is empty. Add items with `trinity plan add`.");
        return Ok(());
    }
    drop(store);

    let runner = Arc::new(CommandRunner::new(&ctx, config.agent.clone()));
    let session = RunSession::new(ctx, config, runner);
    let report = session.start(&CancelToken::new(), args.once)?;

    print!("{}", report.render());
    match report.status() {
        RunStatus::Incomplete => Err(TrinityError::RunIncomplete(report.incomplete_count())),
        _ => Ok(()),
    }
}

/// Fold CLI overrides into the loaded config, then re-validate.
fn apply_overrides(config: &mut Config, args: &RunArgs) -> Result<()> {
    if let Some(concurrency) = args.concurrency {
        config.concurrency_limit = concurrency;
    }
    if let Some(max_attempts) = args.max_attempts {
        config.max_attempts_per_item = max_attempts;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.attempt_timeout_seconds = timeout_secs;
    }
    config.validate()
}
