//! `trinity init` - scaffold the state directory.

use crate::backlog::BacklogStore;
use crate::config::Config;
use crate::context::ProjectContext;
use crate::error::{Result, TrinityError};
use crate::events::{append_event, Event, EventAction};
use crate::fs::atomic_write_file;

pub fn execute() -> Result<()> {
    let cwd = std::env::current_dir().map_err(|e| {
        TrinityError::UserError(format!("failed to get current working directory: {}", e))
    })?;
    init_project(&ProjectContext::at_root(&cwd))
}

/// Create `.trinity/` with a default config and an empty backlog.
///
/// Idempotent: existing config and backlog are left untouched, so re-running
/// init repairs missing pieces without destroying state.
pub(crate) fn init_project(ctx: &ProjectContext) -> Result<()> {
    let already_initialized = ctx.config_path().exists();

    std::fs::create_dir_all(ctx.state_dir.join("logs")).map_err(|e| {
        TrinityError::IoFailure(format!(
            "failed to create state directory '{}': {}",
            ctx.state_dir.display(),
            e
        ))
    })?;

    if !ctx.config_path().exists() {
        let yaml = Config::default().to_yaml()?;
        atomic_write_file(ctx.config_path(), &yaml)?;
    }

    if !ctx.backlog_path().exists() {
        BacklogStore::new().persist(ctx.backlog_path())?;
    }

    append_event(ctx, &Event::new(EventAction::Init));

    if already_initialized {
        println!(
            "Trinity project at {} already initialized",
            ctx.project_root.display()
        );
    } else {
        println!(
            "Initialized trinity project at {}",
            ctx.project_root.display()
        );
        println!("Edit {} to configure the agent command.", ctx.config_path().display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn init_creates_state_layout() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ProjectContext::at_root(temp_dir.path());

        init_project(&ctx).unwrap();

        assert!(ctx.state_dir.is_dir());
        assert!(ctx.state_dir.join("logs").is_dir());
        assert!(ctx.config_path().is_file());
        assert!(ctx.backlog_path().is_file());

        let config = Config::load(ctx.config_path()).unwrap();
        assert!(config.validate().is_ok());
        let store = BacklogStore::load(ctx.backlog_path()).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn init_is_idempotent_and_preserves_state() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ProjectContext::at_root(temp_dir.path());
        init_project(&ctx).unwrap();

        // Customize the config, add an item, then re-run init.
        let mut config = Config::default();
        config.concurrency_limit = 7;
        atomic_write_file(ctx.config_path(), &config.to_yaml().unwrap()).unwrap();
        let mut store = BacklogStore::new();
        store
            .insert(crate::backlog::WorkItem::new("ITEM-001", "keep me"))
            .unwrap();
        store.persist(ctx.backlog_path()).unwrap();

        init_project(&ctx).unwrap();

        let config = Config::load(ctx.config_path()).unwrap();
        assert_eq!(config.concurrency_limit, 7);
        let store = BacklogStore::load(ctx.backlog_path()).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn init_records_an_audit_event() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ProjectContext::at_root(temp_dir.path());
        init_project(&ctx).unwrap();

        let events = std::fs::read_to_string(ctx.events_path()).unwrap();
        assert!(events.contains("\"init\""));
    }
}
