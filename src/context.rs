//! Project context resolution for trinity.
//!
//! Trinity state lives in a `.trinity/` directory at the project root. All
//! commands locate it by walking up from the current working directory, so
//! trinity can be invoked from anywhere inside the project.

use crate::error::{Result, TrinityError};
use std::env;
use std::path::{Path, PathBuf};

/// State directory name at the project root.
pub const STATE_DIR: &str = ".trinity";

/// Resolved paths for a trinity project.
///
/// All paths are absolute.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// Project root (the directory containing `.trinity/`).
    pub project_root: PathBuf,

    /// State directory (`{project_root}/.trinity/`).
    pub state_dir: PathBuf,
}

impl ProjectContext {
    /// Resolve the project context from the current working directory.
    ///
    /// Walks up the directory tree looking for a `.trinity/` directory.
    pub fn resolve() -> Result<Self> {
        let cwd = env::current_dir().map_err(|e| {
            TrinityError::UserError(format!("failed to get current working directory: {}", e))
        })?;
        Self::resolve_from(&cwd)
    }

    /// Resolve the project context starting from a specific directory.
    pub fn resolve_from<P: AsRef<Path>>(start: P) -> Result<Self> {
        let start = start.as_ref();

        let mut dir = Some(start);
        while let Some(current) = dir {
            let candidate = current.join(STATE_DIR);
            if candidate.is_dir() {
                return Ok(Self::at_root(current));
            }
            dir = current.parent();
        }

        Err(TrinityError::UserError(format!(
            "no trinity project found at or above '{}'.\n\
             Run `trinity init` at your project root first.",
            start.display()
        )))
    }

    /// Build a context rooted at a known project directory.
    ///
    /// Does not check that the state directory exists; used by `init`.
    pub fn at_root<P: AsRef<Path>>(root: P) -> Self {
        let project_root = root.as_ref().to_path_buf();
        let state_dir = project_root.join(STATE_DIR);
        Self {
            project_root,
            state_dir,
        }
    }

    /// Path to the config file.
    pub fn config_path(&self) -> PathBuf {
        self.state_dir.join("config.yaml")
    }

    /// Path to the backlog store snapshot.
    pub fn backlog_path(&self) -> PathBuf {
        self.state_dir.join("backlog.json")
    }

    /// Path to the attempt ledger.
    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir.join("attempts.ndjson")
    }

    /// Path to the run-session audit log.
    pub fn events_path(&self) -> PathBuf {
        self.state_dir.join("events.ndjson")
    }

    /// Path to the codebase analysis output.
    pub fn analysis_path(&self) -> PathBuf {
        self.state_dir.join("analysis.json")
    }

    /// Directory holding captured agent output for one item.
    pub fn item_logs_dir(&self, item_id: &str) -> PathBuf {
        self.state_dir.join("logs").join(item_id)
    }
}

/// Resolve the context and verify the project is initialized.
pub fn require_initialized_project() -> Result<ProjectContext> {
    let ctx = ProjectContext::resolve()?;
    if !ctx.config_path().exists() {
        return Err(TrinityError::UserError(format!(
            "trinity state at '{}' is missing config.yaml.\n\
             Run `trinity init` to repair the project setup.",
            ctx.state_dir.display()
        )));
    }
    Ok(ctx)
}
