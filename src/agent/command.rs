//! Subprocess-backed agent runner.
//!
//! Executes the configured agent command for one work item with timeout
//! enforcement and output capture. The item description is written to a
//! per-attempt prompt file; stdout/stderr are redirected to per-attempt log
//! files under `.trinity/logs/<item_id>/`.

use crate::agent::{render_template, AgentRunner, Outcome, TemplateError};
use crate::backlog::WorkItem;
use crate::config::AgentConfig;
use crate::context::ProjectContext;
use crate::error::{Result, TrinityError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// Poll interval while waiting for the agent process.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Production [`AgentRunner`] that spawns the configured agent command.
pub struct CommandRunner {
    agent: AgentConfig,
    project_root: PathBuf,
    logs_root: PathBuf,
}

impl CommandRunner {
    pub fn new(ctx: &ProjectContext, agent: AgentConfig) -> Self {
        Self {
            agent,
            project_root: ctx.project_root.clone(),
            logs_root: ctx.state_dir.join("logs"),
        }
    }

    fn item_logs_dir(&self, item_id: &str) -> PathBuf {
        self.logs_root.join(item_id)
    }

    /// Write the item description where the agent command can read it.
    fn write_prompt(&self, item: &WorkItem) -> Result<PathBuf> {
        let dir = self.item_logs_dir(&item.id);
        std::fs::create_dir_all(&dir).map_err(|e| {
            TrinityError::UserError(format!(
                "failed to create agent logs directory '{}': {}",
                dir.display(),
                e
            ))
        })?;

        let path = dir.join(format!("attempt-{}.prompt.md", item.attempt_count));
        std::fs::write(&path, &item.description).map_err(|e| {
            TrinityError::UserError(format!(
                "failed to write prompt file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(path)
    }

    fn build_command(&self, item: &WorkItem, prompt_path: &PathBuf) -> Result<Vec<String>> {
        let mut vars = HashMap::new();
        vars.insert("item_id".to_string(), item.id.clone());
        vars.insert(
            "description_file".to_string(),
            prompt_path.to_string_lossy().to_string(),
        );
        vars.insert(
            "project_dir".to_string(),
            self.project_root.to_string_lossy().to_string(),
        );

        let command_str = render_template(&self.agent.command, &vars).map_err(|e| match e {
            TemplateError::UndefinedVariable { name, .. } => TrinityError::UserError(format!(
                "agent command template references undefined variable '{}'\n\
                 Command: {}\n\
                 Available variables: item_id, description_file, project_dir",
                name, self.agent.command
            )),
            other => TrinityError::UserError(format!("invalid agent command template: {}", other)),
        })?;

        let args = shell_words::split(&command_str).map_err(|e| {
            TrinityError::UserError(format!(
                "failed to parse agent command '{}': {}\n\
                 Fix: check for unmatched quotes or invalid escape sequences.",
                command_str, e
            ))
        })?;

        if args.is_empty() {
            return Err(TrinityError::UserError(format!(
                "agent command is empty after parsing: '{}'",
                command_str
            )));
        }

        Ok(args)
    }
}

impl AgentRunner for CommandRunner {
    fn run(&self, item: &WorkItem, timeout: Duration) -> Result<Outcome> {
        let prompt_path = self.write_prompt(item)?;
        let args = self.build_command(item, &prompt_path)?;

        let logs_dir = self.item_logs_dir(&item.id);
        let stdout_path = logs_dir.join(format!("attempt-{}.stdout.log", item.attempt_count));
        let stderr_path = logs_dir.join(format!("attempt-{}.stderr.log", item.attempt_count));

        let stdout_file = std::fs::File::create(&stdout_path).map_err(|e| {
            TrinityError::UserError(format!(
                "failed to create stdout log '{}': {}",
                stdout_path.display(),
                e
            ))
        })?;
        let stderr_file = std::fs::File::create(&stderr_path).map_err(|e| {
            TrinityError::UserError(format!(
                "failed to create stderr log '{}': {}",
                stderr_path.display(),
                e
            ))
        })?;

        let mut command = Command::new(&args[0]);
        command
            .args(&args[1..])
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file));

        for (key, value) in &self.agent.environment {
            command.env(key, value);
        }

        // A command that cannot be spawned at all is a configuration
        // problem, not an agent outcome; retrying it would loop pointlessly.
        let mut child = command.spawn().map_err(|e| {
            TrinityError::UserError(format!(
                "failed to execute agent command '{}': {}\n\
                 Fix: ensure the command is installed and in PATH.",
                args[0], e
            ))
        })?;

        match wait_with_timeout(&mut child, timeout)? {
            Some(status) => Ok(map_status(status)),
            None => Ok(Outcome::Timeout),
        }
    }
}

/// Wait for a child process, killing it if the timeout elapses.
///
/// Returns `None` on timeout; the process is killed and reaped before
/// returning, so no process outlives this call.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>> {
    let start = Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    // SIGKILL on unix; TerminateProcess on windows. wait()
                    // reaps the zombie entry.
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok(None);
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                return Err(TrinityError::UserError(format!(
                    "failed to check agent process status: {}",
                    e
                )));
            }
        }
    }
}

/// Map a normal process exit to an outcome.
fn map_status(status: ExitStatus) -> Outcome {
    match status.code() {
        Some(0) => Outcome::Success,
        Some(code) => Outcome::AgentFailure {
            reason: format!("exit code {}", code),
        },
        // No exit code means the process was terminated by a signal.
        None => Outcome::CrashedProcess {
            code: crash_code(&status),
        },
    }
}

#[cfg(unix)]
fn crash_code(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().unwrap_or(-1)
}

#[cfg(not(unix))]
fn crash_code(_status: &ExitStatus) -> i32 {
    -1
}
