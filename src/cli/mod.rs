//! Command-line interface definitions using clap derive.

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "trinity",
    version,
    about = "Autonomous AI development loops",
    long_about = "Trinity drives an external code-generation agent against a \
                  backlog of work items, retrying failures and tracking every \
                  attempt, until the backlog is done."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize trinity state in the current directory
    Init,

    /// Analyze the codebase and record a summary
    Analyze,

    /// Manage the work item backlog
    Plan {
        #[command(subcommand)]
        command: PlanCommand,
    },

    /// Show backlog state and recent activity
    Status,

    /// Run the development loop until the backlog is drained
    Run(RunArgs),
}

#[derive(Subcommand)]
pub enum PlanCommand {
    /// Add a work item to the backlog
    Add(PlanAddArgs),

    /// List all backlog items
    List,

    /// Show one item with its attempt history
    Show(PlanShowArgs),
}

#[derive(Args)]
pub struct PlanAddArgs {
    /// What the agent should build (free-form text)
    pub description: String,

    /// Explicit item ID (default: next free ITEM-NNN)
    #[arg(long)]
    pub id: Option<String>,

    /// Items that must succeed before this one runs (repeatable)
    #[arg(long = "depends-on", value_name = "ITEM_ID")]
    pub depends_on: Vec<String>,
}

#[derive(Args)]
pub struct PlanShowArgs {
    /// Item ID (e.g. ITEM-001)
    pub id: String,
}

#[derive(Args)]
pub struct RunArgs {
    /// Maximum simultaneous agent invocations (overrides config)
    #[arg(long)]
    pub concurrency: Option<u32>,

    /// Retry ceiling per item (overrides config)
    #[arg(long = "max-attempts")]
    pub max_attempts: Option<u32>,

    /// Per-attempt timeout in seconds (overrides config)
    #[arg(long = "timeout-secs")]
    pub timeout_secs: Option<u64>,

    /// Dispatch at most one attempt, then exit
    #[arg(long)]
    pub once: bool,
}
