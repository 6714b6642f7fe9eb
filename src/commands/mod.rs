//! Command implementations.

mod analyze;
mod init;
mod plan;
mod run;
mod status;

use crate::cli::{Cli, Command};
use crate::error::Result;

/// Execute the parsed command line.
pub fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init => init::execute(),
        Command::Analyze => analyze::execute(),
        Command::Plan { command } => plan::execute(command),
        Command::Status => status::execute(),
        Command::Run(args) => run::execute(args),
    }
}
