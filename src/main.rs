//! trinity - autonomous AI development loops.
//!
//! Drives an external code-generation agent against a backlog of work items,
//! retrying failures and recording every attempt, until the backlog is done.

mod agent;
mod backlog;
mod cli;
mod commands;
mod config;
mod context;
mod error;
mod events;
mod exit_codes;
mod fs;
mod ledger;
mod run;

#[cfg(test)]
mod test_support;

use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    match commands::execute(cli) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
