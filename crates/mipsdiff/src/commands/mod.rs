//! Command implementations.

mod launch;
mod run;

use crate::cli::{Cli, Commands};

/// How the process should end once a command returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exit {
    Code(i32),
    /// Terminate abnormally after diagnostics have been printed.
    Abort,
}

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> Exit {
    match &cli.command {
        Commands::Run(args) => run::cmd_run(args, cli.silent),
        Commands::Launch(args) => Exit::Code(launch::cmd_launch(args)),
    }
}
