//! mipsdiff CLI - lockstep MIPS differential tester

mod cli;
mod commands;
mod terminal;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use commands::Exit;

fn main() {
    let cli = Cli::parse();

    let metrics_handle = if cli.metrics {
        mipsdiff::metrics::CliRecorder::new().install()
    } else {
        None
    };
    mipsdiff::metrics::init();

    let default_level = if cli.verbose {
        "mipsdiff=debug"
    } else if cli.silent {
        "mipsdiff=error"
    } else {
        "mipsdiff=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let exit = commands::run_command(&cli);

    if let Some(handle) = metrics_handle {
        handle.print_summary();
    }

    match exit {
        Exit::Code(code) => std::process::exit(code),
        Exit::Abort => std::process::abort(),
    }
}
