//! `launch`: the model launcher role.

use std::time::Duration;

use mipsdiff::supervisor::install_launcher_signals;
use mipsdiff::{CancelToken, LauncherExit, ReferenceCommand, SessionDescriptor, run_launcher};
use tracing::{error, info, warn};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS, LaunchArgs};

pub fn cmd_launch(args: &LaunchArgs) -> i32 {
    let stop = CancelToken::new();
    if let Err(e) = install_launcher_signals(&stop) {
        warn!(error = %e, "cannot install launcher signal handlers");
    }

    let desc = SessionDescriptor {
        port: args.port,
        parent_pid: args.parent_pid,
        startup_timeout: Duration::from_millis(args.startup_timeout_ms),
    };
    let Some(command) = ReferenceCommand::from_argv(args.command.clone()) else {
        error!("no reference command given");
        return EXIT_FAILURE;
    };

    match run_launcher(&desc, &command, std::io::stdin(), &stop) {
        Ok(LauncherExit::DriverGone) => EXIT_SUCCESS,
        Ok(LauncherExit::Terminated) => {
            info!("launcher terminated by signal");
            EXIT_SUCCESS
        }
        Ok(LauncherExit::ReferenceExited(status)) if status.success() => EXIT_SUCCESS,
        Ok(LauncherExit::ReferenceExited(_)) => EXIT_FAILURE,
        Err(e) => {
            error!(error = %e, "launcher failed");
            EXIT_FAILURE
        }
    }
}
