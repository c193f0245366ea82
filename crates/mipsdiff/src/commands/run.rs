//! `run`: one lockstep session.

use std::net::{Ipv4Addr, SocketAddr};
use std::thread;
use std::time::Duration;

use mipsdiff::isa::AddressSet;
use mipsdiff::{
    CancelToken, ConnectOptions, DutLibrary, Engine, EngineConfig, GdbReference, Outcome,
    Reference, ReferenceCommand, ReferenceProcess, SessionDescriptor, install_interrupt_handler,
    read_entry,
};
use tracing::{info, warn};

use super::Exit;
use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS, RunArgs};
use crate::terminal::{self, Spinner};

pub fn cmd_run(args: &RunArgs, quiet: bool) -> Exit {
    let cancel = CancelToken::new();
    if let Err(e) = install_interrupt_handler(&cancel) {
        warn!(error = %e, "cannot install interrupt handler");
    }

    match session(args, quiet, &cancel) {
        Ok(exit) => exit,
        Err(e) if cancel.is_cancelled() => {
            terminal::warning(&format!("interrupted: {e}"));
            Exit::Code(EXIT_SUCCESS)
        }
        Err(e) => {
            terminal::error(&e.to_string());
            Exit::Code(EXIT_FAILURE)
        }
    }
}

fn session(args: &RunArgs, quiet: bool, cancel: &CancelToken) -> mipsdiff::Result<Exit> {
    let entry = match args.entry {
        Some(entry) => entry,
        None => read_entry(&args.symbol_file)?,
    };
    let dut = DutLibrary::load(&args.dut)?;
    info!(dut = %args.dut.display(), "DUT library loaded");

    let startup_timeout = Duration::from_millis(args.startup_timeout_ms);
    // Held until the session ends; dropping it stops the reference model.
    let _launcher = if args.attach {
        None
    } else {
        let desc = SessionDescriptor::for_current_process(args.port, startup_timeout);
        let command = ReferenceCommand::qemu(
            &args.qemu,
            &args.machine,
            args.port,
            &args.symbol_file,
            &args.qemu_args,
        );
        info!(%command, "launching reference model");
        Some(ReferenceProcess::spawn(&desc, &command)?)
    };

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, args.port));
    let call_timeout = Duration::from_millis(args.ref_timeout_ms);
    let defaults = ConnectOptions::default();
    let options = ConnectOptions {
        connect_timeout: startup_timeout,
        call_timeout,
        run_timeout: defaults.run_timeout.max(call_timeout),
        cancel: cancel.clone(),
    };
    let spinner = Spinner::new(format!("waiting for reference model on {addr}"), quiet);
    let reference = match GdbReference::connect(addr, options) {
        Ok(reference) => {
            spinner.finish_with_success(&format!("reference model connected on {addr}"));
            reference
        }
        Err(e) => {
            spinner.finish_with_failure("reference model did not come up");
            return Err(e.into());
        }
    };

    let mut config = EngineConfig::new(entry, &args.symbol_file);
    config.sync_whitelist = args.sync_pcs.iter().copied().collect::<AddressSet>();
    config.boot_vectors = args.boot_vectors.iter().copied().collect::<AddressSet>();
    config.bubble_ceiling = args.bubble_ceiling;
    config.dut_reset_cycles = args.reset_cycles;
    config.max_commits = args.max_commits;

    terminal::info(&format!("comparing from entry {entry:#010x}"));
    let mut engine = Engine::new(reference, dut, config, cancel.clone());
    let outcome = engine.run()?;
    let (mut reference, _dut) = engine.into_parts();

    match outcome {
        Outcome::Interrupted(stats) => {
            let _ = reference.disconnect();
            terminal::warning(&format!(
                "interrupted after {} commits in {} cycles",
                stats.commits, stats.cycles
            ));
            Ok(Exit::Code(EXIT_SUCCESS))
        }
        Outcome::Completed(stats) => {
            if let Err(e) = reference.disconnect() {
                warn!(error = %e, "reference disconnect failed");
            }
            terminal::success(&format!(
                "{} commits matched in {} cycles ({} syncs)",
                stats.commits, stats.cycles, stats.syncs
            ));
            Ok(Exit::Code(EXIT_SUCCESS))
        }
        Outcome::Failed(failure) => {
            // Let the models' own asynchronous output drain first.
            thread::sleep(Duration::from_millis(args.settle_ms));
            terminal::header("divergence");
            eprintln!("{failure}");
            terminal::error(&failure.kind.to_string());
            Ok(Exit::Abort)
        }
    }
}
