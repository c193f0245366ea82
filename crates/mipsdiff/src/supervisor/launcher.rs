//! Model launcher role.

use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{ExitStatus, Stdio};
use std::sync::OnceLock;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use nix::unistd::{getpid, getppid};
use tracing::{debug, info, warn};

use super::{ReferenceCommand, SessionDescriptor, SupervisorError};
use crate::cancel::CancelToken;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why the launcher stopped.
#[derive(Debug, PartialEq, Eq)]
pub enum LauncherExit {
    /// The driver closed the liveness channel or died; the reference was killed.
    DriverGone,
    /// The launcher was asked to terminate; the reference was killed.
    Terminated,
    /// The reference model exited by itself.
    ReferenceExited(ExitStatus),
}

/// Run the reference model on behalf of the driver described by `desc`.
///
/// `liveness` is the driver's end of a pipe; end-of-file on it means the
/// driver is gone. `stop` is set by a termination signal to the launcher
/// itself. Blocks until either side ends.
pub fn run_launcher<L>(
    desc: &SessionDescriptor,
    command: &ReferenceCommand,
    liveness: L,
    stop: &CancelToken,
) -> Result<LauncherExit, SupervisorError>
where
    L: Read + Send + 'static,
{
    check_parent(desc)?;

    let launcher = getpid();
    let mut reference = command.command();
    reference.stdin(Stdio::null());
    // SAFETY: the hook only issues prctl/getppid, both async-signal-safe.
    unsafe {
        reference.pre_exec(move || die_with_launcher(launcher));
    }
    let mut child = reference
        .spawn()
        .map_err(|source| SupervisorError::Spawn {
            program: command.program().to_string_lossy().into_owned(),
            source,
        })?;
    let started = Instant::now();
    info!(pid = child.id(), port = desc.port, "reference model started");
    debug!(%command, "reference command line");

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        drain(liveness);
        let _ = tx.send(());
    });

    loop {
        let driver_gone = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => check_parent(desc).is_err(),
        };
        let exit = if stop.is_cancelled() {
            info!("termination requested, stopping reference model");
            Some(LauncherExit::Terminated)
        } else if driver_gone {
            info!("driver gone, stopping reference model");
            Some(LauncherExit::DriverGone)
        } else {
            None
        };
        if let Some(exit) = exit {
            if let Err(e) = child.kill() {
                warn!(error = %e, "failed to kill reference model");
            }
            let _ = child.wait()?;
            return Ok(exit);
        }
        if let Some(status) = child.try_wait()? {
            if started.elapsed() < desc.startup_timeout {
                warn!(%status, "reference model exited during startup");
            } else {
                info!(%status, "reference model exited");
            }
            return Ok(LauncherExit::ReferenceExited(status));
        }
    }
}

/// The driver may already have died between forking us and this check, in
/// which case we were reparented.
fn check_parent(desc: &SessionDescriptor) -> Result<(), SupervisorError> {
    let actual = getppid().as_raw();
    if actual == desc.parent_pid {
        Ok(())
    } else {
        Err(SupervisorError::ParentGone {
            expected: desc.parent_pid,
            actual,
        })
    }
}

/// Runs in the forked reference before exec: the kernel kills it if the
/// launcher dies without cleaning up. The launcher may already be gone by
/// the time the hook runs, so the parent is checked after arming.
#[cfg(target_os = "linux")]
fn die_with_launcher(launcher: nix::unistd::Pid) -> std::io::Result<()> {
    use nix::sys::prctl::set_pdeathsig;
    use nix::sys::signal::Signal;

    set_pdeathsig(Signal::SIGKILL)?;
    if getppid() != launcher {
        return Err(nix::errno::Errno::ESRCH.into());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn die_with_launcher(launcher: nix::unistd::Pid) -> std::io::Result<()> {
    if getppid() != launcher {
        return Err(nix::errno::Errno::ESRCH.into());
    }
    Ok(())
}

fn drain(mut liveness: impl Read) {
    let mut buf = [0u8; 64];
    loop {
        match liveness.read(&mut buf) {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(_) => return,
        }
    }
}

static STOP_TOKEN: OnceLock<CancelToken> = OnceLock::new();

extern "C" fn on_terminate(_signal: nix::libc::c_int) {
    if let Some(token) = STOP_TOKEN.get() {
        token.cancel();
    }
}

/// Signal disposition of the launcher. Terminal interrupts are ignored: the
/// driver decides when the session ends and the launcher follows through the
/// liveness channel. SIGTERM and SIGHUP set `stop`, so the launcher takes the
/// reference model down with it instead of dying first.
pub fn install_launcher_signals(stop: &CancelToken) -> nix::Result<()> {
    use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction, signal};

    let _ = STOP_TOKEN.set(stop.clone());
    let action = SigAction::new(
        SigHandler::Handler(on_terminate),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: SIG_IGN runs no code; the handler only stores to an atomic.
    unsafe {
        signal(Signal::SIGINT, SigHandler::SigIgn)?;
        sigaction(Signal::SIGTERM, &action)?;
        sigaction(Signal::SIGHUP, &action)?;
    }
    Ok(())
}
