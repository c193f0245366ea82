//! Process Supervisor: the driver and launcher roles around one port.
//!
//! The driver runs the engine. It starts the launcher (this executable in
//! its `launch` role) with a pipe on stdin. The launcher starts the reference
//! model and kills it as soon as that pipe reaches end-of-file, which happens
//! however the driver exits, so the model is never leaked.

mod launcher;
mod process;

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use thiserror::Error;

pub use launcher::{LauncherExit, install_launcher_signals, run_launcher};
pub use process::ReferenceProcess;

pub const DEFAULT_PORT: u16 = 1234;
pub const DEFAULT_QEMU: &str = "qemu-system-mipsel";
pub const DEFAULT_MACHINE: &str = "mipssim";

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("driver process {expected} is gone (parent is now {actual})")]
    ParentGone { expected: i32, actual: i32 },

    #[error("cannot locate own executable: {0}")]
    CurrentExe(#[source] std::io::Error),
}

/// Rendezvous parameters shared by the driver and the launcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionDescriptor {
    /// Loopback port the reference stub listens on.
    pub port: u16,
    /// Process id of the driver.
    pub parent_pid: i32,
    /// How long the driver waits for the stub to accept.
    pub startup_timeout: Duration,
}

impl SessionDescriptor {
    /// Descriptor for a session driven by the current process.
    #[must_use]
    pub fn for_current_process(port: u16, startup_timeout: Duration) -> Self {
        Self {
            port,
            parent_pid: nix::unistd::getpid().as_raw(),
            startup_timeout,
        }
    }

    /// Launcher command-line arguments encoding this descriptor.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--port".to_string(),
            self.port.to_string(),
            "--parent-pid".to_string(),
            self.parent_pid.to_string(),
            "--startup-timeout-ms".to_string(),
            self.startup_timeout.as_millis().to_string(),
        ]
    }
}

/// Command line that starts the reference model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceCommand {
    program: OsString,
    args: Vec<OsString>,
}

impl ReferenceCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// QEMU halted at reset with its GDB stub on `port`, translating one
    /// instruction per block so single steps are exact.
    pub fn qemu(
        program: impl Into<OsString>,
        machine: &str,
        port: u16,
        kernel: &Path,
        extra: &[String],
    ) -> Self {
        Self::new(program)
            .args(["-M", machine, "-nographic", "-S"])
            .arg("-gdb")
            .arg(format!("tcp:127.0.0.1:{port}"))
            .args(["-accel", "tcg,one-insn-per-tb=on"])
            .arg("-kernel")
            .arg(kernel.as_os_str())
            .args(extra)
    }

    /// Rebuild from an argv whose first element is the program.
    #[must_use]
    pub fn from_argv(argv: Vec<OsString>) -> Option<Self> {
        let mut argv = argv.into_iter();
        let program = argv.next()?;
        Some(Self {
            program,
            args: argv.collect(),
        })
    }

    #[must_use]
    pub fn to_argv(&self) -> Vec<OsString> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    #[must_use]
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub(crate) fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for ReferenceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Path to this executable for the launcher role.
pub(crate) fn current_exe() -> Result<PathBuf, SupervisorError> {
    std::env::current_exe().map_err(SupervisorError::CurrentExe)
}
