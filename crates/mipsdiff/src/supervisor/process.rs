//! Driver-side handle on the launcher.

use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{ReferenceCommand, SessionDescriptor, SupervisorError, current_exe};

/// How long the launcher gets to tear the model down before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A running launcher, holding the write end of its liveness channel.
///
/// Dropping the handle closes the channel, which makes the launcher stop
/// the reference model, and then reaps the launcher.
pub struct ReferenceProcess {
    child: Child,
    liveness: Option<ChildStdin>,
}

impl ReferenceProcess {
    /// Start this executable in its `launch` role for `desc`.
    pub fn spawn(
        desc: &SessionDescriptor,
        command: &ReferenceCommand,
    ) -> Result<Self, SupervisorError> {
        let mut launcher = Command::new(current_exe()?);
        launcher
            .arg("launch")
            .args(desc.to_args())
            .arg("--")
            .args(command.to_argv());
        Self::from_command(launcher)
    }

    /// Start `command` with a piped stdin as the liveness channel.
    pub fn from_command(mut command: Command) -> Result<Self, SupervisorError> {
        let program = command.get_program().to_string_lossy().into_owned();
        let mut child = command
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|source| SupervisorError::Spawn { program, source })?;
        let liveness = child.stdin.take();
        debug!(pid = child.id(), "launcher started");
        Ok(Self { child, liveness })
    }

    /// Whether the launcher has already exited.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>, SupervisorError> {
        Ok(self.child.try_wait()?)
    }

    /// Close the liveness channel and wait for the launcher, killing it if
    /// it does not finish within the grace period.
    pub fn shutdown(mut self) -> Result<ExitStatus, SupervisorError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<ExitStatus, SupervisorError> {
        drop(self.liveness.take());
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!(pid = self.child.id(), "launcher did not stop, killing it");
                self.child.kill()?;
                return Ok(self.child.wait()?);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for ReferenceProcess {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "failed to stop launcher");
        }
    }
}
