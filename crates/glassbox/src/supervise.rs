use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use tracing::debug;

use crate::error::{Result, SandboxError};
use crate::launch::SuspendedChild;

/// Poll interval for the deadline-bounded wait.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Terminal states of a supervised run.
pub(crate) enum WaitOutcome {
    /// The child exited on its own before the deadline.
    Exited(i32),
    /// The deadline elapsed first; the child is still running.
    TimedOut,
}

/// Block until the resumed child exits or the deadline elapses.
///
/// `timeout: None` waits indefinitely, making the timed-out outcome
/// unreachable. A child torn down by a signal maps to `128 + signo`, the
/// usual shell convention. On `Exited` the child's status has been
/// consumed; on `TimedOut` the caller still owns a running child and must
/// kill and reap it. `waitpid` failures are fatal and never retried.
pub(crate) fn wait_with_deadline(
    child: &mut SuspendedChild,
    timeout: Option<Duration>,
) -> Result<WaitOutcome> {
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        match waitpid(child.pid(), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    debug!(pid = child.pid().as_raw(), "deadline elapsed");
                    return Ok(WaitOutcome::TimedOut);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Ok(WaitStatus::Exited(_, code)) => {
                child.mark_reaped();
                return Ok(WaitOutcome::Exited(code));
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                child.mark_reaped();
                return Ok(WaitOutcome::Exited(128 + signal as i32));
            }
            Ok(_) => {}
            Err(Errno::EINTR) => {}
            Err(e) => {
                return Err(SandboxError::Wait(format!("waitpid pid {}: {e}", child.pid())));
            }
        }
    }
}
