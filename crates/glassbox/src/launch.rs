use std::ffi::CString;
use std::fs::File;
use std::io::Read;
use std::os::fd::AsRawFd;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{self, ForkResult, Pid};
use tracing::debug;

use crate::error::{Result, SandboxError};

/// A child that exists (has a PID and an address space) but has not
/// executed a single instruction of the target program yet.
///
/// Owns the PID and the exec-status pipe. Dropping an unreaped child kills
/// and reaps it, so early error returns leak nothing.
pub(crate) struct SuspendedChild {
    pid: Pid,
    exec_status: Option<File>,
    reaped: bool,
}

/// Join the executable path and arguments with single spaces.
///
/// No quoting is applied: a token that itself contains a space splits into
/// two argv entries when the line is re-tokenized. Inherited limitation,
/// kept as-is.
fn build_command_line(program: &str, args: &[&str]) -> String {
    let mut line = String::from(program);
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Split a command line into argv tokens the way the OS-level splitter
/// would: on runs of ASCII whitespace. The first token is the executable.
fn tokenize(line: &str) -> Vec<&str> {
    line.split_ascii_whitespace().collect()
}

/// Create the child in a suspended state: forked, stopped before `execvp`,
/// bound to nothing yet.
///
/// The child raises `SIGSTOP` ahead of the exec and the parent waits for
/// the stop, so the caller can attach the PID to a resource group with the
/// guarantee that no target-program instruction has run. An `O_CLOEXEC`
/// pipe carries the `execvp` errno back if the program cannot be started.
pub(crate) fn spawn_suspended(program: &str, args: &[&str]) -> Result<SuspendedChild> {
    let line = build_command_line(program, args);
    let argv = tokenize(&line)
        .into_iter()
        .map(|token| {
            CString::new(token)
                .map_err(|_| SandboxError::Spawn(format!("argument contains NUL: {token:?}")))
        })
        .collect::<Result<Vec<_>>>()?;
    let Some(exe) = argv.first().cloned() else {
        return Err(SandboxError::Spawn("empty command line".into()));
    };

    let (status_read, status_write) = unistd::pipe2(OFlag::O_CLOEXEC)
        .map_err(|e| SandboxError::Spawn(format!("pipe2: {e}")))?;

    // SAFETY: between fork and exec the child calls only async-signal-safe
    // functions (raise, execvp, write, _exit); argv was allocated up front.
    match unsafe { unistd::fork() } {
        Ok(ForkResult::Child) => {
            drop(status_read);
            let _ = signal::raise(Signal::SIGSTOP);
            let _ = unistd::execvp(&exe, &argv);
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            let bytes = errno.to_ne_bytes();
            // SAFETY: plain write(2) on a pipe fd this process owns.
            let _ = unsafe {
                libc::write(status_write.as_raw_fd(), bytes.as_ptr().cast(), bytes.len())
            };
            // SAFETY: leave the forked child without running any cleanup
            // inherited from the parent.
            unsafe { libc::_exit(127) }
        }
        Ok(ForkResult::Parent { child }) => {
            drop(status_write);
            let mut spawned = SuspendedChild {
                pid: child,
                exec_status: Some(File::from(status_read)),
                reaped: false,
            };
            spawned.await_stop()?;
            debug!(pid = child.as_raw(), command = %line, "child created suspended");
            Ok(spawned)
        }
        Err(e) => Err(SandboxError::Spawn(format!("fork: {e}"))),
    }
}

impl SuspendedChild {
    pub(crate) fn pid(&self) -> Pid {
        self.pid
    }

    /// Block until the child reports the pre-exec `SIGSTOP`.
    fn await_stop(&mut self) -> Result<()> {
        loop {
            match waitpid(self.pid, Some(WaitPidFlag::WUNTRACED)) {
                Ok(WaitStatus::Stopped(_, _)) => return Ok(()),
                Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => {
                    self.reaped = true;
                    return Err(SandboxError::Spawn("child exited before suspension".into()));
                }
                Ok(_) => {}
                Err(Errno::EINTR) => {}
                Err(e) => return Err(SandboxError::Spawn(format!("waitpid: {e}"))),
            }
        }
    }

    /// Resume the stopped child. Only called once it is bound to its
    /// resource group.
    pub(crate) fn resume(&self) -> Result<()> {
        signal::kill(self.pid, Signal::SIGCONT)
            .map_err(|e| SandboxError::Spawn(format!("resume pid {}: {e}", self.pid)))
    }

    /// Wait for the exec-status pipe to settle: EOF means the target
    /// program is now running, errno bytes mean `execvp` failed.
    pub(crate) fn confirm_exec(&mut self) -> Result<()> {
        let Some(mut pipe) = self.exec_status.take() else {
            return Ok(());
        };
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)
            .map_err(|e| SandboxError::Spawn(format!("exec status pipe: {e}")))?;
        if buf.is_empty() {
            return Ok(());
        }
        self.reap();
        let detail = match <[u8; 4]>::try_from(buf.as_slice()) {
            Ok(raw) => std::io::Error::from_raw_os_error(i32::from_ne_bytes(raw)).to_string(),
            Err(_) => "unknown error".into(),
        };
        Err(SandboxError::Spawn(format!("execvp: {detail}")))
    }

    /// The supervisor consumed the exit status via `waitpid`; nothing left
    /// to reap.
    pub(crate) fn mark_reaped(&mut self) {
        self.reaped = true;
    }

    /// Reap the child's exit status if it has not been consumed yet.
    /// Idempotent.
    pub(crate) fn reap(&mut self) {
        if self.reaped {
            return;
        }
        self.reaped = true;
        loop {
            match waitpid(self.pid, None) {
                Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => return,
                Ok(_) => {}
                Err(Errno::EINTR) => {}
                Err(_) => return,
            }
        }
    }
}

impl Drop for SuspendedChild {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = signal::kill(self.pid, Signal::SIGKILL);
            self.reap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc_state(pid: Pid) -> Option<char> {
        let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid.as_raw())).ok()?;
        let (_, rest) = stat.rsplit_once(')')?;
        rest.trim().chars().next()
    }

    #[test]
    fn joins_with_single_spaces() {
        assert_eq!(build_command_line("/bin/echo", &["a", "b"]), "/bin/echo a b");
        assert_eq!(build_command_line("/bin/true", &[]), "/bin/true");
    }

    #[test]
    fn spaced_tokens_split() {
        // The documented limitation: no quoting, a spaced token becomes two.
        let line = build_command_line("/bin/echo", &["one two"]);
        assert_eq!(tokenize(&line), vec!["/bin/echo", "one", "two"]);
    }

    #[test]
    fn empty_command_line_is_rejected() {
        assert!(matches!(spawn_suspended("", &[]), Err(SandboxError::Spawn(_))));
    }

    #[test]
    fn child_is_stopped_until_resumed() {
        let mut child = spawn_suspended("/bin/true", &[]).unwrap();
        assert_eq!(proc_state(child.pid()), Some('T'));
        child.resume().unwrap();
        child.confirm_exec().unwrap();
        child.reap();
    }

    #[test]
    fn exec_failure_reports_a_spawn_error() {
        let mut child = spawn_suspended("/nonexistent/glassbox-test-binary", &[]).unwrap();
        child.resume().unwrap();
        assert!(matches!(child.confirm_exec(), Err(SandboxError::Spawn(_))));
    }

    #[test]
    fn dropping_a_suspended_child_reaps_it() {
        let child = spawn_suspended("/bin/sleep", &["300"]).unwrap();
        let pid = child.pid();
        drop(child);
        assert_eq!(
            waitpid(pid, Some(WaitPidFlag::WNOHANG)).err(),
            Some(Errno::ECHILD)
        );
    }
}
