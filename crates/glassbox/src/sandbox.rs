use std::time::Duration;

use tracing::{error, info};

use crate::cgroup::Cgroup;
use crate::config::SandboxConfig;
use crate::error::Result;
use crate::launch;
use crate::stats::{self, EXIT_CODE_UNKNOWN, ProcessStats};
use crate::supervise::{self, WaitOutcome};

/// Integer returned by the `run*` facade when the deadline elapsed.
///
/// On the integer channel this is indistinguishable from a real exit code
/// of `1`; callers that need certainty must check
/// [`ProcessStats::timed_out`] or use [`Sandbox::execute`].
pub const TIMEOUT_EXIT_CODE: i32 = 1;

/// Integer returned by the `run*` facade on any internal failure.
pub const FAILURE_EXIT_CODE: i32 = -1;

/// How a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The child exited (or was torn down by a signal) before the deadline.
    Exited(i32),
    /// The deadline elapsed and the whole group was terminated.
    TimedOut,
}

/// Outcome plus usage statistics of one run.
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub stats: ProcessStats,
}

/// Runs programs under memory, CPU-rate and wall-clock quotas.
///
/// One value supervises one run at a time and keeps the statistics of the
/// latest run until the next one overwrites them. Independent values share
/// nothing and may run concurrently from separate threads.
#[derive(Debug, Default)]
pub struct Sandbox {
    config: SandboxConfig,
    last_stats: Option<ProcessStats>,
}

impl Sandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SandboxConfig) -> Self {
        Self {
            config,
            last_stats: None,
        }
    }

    /// Memory ceiling in megabytes for subsequent runs; `0` removes it.
    pub fn set_memory_limit_mb(&mut self, megabytes: u64) {
        self.config.memory_limit_mb = (megabytes > 0).then_some(megabytes);
    }

    /// Hard CPU cap in percent for subsequent runs; `0` removes it.
    pub fn set_cpu_percent(&mut self, percent: u32) {
        self.config.cpu_percent = (percent > 0).then_some(percent);
    }

    /// Wall-clock deadline in milliseconds for subsequent runs; `0` means
    /// wait indefinitely.
    pub fn set_timeout_ms(&mut self, millis: u64) {
        self.config.timeout = (millis > 0).then(|| Duration::from_millis(millis));
    }

    /// Statistics of the most recent run, if any run has completed.
    pub fn last_stats(&self) -> Option<&ProcessStats> {
        self.last_stats.as_ref()
    }

    /// Run a program with the configured limits and deadline.
    ///
    /// Returns the child's exit code on completion,
    /// [`TIMEOUT_EXIT_CODE`] when the deadline elapsed, and
    /// [`FAILURE_EXIT_CODE`] on any internal failure (the diagnostic goes
    /// to the error stream via `tracing`).
    pub fn run(&mut self, program: &str, args: &[&str]) -> i32 {
        self.run_facade(program, args, self.config.timeout)
    }

    /// Like [`Sandbox::run`], but with a one-off deadline in milliseconds
    /// that overrides the configured one for this call only; `0` waits
    /// indefinitely.
    pub fn run_with_timeout(&mut self, program: &str, args: &[&str], timeout_ms: u64) -> i32 {
        let timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));
        self.run_facade(program, args, timeout)
    }

    /// Run a program and return the tagged outcome instead of the
    /// collapsed integer.
    ///
    /// `timeout` overrides the configured deadline for this call only;
    /// `None` falls back to the configured value.
    pub fn execute(
        &mut self,
        program: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<RunReport> {
        self.execute_inner(program, args, timeout.or(self.config.timeout))
    }

    fn run_facade(&mut self, program: &str, args: &[&str], timeout: Option<Duration>) -> i32 {
        match self.execute_inner(program, args, timeout) {
            Ok(report) => match report.outcome {
                RunOutcome::Exited(code) => code,
                RunOutcome::TimedOut => TIMEOUT_EXIT_CODE,
            },
            Err(e) => {
                error!(program, error = %e, "sandboxed run failed");
                FAILURE_EXIT_CODE
            }
        }
    }

    fn execute_inner(
        &mut self,
        program: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<RunReport> {
        let mut child = launch::spawn_suspended(program, args)?;
        let group = Cgroup::create()?;

        if let Some(bytes) = self.config.memory_limit_bytes() {
            group.apply_memory_limit(bytes);
        }
        if let Some(percent) = self.config.cpu_percent {
            group.apply_cpu_limit(percent);
        }

        // The quotas must be in force before the child's first instruction:
        // bind while still suspended, only then resume.
        group.attach(child.pid())?;
        child.resume()?;
        child.confirm_exec()?;

        let report = match supervise::wait_with_deadline(&mut child, timeout)? {
            WaitOutcome::Exited(code) => {
                info!(program, code, "child exited");
                RunReport {
                    outcome: RunOutcome::Exited(code),
                    stats: stats::collect(&group, code, false),
                }
            }
            WaitOutcome::TimedOut => {
                // Usage snapshot first, then tear the whole group down.
                let stats = stats::collect(&group, EXIT_CODE_UNKNOWN, true);
                info!(program, "deadline elapsed, terminating group");
                group.kill_all();
                child.reap();
                RunReport {
                    outcome: RunOutcome::TimedOut,
                    stats,
                }
            }
        };
        self.last_stats = Some(report.stats);
        Ok(report)
    }
}
