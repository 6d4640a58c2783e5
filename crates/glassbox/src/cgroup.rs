use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, SandboxError};

/// Root of the unified cgroup v2 hierarchy.
const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Parent directory holding one child group per invocation.
const PARENT_GROUP: &str = "glassbox";

/// Period for `cpu.max` quotas, in microseconds.
const CPU_PERIOD_USEC: u64 = 100_000;

/// One OS-level resource-limiting group, exclusively owned by a single
/// invocation.
///
/// Dropping the handle closes the group: every member process is killed
/// and the group directory is removed.
pub(crate) struct Cgroup {
    name: String,
    path: PathBuf,
}

/// `cpu.max` value for a hard cap at `percent` of one CPU.
fn cpu_max_line(percent: u32) -> String {
    if percent >= 100 {
        format!("max {CPU_PERIOD_USEC}")
    } else {
        format!("{} {CPU_PERIOD_USEC}", u64::from(percent) * CPU_PERIOD_USEC / 100)
    }
}

fn read_counter(path: &Path) -> Option<u64> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse().ok()
}

impl Cgroup {
    /// Create a fresh, empty, uniquely-named group under
    /// `/sys/fs/cgroup/glassbox/`.
    pub(crate) fn create() -> Result<Self> {
        let parent = Path::new(CGROUP_ROOT).join(PARENT_GROUP);
        fs::create_dir_all(&parent)
            .map_err(|e| SandboxError::Group(format!("create {}: {e}", parent.display())))?;

        // Delegate the controllers we configure to the per-run children.
        // Idempotent; a miss surfaces as a limit-application failure later,
        // which is non-fatal.
        if let Err(e) = fs::write(parent.join("cgroup.subtree_control"), "+memory +cpu") {
            warn!(error = %e, "could not enable memory/cpu controllers");
        }

        let name = format!("run-{}", Uuid::new_v4());
        let path = parent.join(&name);
        fs::create_dir(&path)
            .map_err(|e| SandboxError::Group(format!("create {}: {e}", path.display())))?;
        debug!(group = %name, "resource group created");
        Ok(Self { name, path })
    }

    /// Set the group's memory ceiling in bytes. Swap is pinned to zero so
    /// the ceiling bounds the real footprint rather than the resident part.
    ///
    /// Best-effort: a failure is logged and the run continues.
    pub(crate) fn apply_memory_limit(&self, bytes: u64) {
        if let Err(e) = fs::write(self.path.join("memory.max"), bytes.to_string()) {
            warn!(group = %self.name, error = %e, "failed to set memory ceiling");
            return;
        }
        if let Err(e) = fs::write(self.path.join("memory.swap.max"), "0") {
            debug!(group = %self.name, error = %e, "failed to disable swap");
        }
    }

    /// Hard-cap the group's CPU rate. Best-effort: a failure is logged and
    /// the run continues.
    pub(crate) fn apply_cpu_limit(&self, percent: u32) {
        if let Err(e) = fs::write(self.path.join("cpu.max"), cpu_max_line(percent)) {
            warn!(group = %self.name, error = %e, "failed to set cpu cap");
        }
    }

    /// Bind a process to the group. The caller only ever passes a child
    /// that is still suspended, so the quotas are in force before its
    /// first instruction.
    pub(crate) fn attach(&self, pid: Pid) -> Result<()> {
        fs::write(self.path.join("cgroup.procs"), pid.as_raw().to_string())
            .map_err(|e| SandboxError::Attach(format!("pid {pid} -> {}: {e}", self.name)))
    }

    /// Kill every process in the group, including anything the child
    /// spawned.
    pub(crate) fn kill_all(&self) {
        if let Err(e) = fs::write(self.path.join("cgroup.kill"), "1") {
            // cgroup.kill needs kernel 5.14+; fall back to signalling each
            // member listed in cgroup.procs.
            debug!(group = %self.name, error = %e, "cgroup.kill unavailable, signalling members");
            if let Ok(procs) = fs::read_to_string(self.path.join("cgroup.procs")) {
                for line in procs.lines() {
                    if let Ok(pid) = line.trim().parse() {
                        let _ = signal::kill(Pid::from_raw(pid), Signal::SIGKILL);
                    }
                }
            }
        }
    }

    /// Peak memory footprint of the group in bytes, best-effort.
    pub(crate) fn memory_peak(&self) -> Option<u64> {
        // memory.peak needs kernel 5.19+; fall back to the current figure.
        read_counter(&self.path.join("memory.peak"))
            .or_else(|| read_counter(&self.path.join("memory.current")))
    }

    /// `(user, system)` CPU time of the group in microseconds, best-effort.
    pub(crate) fn cpu_times(&self) -> Option<(u64, u64)> {
        let stat = match fs::read_to_string(self.path.join("cpu.stat")) {
            Ok(stat) => stat,
            Err(e) => {
                warn!(group = %self.name, error = %e, "failed to read cpu.stat");
                return None;
            }
        };
        let mut user_usec = None;
        let mut system_usec = None;
        for line in stat.lines() {
            if let Some(v) = line.strip_prefix("user_usec ") {
                user_usec = v.trim().parse().ok();
            } else if let Some(v) = line.strip_prefix("system_usec ") {
                system_usec = v.trim().parse().ok();
            }
        }
        Some((user_usec?, system_usec?))
    }

    /// Whether the group exposes the quota knobs this crate configures.
    fn has_controllers(&self) -> bool {
        self.path.join("memory.max").exists() && self.path.join("cpu.max").exists()
    }
}

impl Drop for Cgroup {
    fn drop(&mut self) {
        // Closing the group terminates everything still attached to it.
        self.kill_all();
        // rmdir succeeds only once the kernel has torn the members down;
        // retry briefly instead of leaking the directory.
        for _ in 0..50 {
            match fs::remove_dir(&self.path) {
                Ok(()) => {
                    debug!(group = %self.name, "resource group removed");
                    return;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => return,
                Err(_) => thread::sleep(Duration::from_millis(10)),
            }
        }
        warn!(group = %self.name, "resource group directory left behind");
    }
}

/// Whether this host exposes a writable cgroup v2 hierarchy with the
/// memory and cpu controllers available to this process.
pub fn cgroups_available() -> bool {
    Cgroup::create().is_ok_and(|group| group.has_controllers())
}

#[cfg(test)]
impl Cgroup {
    /// A handle onto a path that does not exist, for exercising the
    /// degraded paths without a writable hierarchy.
    pub(crate) fn dead_for_tests() -> Self {
        Self {
            name: "test".into(),
            path: PathBuf::from("/nonexistent/glassbox-test"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_quota_scales_with_percent() {
        assert_eq!(cpu_max_line(1), "1000 100000");
        assert_eq!(cpu_max_line(25), "25000 100000");
        assert_eq!(cpu_max_line(100), "max 100000");
        assert_eq!(cpu_max_line(250), "max 100000");
    }

    #[test]
    fn limit_application_is_best_effort_but_attach_is_not() {
        let group = Cgroup::dead_for_tests();
        group.apply_memory_limit(64 * 1024 * 1024);
        group.apply_cpu_limit(50);
        assert!(matches!(
            group.attach(Pid::from_raw(1)),
            Err(SandboxError::Attach(_))
        ));
    }

    #[test]
    fn queries_on_a_dead_group_return_none() {
        let group = Cgroup::dead_for_tests();
        assert_eq!(group.memory_peak(), None);
        assert_eq!(group.cpu_times(), None);
    }
}
