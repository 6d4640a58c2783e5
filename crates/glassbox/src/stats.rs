use serde::Serialize;

use crate::cgroup::Cgroup;

/// Exit-code sentinel recorded when the code could not be retrieved, which
/// is the expected case after a timeout.
pub const EXIT_CODE_UNKNOWN: i32 = -1;

/// Microseconds to 100-nanosecond ticks.
const TICKS_PER_USEC: u64 = 10;

/// Resource usage and outcome of the most recent run.
///
/// Produced once per invocation after the child has stopped running (or
/// was killed), never mutated afterwards, and overwritten wholesale by the
/// next run on the same [`crate::Sandbox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessStats {
    /// The child's exit code, or [`EXIT_CODE_UNKNOWN`].
    pub exit_code: i32,
    /// Whether the run was cut short by the wall-clock deadline.
    pub timed_out: bool,
    /// Peak memory footprint of the group in bytes, if the query succeeded.
    pub peak_memory_bytes: Option<u64>,
    /// Kernel-mode CPU time in 100-nanosecond ticks, if the query
    /// succeeded.
    pub kernel_time_100ns: Option<u64>,
    /// User-mode CPU time in 100-nanosecond ticks, if the query succeeded.
    pub user_time_100ns: Option<u64>,
}

/// Snapshot the group's usage counters.
///
/// Every query is best-effort: a failed read leaves the field empty
/// instead of failing the run. The exit code and timeout flag are recorded
/// exactly as the supervisor reported them.
pub(crate) fn collect(group: &Cgroup, exit_code: i32, timed_out: bool) -> ProcessStats {
    let times = group.cpu_times();
    ProcessStats {
        exit_code,
        timed_out,
        peak_memory_bytes: group.memory_peak(),
        kernel_time_100ns: times.map(|(_, system)| system.saturating_mul(TICKS_PER_USEC)),
        user_time_100ns: times.map(|(user, _)| user.saturating_mul(TICKS_PER_USEC)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_degrades_to_exit_code_and_flag() {
        let stats = collect(&Cgroup::dead_for_tests(), 42, true);
        assert_eq!(stats.exit_code, 42);
        assert!(stats.timed_out);
        assert_eq!(stats.peak_memory_bytes, None);
        assert_eq!(stats.kernel_time_100ns, None);
        assert_eq!(stats.user_time_100ns, None);
    }

    #[test]
    fn stats_serialize_flat() {
        let stats = ProcessStats {
            exit_code: 0,
            timed_out: false,
            peak_memory_bytes: Some(4096),
            kernel_time_100ns: Some(10),
            user_time_100ns: Some(250),
        };
        let value = serde_json::to_value(stats).unwrap();
        assert_eq!(value["exit_code"], 0);
        assert_eq!(value["timed_out"], false);
        assert_eq!(value["peak_memory_bytes"], 4096);
    }
}
