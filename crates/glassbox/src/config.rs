use std::time::Duration;

/// Resource quotas and deadline for sandboxed runs.
///
/// `None` means unlimited. The setters on [`crate::Sandbox`] treat a zero
/// quota the same as never setting one, so a config with no limits
/// degenerates to "run to completion, no quota".
#[derive(Debug, Clone, Default)]
pub struct SandboxConfig {
    /// Per-group memory ceiling in megabytes.
    pub memory_limit_mb: Option<u64>,
    /// Hard CPU-rate cap as a percentage of one CPU; 100 or above lifts
    /// the cap.
    pub cpu_percent: Option<u32>,
    /// Wall-clock deadline for a run. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl SandboxConfig {
    /// Memory ceiling converted to the bytes the group backend expects.
    pub(crate) fn memory_limit_bytes(&self) -> Option<u64> {
        self.memory_limit_mb.map(|mb| mb.saturating_mul(1024 * 1024))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn megabytes_convert_to_bytes() {
        let config = SandboxConfig {
            memory_limit_mb: Some(64),
            ..SandboxConfig::default()
        };
        assert_eq!(config.memory_limit_bytes(), Some(64 * 1024 * 1024));
    }

    #[test]
    fn absent_limit_stays_absent() {
        assert_eq!(SandboxConfig::default().memory_limit_bytes(), None);
    }

    #[test]
    fn conversion_saturates() {
        let config = SandboxConfig {
            memory_limit_mb: Some(u64::MAX),
            ..SandboxConfig::default()
        };
        assert_eq!(config.memory_limit_bytes(), Some(u64::MAX));
    }
}
