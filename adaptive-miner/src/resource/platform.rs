//! Operating system probes for CPU time and power state.

use std::sync::Arc;

use super::{CpuSnapshot, StatsError};

/// Platform capability the resource monitor samples.
pub trait PlatformStats: Send + Sync {
    /// Current cumulative CPU counters.
    fn snapshot_cpu(&self) -> Result<CpuSnapshot, StatsError>;

    /// Whether the machine is running on external power.
    fn battery_charging(&self) -> Result<bool, StatsError>;
}

/// Probe for the platform the miner was built for.
pub fn native() -> Arc<dyn PlatformStats> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(linux::ProcfsStats::default())
    }

    #[cfg(not(target_os = "linux"))]
    {
        Arc::new(Unsupported)
    }
}

#[cfg(target_os = "linux")]
pub use linux::ProcfsStats;

#[cfg(target_os = "linux")]
mod linux {
    use std::fs;
    use std::io;
    use std::path::PathBuf;

    use super::{CpuSnapshot, PlatformStats, StatsError};

    /// Reads `/proc/stat` and the `BAT0` power supply in sysfs.
    #[derive(Debug, Clone)]
    pub struct ProcfsStats {
        proc_stat: PathBuf,
        battery_status: PathBuf,
    }

    impl ProcfsStats {
        pub fn new(proc_stat: impl Into<PathBuf>, battery_status: impl Into<PathBuf>) -> Self {
            Self {
                proc_stat: proc_stat.into(),
                battery_status: battery_status.into(),
            }
        }
    }

    impl Default for ProcfsStats {
        fn default() -> Self {
            Self::new("/proc/stat", "/sys/class/power_supply/BAT0/status")
        }
    }

    impl PlatformStats for ProcfsStats {
        fn snapshot_cpu(&self) -> Result<CpuSnapshot, StatsError> {
            let text = fs::read_to_string(&self.proc_stat).map_err(|e| StatsError::Read {
                path: self.proc_stat.display().to_string(),
                source: e,
            })?;
            parse_proc_stat(&text)
        }

        fn battery_charging(&self) -> Result<bool, StatsError> {
            match fs::read_to_string(&self.battery_status) {
                Ok(status) => Ok(parse_battery_status(&status)),
                // No battery: the machine runs from mains.
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
                Err(e) => Err(StatsError::Read {
                    path: self.battery_status.display().to_string(),
                    source: e,
                }),
            }
        }
    }

    /// Parse the aggregate `cpu` line: user, nice, system, idle.
    pub(super) fn parse_proc_stat(text: &str) -> Result<CpuSnapshot, StatsError> {
        let line = text
            .lines()
            .find(|line| line.starts_with("cpu "))
            .ok_or_else(|| StatsError::Parse("no aggregate cpu line".into()))?;

        let mut fields = line.split_whitespace().skip(1).map(|f| {
            f.parse::<u64>()
                .map_err(|_| StatsError::Parse(format!("bad counter {f:?}")))
        });
        let mut next = || {
            fields
                .next()
                .unwrap_or_else(|| Err(StatsError::Parse("short cpu line".into())))
        };

        Ok(CpuSnapshot::Ticks {
            user: next()?,
            user_low: next()?,
            sys: next()?,
            idle: next()?,
        })
    }

    pub(super) fn parse_battery_status(status: &str) -> bool {
        matches!(status.trim(), "Charging" | "Full")
    }
}

/// Placeholder for targets without a probe. Every query fails, which the
/// controller treats as "unknown".
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

impl PlatformStats for Unsupported {
    fn snapshot_cpu(&self) -> Result<CpuSnapshot, StatsError> {
        Err(StatsError::Unsupported)
    }

    fn battery_charging(&self) -> Result<bool, StatsError> {
        Err(StatsError::Unsupported)
    }
}
