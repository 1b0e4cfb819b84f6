//! Host resource monitoring.
//!
//! A background thread samples CPU counters once per second into a
//! [`ResourceHistory`] so the adaptive controller can ask for the load over
//! the last minute without blocking. Before the history has enough samples,
//! queries fall back to sampling twice around a real sleep.

mod history;
mod platform;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use crate::signal::StopSignal;
use crate::tracing::prelude::*;

pub use history::{CpuSnapshot, ResourceHistory, DEFAULT_HISTORY_CAPACITY};
#[cfg(target_os = "linux")]
pub use platform::ProcfsStats;
pub use platform::{native, PlatformStats, Unsupported};

const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("CPU time counter went backwards, retry with fresh snapshots")]
    CounterOverflow,

    #[error("cannot compare snapshots of different kinds")]
    MismatchedSnapshots,

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse platform counters: {0}")]
    Parse(String),

    #[error("resource statistics are not supported on this platform")]
    Unsupported,
}

/// Signals the adaptive controller decides on.
pub trait UsageProbe: Send + Sync {
    /// Whether [`usage_over`](Self::usage_over) can answer from history for
    /// the controller's check period.
    fn is_buffered(&self) -> bool;

    /// CPU busy percentage over the last `seconds` seconds.
    fn usage_over(&self, seconds: u32) -> Result<f64, StatsError>;

    fn battery_charging(&self) -> Result<bool, StatsError>;
}

struct Shared {
    history: Mutex<ResourceHistory>,
    stop: StopSignal,
}

/// Background CPU sampler plus battery probe.
pub struct ResourceMonitor {
    platform: Arc<dyn PlatformStats>,
    shared: Arc<Shared>,
    sampler: Mutex<Option<JoinHandle<()>>>,
}

impl ResourceMonitor {
    pub fn new(platform: Arc<dyn PlatformStats>) -> Self {
        Self::with_capacity(platform, DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(platform: Arc<dyn PlatformStats>, capacity: usize) -> Self {
        Self {
            platform,
            shared: Arc::new(Shared {
                history: Mutex::new(ResourceHistory::new(capacity)),
                stop: StopSignal::stopped(),
            }),
            sampler: Mutex::new(None),
        }
    }

    /// Start the sampling thread. Returns `false` if it is already running.
    pub fn start(&self) -> bool {
        let mut sampler = self.sampler.lock();
        if sampler.is_some() {
            return false;
        }

        self.shared.history.lock().clear();
        self.shared.stop.reset();

        let shared = Arc::clone(&self.shared);
        let platform = Arc::clone(&self.platform);
        let handle = thread::Builder::new()
            .name("resource-monitor".into())
            .spawn(move || sample_loop(shared, platform))
            .expect("failed to spawn resource monitor thread");
        *sampler = Some(handle);

        debug!("Resource monitoring started");
        true
    }

    /// Stop sampling and clear the history. Returns `false` if not running.
    pub fn stop(&self) -> bool {
        let Some(handle) = self.sampler.lock().take() else {
            return false;
        };

        self.shared.stop.stop();
        if handle.join().is_err() {
            error!("Resource monitor thread panicked");
        }
        self.shared.history.lock().clear();

        debug!("Resource monitoring stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        !self.shared.stop.is_stopped()
    }

    pub fn is_buffered(&self) -> bool {
        self.is_running() && self.shared.history.lock().is_buffered()
    }

    /// CPU busy percentage over the last `seconds` seconds.
    ///
    /// Answers from history when it holds enough samples. Otherwise blocks
    /// for `seconds` between two fresh snapshots.
    pub fn usage_over(&self, seconds: u32) -> Result<f64, StatsError> {
        if self.is_running() {
            let buffered = self.shared.history.lock().usage_over(seconds as usize);
            if let Some(result) = buffered {
                return result;
            }
        }

        trace!(seconds, "CPU history too short, sampling synchronously");
        let before = self.platform.snapshot_cpu()?;
        thread::sleep(Duration::from_secs(seconds as u64));
        let after = self.platform.snapshot_cpu()?;
        after.load_since(&before)
    }

    pub fn is_battery_charging(&self) -> Result<bool, StatsError> {
        self.platform.battery_charging()
    }
}

impl UsageProbe for ResourceMonitor {
    fn is_buffered(&self) -> bool {
        ResourceMonitor::is_buffered(self)
    }

    fn usage_over(&self, seconds: u32) -> Result<f64, StatsError> {
        ResourceMonitor::usage_over(self, seconds)
    }

    fn battery_charging(&self) -> Result<bool, StatsError> {
        self.is_battery_charging()
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sample_loop(shared: Arc<Shared>, platform: Arc<dyn PlatformStats>) {
    trace!("Resource sampler started");

    loop {
        match platform.snapshot_cpu() {
            Ok(snapshot) => shared.history.lock().push(snapshot),
            Err(e) => debug!(error = %e, "Skipping CPU sample"),
        }

        if shared.stop.sleep(SAMPLE_INTERVAL) {
            break;
        }
    }

    trace!("Resource sampler stopped");
}
