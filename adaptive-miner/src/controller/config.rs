use std::time::Duration;

use crate::resource::DEFAULT_HISTORY_CAPACITY;

/// Tuning for the adaptive controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// How often the controller wakes to probe the host.
    pub system_check_period: Duration,

    /// CPU busy percentage above which mining is considered intrusive.
    pub cpu_usage_threshold: f64,

    /// Window the CPU usage is averaged over when looking for a trend.
    pub cpu_usage_check_period: Duration,

    /// Debounce between arming a trigger and committing its transition.
    /// Also the window of the confirming CPU re-sample.
    pub double_check_period: Duration,

    /// Seconds of CPU samples the resource monitor keeps. Must cover
    /// `cpu_usage_check_period` for the controller to see CPU load at all.
    pub history_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            system_check_period: Duration::from_secs(5),
            cpu_usage_threshold: 25.0,
            cpu_usage_check_period: Duration::from_secs(60),
            double_check_period: Duration::from_secs(10),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl ControllerConfig {
    /// History capacity grown to span the CPU averaging window.
    pub fn covering_history(self) -> Self {
        let window = self.cpu_usage_check_period.as_secs() as usize;
        Self {
            history_capacity: self.history_capacity.max(window),
            ..self
        }
    }
}
