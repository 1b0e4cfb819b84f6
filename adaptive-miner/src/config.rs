//! Miner configuration.
//!
//! The daemon reads its settings from `ADAPTIVE_MINER_*` environment
//! variables:
//!
//! - `ADAPTIVE_MINER_ADDRESS`: address to mine to (presence requests mining)
//! - `ADAPTIVE_MINER_THREADS`: mining threads (default 1, at least 1)
//! - `ADAPTIVE_MINER_CPU_SAVING`: pause while the host is busy (`1`/`true`)
//! - `ADAPTIVE_MINER_BATTERY_SAVING`: pause while on battery (`1`/`true`)
//! - `ADAPTIVE_MINER_EXTRA_MESSAGES`: path of the extra messages file
//! - `ADAPTIVE_MINER_CHECK_PERIOD`: controller tick in seconds (default 5)
//! - `ADAPTIVE_MINER_CPU_THRESHOLD`: CPU percentage (default 25, 1-100)
//! - `ADAPTIVE_MINER_CPU_WINDOW`: CPU averaging window in seconds (default 60)
//! - `ADAPTIVE_MINER_DOUBLE_CHECK`: debounce in seconds (default 10)

use std::path::PathBuf;
use std::time::Duration;

use crate::controller::ControllerConfig;
use crate::node::MiningAddress;
use crate::tracing::prelude::*;

/// Input to [`MiningEngine::init`](crate::engine::MiningEngine::init).
#[derive(Debug, Clone, Default)]
pub struct MinerOptions {
    /// Newline-separated base64 messages to rotate through.
    pub extra_messages_file: Option<PathBuf>,

    /// Mine to this address once the node is synchronized.
    pub start_mining: Option<String>,

    /// Threads for `start_mining`; `None` means one.
    pub mining_threads: Option<u32>,

    /// Pause while the host is busy with other work.
    pub cpu_saving: bool,

    /// Pause while running on battery.
    pub battery_saving: bool,
}

/// Settings for a daemon run.
#[derive(Debug, Clone)]
pub struct MinerConfig {
    pub options: MinerOptions,
    pub controller: ControllerConfig,
}

impl MinerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| -> Option<u64> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(key, value = %raw, "Ignoring unparsable setting");
                    None
                }
            }
        };
        let flag = |key: &str| {
            lookup(key).is_some_and(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
        };

        let defaults = ControllerConfig::default();
        let seconds = |key: &str, default: Duration| {
            parsed(key).map(Duration::from_secs).unwrap_or(default)
        };

        let controller = ControllerConfig {
            system_check_period: seconds("ADAPTIVE_MINER_CHECK_PERIOD", defaults.system_check_period)
                .max(Duration::from_secs(1)),
            cpu_usage_threshold: parsed("ADAPTIVE_MINER_CPU_THRESHOLD")
                .map(|pct| pct.clamp(1, 100) as f64)
                .unwrap_or(defaults.cpu_usage_threshold),
            cpu_usage_check_period: seconds(
                "ADAPTIVE_MINER_CPU_WINDOW",
                defaults.cpu_usage_check_period,
            )
            .max(Duration::from_secs(1)),
            double_check_period: seconds("ADAPTIVE_MINER_DOUBLE_CHECK", defaults.double_check_period),
            history_capacity: defaults.history_capacity,
        }
        .covering_history();

        let options = MinerOptions {
            extra_messages_file: lookup("ADAPTIVE_MINER_EXTRA_MESSAGES").map(PathBuf::from),
            start_mining: lookup("ADAPTIVE_MINER_ADDRESS"),
            mining_threads: parsed("ADAPTIVE_MINER_THREADS").map(|n| n.clamp(1, u32::MAX as u64) as u32),
            cpu_saving: flag("ADAPTIVE_MINER_CPU_SAVING"),
            battery_saving: flag("ADAPTIVE_MINER_BATTERY_SAVING"),
        };

        Self {
            options,
            controller,
        }
    }

    /// Parsed mining address, if one was configured.
    pub fn address(&self) -> Option<Result<MiningAddress, crate::node::AddressError>> {
        self.options.start_mining.as_deref().map(str::parse)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> MinerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MinerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert!(config.options.start_mining.is_none());
        assert!(config.options.mining_threads.is_none());
        assert!(!config.options.cpu_saving);
        assert!(!config.options.battery_saving);
        assert_eq!(config.controller, ControllerConfig::default());
    }

    #[test]
    fn test_full_environment() {
        let config = config(&[
            ("ADAPTIVE_MINER_ADDRESS", "4AdUndXHHZ6cfufTMvppY6JwXNouMBzSkbLYfpAV5Usx"),
            ("ADAPTIVE_MINER_THREADS", "4"),
            ("ADAPTIVE_MINER_CPU_SAVING", "true"),
            ("ADAPTIVE_MINER_BATTERY_SAVING", "1"),
            ("ADAPTIVE_MINER_EXTRA_MESSAGES", "/var/lib/miner/messages.txt"),
            ("ADAPTIVE_MINER_CHECK_PERIOD", "2"),
            ("ADAPTIVE_MINER_CPU_THRESHOLD", "40"),
            ("ADAPTIVE_MINER_CPU_WINDOW", "30"),
            ("ADAPTIVE_MINER_DOUBLE_CHECK", "4"),
        ]);

        assert!(config.address().unwrap().is_ok());
        assert_eq!(config.options.mining_threads, Some(4));
        assert!(config.options.cpu_saving);
        assert!(config.options.battery_saving);
        assert_eq!(
            config.options.extra_messages_file,
            Some(PathBuf::from("/var/lib/miner/messages.txt"))
        );
        assert_eq!(config.controller.system_check_period, Duration::from_secs(2));
        assert_eq!(config.controller.cpu_usage_threshold, 40.0);
        assert_eq!(config.controller.cpu_usage_check_period, Duration::from_secs(30));
        assert_eq!(config.controller.double_check_period, Duration::from_secs(4));
    }

    #[test_case("0", 1.0; "clamped up")]
    #[test_case("150", 100.0; "clamped down")]
    #[test_case("abc", 25.0; "unparsable keeps default")]
    fn test_cpu_threshold(raw: &str, expected: f64) {
        let config = config(&[("ADAPTIVE_MINER_CPU_THRESHOLD", raw)]);
        assert_eq!(config.controller.cpu_usage_threshold, expected);
    }

    #[test]
    fn test_zero_threads_clamped() {
        let config = config(&[("ADAPTIVE_MINER_THREADS", "0")]);
        assert_eq!(config.options.mining_threads, Some(1));
    }

    #[test]
    fn test_history_covers_long_window() {
        let config = config(&[("ADAPTIVE_MINER_CPU_WINDOW", "120")]);
        assert_eq!(config.controller.history_capacity, 120);
    }
}
