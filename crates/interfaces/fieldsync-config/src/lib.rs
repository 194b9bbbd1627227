//! Central configuration constants for runtime limits and defaults.

use std::time::Duration;

mod settings;

pub use settings::{Settings, SettingsStore, SETTING_KEYS};

/// Default upper bound for a single remote write, in seconds.
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;

/// Shortest and longest accepted write timeout.
pub const MIN_WRITE_TIMEOUT_SECS: u64 = 1;
pub const MAX_WRITE_TIMEOUT_SECS: u64 = 120;

/// Default interval between connectivity probes, in seconds.
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 15;

pub const MIN_PROBE_INTERVAL_SECS: u64 = 1;
pub const MAX_PROBE_INTERVAL_SECS: u64 = 3600;

/// Environment variable prefix for CLI overrides.
pub const ENV_PREFIX: &str = "FIELDSYNC_";

pub fn clamp_write_timeout(secs: u64) -> Duration {
    Duration::from_secs(secs.clamp(MIN_WRITE_TIMEOUT_SECS, MAX_WRITE_TIMEOUT_SECS))
}

pub fn clamp_probe_interval(secs: u64) -> Duration {
    Duration::from_secs(secs.clamp(MIN_PROBE_INTERVAL_SECS, MAX_PROBE_INTERVAL_SECS))
}
