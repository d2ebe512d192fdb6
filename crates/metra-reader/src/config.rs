//! Reader configuration.
//!
//! All durations are plain milliseconds so the structs load from any serde
//! format without custom adapters. Missing fields take their defaults.
//!
//! ```
//! use metra_reader::ReaderConfig;
//!
//! let config: ReaderConfig = serde_json::from_str(r#"{
//!     "device_id": "gate-2",
//!     "keep_time_ms": 500,
//!     "identity": "id_and_antenna"
//! }"#).unwrap();
//!
//! assert_eq!(config.device_id.as_str(), "gate-2");
//! assert_eq!(config.command_timeout_ms, 2000);
//! ```

use metra_core::constants::{
    DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_DEBOUNCE_INTERVAL_MS, DEFAULT_DEBOUNCE_STABLE_MS,
    DEFAULT_EVENT_QUEUE_CAPACITY, DEFAULT_KEEP_TIME_MS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_SWEEP_INTERVAL_MS,
};
use metra_core::{DeviceId, Error, Result, TagIdentity};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backoff::BackoffConfig;

/// Input pin debouncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    pub enabled: bool,
    /// Sampling period.
    pub interval_ms: u64,
    /// How long a level must hold before it is reported.
    pub stable_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: DEFAULT_DEBOUNCE_INTERVAL_MS,
            stable_ms: DEFAULT_DEBOUNCE_STABLE_MS,
        }
    }
}

/// Device preparation options applied after every connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepareConfig {
    /// Heartbeat interval requested from the device, in seconds; 0 disables it.
    pub heartbeat_secs: u32,
    /// Switch ASCII readers to end-of-frame mode.
    pub end_of_frame: bool,
    /// Enable CRC16 checksums on the ASCII protocol.
    pub checksum: bool,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 0,
            end_of_frame: true,
            checksum: false,
        }
    }
}

/// Configuration of one reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub device_id: DeviceId,
    /// Time a command may wait for its complete reply.
    pub command_timeout_ms: u64,
    /// Receive timeout per transport poll.
    pub poll_interval_ms: u64,
    pub backoff: BackoffConfig,
    /// How long a tag stays present after its last sighting.
    pub keep_time_ms: u64,
    /// Period of the stale-tag sweep during continuous scans.
    pub sweep_interval_ms: u64,
    pub identity: TagIdentity,
    pub debounce: DebounceConfig,
    pub prepare: PrepareConfig,
    /// Capacity of the event queue; the oldest event is dropped when full.
    pub event_capacity: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            device_id: DeviceId::default(),
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            backoff: BackoffConfig::default(),
            keep_time_ms: DEFAULT_KEEP_TIME_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            identity: TagIdentity::default(),
            debounce: DebounceConfig::default(),
            prepare: PrepareConfig::default(),
            event_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
        }
    }
}

impl ReaderConfig {
    /// Defaults for the given device id.
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            ..Self::default()
        }
    }

    /// Reject values the worker cannot run with.
    ///
    /// # Errors
    /// Returns `Error::Config` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("command_timeout_ms", self.command_timeout_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("sweep_interval_ms", self.sweep_interval_ms),
            ("backoff.min_wait_ms", self.backoff.min_wait_ms),
            ("debounce.interval_ms", self.debounce.interval_ms),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(Error::Config(format!("{name} must be greater than zero")));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be greater than zero".to_string()));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn keep_time(&self) -> Duration {
        Duration::from_millis(self.keep_time_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ReaderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.event_capacity, 1024);
        assert_eq!(config.identity, TagIdentity::Id);
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config = ReaderConfig {
            poll_interval_ms: 0,
            ..ReaderConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
    }

    #[test]
    fn test_nested_defaults_from_json() {
        let config: ReaderConfig =
            serde_json::from_str(r#"{"backoff":{"max_wait_ms":5000},"prepare":{"heartbeat_secs":2}}"#)
                .unwrap();
        assert_eq!(config.backoff.min_wait_ms, 1000);
        assert_eq!(config.backoff.max_wait_ms, 5000);
        assert_eq!(config.prepare.heartbeat_secs, 2);
        assert!(config.prepare.end_of_frame);
    }
}
