//! Broadcast stream configuration

use serde::Deserialize;
use std::time::Duration;

/// Settings for the per-viewer broadcast loop
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastConfig {
    /// Tape delay in minutes; viewers see positions from `now - delay` (0 = live)
    pub delay_minutes: u32,
    /// Seconds between store polls per viewer
    pub poll_interval_secs: u64,
    /// Fixes in the initial snapshot
    pub init_batch: usize,
    /// Fixes per incremental poll
    pub poll_batch: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            delay_minutes: 0,
            poll_interval_secs: 5,
            init_batch: 100,
            poll_batch: 50,
        }
    }
}

impl BroadcastConfig {
    pub fn poll_interval(&self) -> Duration {
        // A zero interval would make tokio's interval panic
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn delay(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.delay_minutes))
    }
}

/// Broadcast settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileBroadcast {
    pub delay_minutes: Option<u32>,
    pub poll_interval_secs: Option<u64>,
    pub init_batch: Option<usize>,
    pub poll_batch: Option<usize>,
}

impl BroadcastConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileBroadcast>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            delay_minutes: file.delay_minutes.unwrap_or(defaults.delay_minutes),
            poll_interval_secs: file
                .poll_interval_secs
                .unwrap_or(defaults.poll_interval_secs),
            // A zero batch would never deliver a fix
            init_batch: file.init_batch.unwrap_or(defaults.init_batch).max(1),
            poll_batch: file.poll_batch.unwrap_or(defaults.poll_batch).max(1),
        }
    }
}
