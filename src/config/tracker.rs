//! Viewer-side configuration for `watch` and `replay`

use serde::Deserialize;
use std::time::Duration;

/// Tracking client settings
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Broadcast stream URL the live watcher connects to
    pub stream_url: String,
    /// Fixed wait before reconnecting a dropped stream
    pub reconnect_secs: u64,
    /// Replay cadence: one fix per interval
    pub replay_interval_ms: u64,
    /// Simulated runner speed for replay timestamps
    pub replay_speed_mps: f64,
    /// Fixes averaged for the smoothed position
    pub smoothing_window: usize,
    /// Cap on buffered fixes (None = unbounded)
    pub buffer_limit: Option<usize>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            stream_url: "http://127.0.0.1:3000/api/race/stream".to_string(),
            reconnect_secs: 3,
            replay_interval_ms: 2000,
            replay_speed_mps: 3.0,
            smoothing_window: 3,
            buffer_limit: None,
        }
    }
}

impl TrackerConfig {
    pub fn reconnect_delay(&self) -> Duration {
        // Never hammer a server that is down
        Duration::from_secs(self.reconnect_secs.max(1))
    }

    pub fn replay_interval(&self) -> Duration {
        Duration::from_millis(self.replay_interval_ms.max(1))
    }
}

/// Tracker settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileTracker {
    pub stream_url: Option<String>,
    pub reconnect_secs: Option<u64>,
    pub replay_interval_ms: Option<u64>,
    pub replay_speed_mps: Option<f64>,
    pub smoothing_window: Option<usize>,
    pub buffer_limit: Option<usize>,
}

impl TrackerConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileTracker>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            stream_url: file.stream_url.unwrap_or(defaults.stream_url),
            reconnect_secs: file.reconnect_secs.unwrap_or(defaults.reconnect_secs),
            replay_interval_ms: file
                .replay_interval_ms
                .unwrap_or(defaults.replay_interval_ms),
            replay_speed_mps: file.replay_speed_mps.unwrap_or(defaults.replay_speed_mps),
            smoothing_window: file
                .smoothing_window
                .unwrap_or(defaults.smoothing_window)
                .max(1),
            // 0 in the file means "no cap"
            buffer_limit: file.buffer_limit.filter(|&n| n > 0).or(defaults.buffer_limit),
        }
    }
}
