//! Configuration for the race tracker
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/racetrack/config.toml)
//! 3. Built-in defaults (lowest priority)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod broadcast;
mod observability;
mod race;
mod serialization;
mod tracker;

#[cfg(test)]
mod tests;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports
// ─────────────────────────────────────────────────────────────────────────────

pub use broadcast::{BroadcastConfig, FileBroadcast};
pub use observability::{FileLogging, LogRotation, LoggingConfig};
pub use race::{FileRace, RaceConfig};
pub use tracker::{FileTracker, TrackerConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_BIND: &str = "127.0.0.1:3000";
const DEFAULT_DB_PATH: &str = "./data/race.db";

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,

    /// Path to the SQLite position store
    pub db_path: PathBuf,

    /// Shared secret for the ping endpoint (env only, never written to disk)
    pub ping_secret: Option<String>,

    /// Broadcast stream settings (delay, poll cadence, batch sizes)
    pub broadcast: BroadcastConfig,

    /// Race, checkpoints and route
    pub race: RaceConfig,

    /// Viewer-side settings for `watch` and `replay`
    pub tracker: TrackerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            ping_secret: None,
            broadcast: BroadcastConfig::default(),
            race: RaceConfig::default(),
            tracker: TrackerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure (subset of Config that makes sense to persist)
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub bind_addr: Option<String>,
    pub db_path: Option<String>,

    /// Optional [broadcast] section
    pub broadcast: Option<FileBroadcast>,

    /// Optional [race] section
    pub race: Option<FileRace>,

    /// Optional [tracker] section
    pub tracker: Option<FileTracker>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/racetrack/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("racetrack").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        if path.exists() {
            return;
        }

        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // Config is optional
            }
        }

        let _ = std::fs::write(&path, Self::default().to_toml());
    }

    /// Overwrite the config file with defaults
    pub fn reset_config_file() -> Result<PathBuf> {
        let path = Self::config_path().context("Could not determine config path")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, Self::default().to_toml())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Load file config if it exists
    ///
    /// A missing file means defaults. A file that exists but cannot be read
    /// or parsed is an error: silently falling back would hide the typo.
    fn load_file_config() -> Result<FileConfig> {
        let Some(path) = Self::config_path() else {
            return Ok(FileConfig::default());
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(e) => Err(e).with_context(|| format!("Cannot read config file {}", path.display())),
        }
    }

    /// Load configuration: file -> env vars -> defaults
    pub fn from_env() -> Result<Self> {
        let file = Self::load_file_config()?;
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Merge a parsed file with an environment lookup
    pub(crate) fn from_sources(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        // Bind address: env > file > default
        let bind_raw = env("RACETRACK_BIND")
            .or(file.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind_raw
            .parse()
            .with_context(|| format!("Invalid bind address: {}", bind_raw))?;

        // Database path: env > file > default
        let db_path = env("RACETRACK_DB")
            .or(file.db_path)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        // Ping secret: env only
        let ping_secret = env("RACE_PING_SECRET").filter(|s| !s.is_empty());

        // Delay: env > file > default
        let mut broadcast = BroadcastConfig::from_file(file.broadcast);
        if let Some(raw) = env("RACE_DELAY_MINUTES") {
            broadcast.delay_minutes = raw
                .trim()
                .parse()
                .with_context(|| format!("RACE_DELAY_MINUTES must be a non-negative integer, got {:?}", raw))?;
        }

        let race = RaceConfig::from_file(file.race)?;

        let mut tracker = TrackerConfig::from_file(file.tracker);
        if let Some(url) = env("RACETRACK_STREAM_URL") {
            tracker.stream_url = url;
        }

        let logging = LoggingConfig::from_file(file.logging);

        Ok(Self {
            bind_addr,
            db_path,
            ping_secret,
            broadcast,
            race,
            tracker,
            logging,
        })
    }
}
