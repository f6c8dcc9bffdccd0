//! Race configuration: name, distance, start time, checkpoints and route
//!
//! Defaults describe Ultravasan 90 (Sälen → Mora).

use crate::race::Checkpoint;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Start gun, 2026-08-15 05:00 CEST
const DEFAULT_START: &str = "2026-08-15T05:00:00+02:00";

/// Static race description
#[derive(Debug, Clone, PartialEq)]
pub struct RaceConfig {
    pub name: String,
    /// Official race distance in kilometers
    pub distance_km: f64,
    pub start: DateTime<Utc>,
    /// Ordered along the route
    pub checkpoints: Vec<Checkpoint>,
    /// Route polyline as `[lat, lng]` pairs, used by replay
    pub route: Vec<[f64; 2]>,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            name: "Ultravasan 90".to_string(),
            distance_km: 92.0,
            start: default_start(),
            checkpoints: default_checkpoints(),
            route: default_route(),
        }
    }
}

fn default_start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(DEFAULT_START)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

pub(crate) fn default_checkpoints() -> Vec<Checkpoint> {
    vec![
        Checkpoint::new("Start - Sälen", 0.0, 61.1575, 13.2633),
        Checkpoint::new("Smågån", 11.0, 61.1380, 13.4200),
        Checkpoint::new("Mångsbodarna", 24.0, 61.1100, 13.5800),
        Checkpoint::new("Risberg", 35.0, 61.0900, 13.7200),
        Checkpoint::new("Evertsberg", 47.0, 61.0600, 13.8600),
        Checkpoint::new("Oxberg", 56.0, 61.0400, 14.0000),
        Checkpoint::new("Hökberg", 62.0, 61.0300, 14.1200),
        Checkpoint::new("Eldris", 71.0, 61.0150, 14.2800),
        Checkpoint::new("Finish - Mora", 92.0, 61.0060, 14.5430),
    ]
}

pub(crate) fn default_route() -> Vec<[f64; 2]> {
    vec![
        [61.1575, 13.2633], [61.1520, 13.3000], [61.1480, 13.3400],
        [61.1380, 13.4200], [61.1300, 13.4800], [61.1200, 13.5300],
        [61.1100, 13.5800], [61.1000, 13.6500], [61.0900, 13.7200],
        [61.0800, 13.7900], [61.0700, 13.8200], [61.0600, 13.8600],
        [61.0500, 13.9300], [61.0400, 14.0000], [61.0350, 14.0600],
        [61.0300, 14.1200], [61.0250, 14.1800], [61.0200, 14.2300],
        [61.0150, 14.2800], [61.0120, 14.3500], [61.0100, 14.4200],
        [61.0080, 14.4800], [61.0060, 14.5430],
    ]
}

/// Race settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileRace {
    pub name: Option<String>,
    pub distance_km: Option<f64>,
    /// RFC 3339, e.g. "2026-08-15T05:00:00+02:00"
    pub start: Option<String>,
    pub checkpoints: Option<Vec<Checkpoint>>,
    pub route: Option<Vec<[f64; 2]>>,
}

impl RaceConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileRace>) -> Result<Self> {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        let start = match file.start {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&Utc))
                .with_context(|| format!("[race] start is not RFC 3339: {:?}", raw))?,
            None => defaults.start,
        };

        Ok(Self {
            name: file.name.unwrap_or(defaults.name),
            distance_km: file.distance_km.unwrap_or(defaults.distance_km),
            start,
            checkpoints: file.checkpoints.unwrap_or(defaults.checkpoints),
            route: file.route.unwrap_or(defaults.route),
        })
    }
}
