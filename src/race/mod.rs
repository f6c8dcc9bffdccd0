// Race domain types shared by the server and the tracking client
//
// A fix is one timestamped GPS reading from the runner's tracking device.
// Fixes flow: ping endpoint -> position store -> broadcast stream -> viewer.
// The stream carries `StreamEvent`s, tagged by "type" so both ends can
// pattern match on the same enum.

pub mod geo;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A persisted GPS fix
///
/// Serialized as `{id, timestamp, lat, lng, accuracyM, speedMps}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fix {
    /// Store-assigned id, strictly increasing in insertion order
    pub id: i64,
    /// Device time of the reading (not receipt time)
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lng: f64,
    /// Estimated horizontal error in meters
    pub accuracy_m: Option<f64>,
    /// Instantaneous speed in meters per second
    pub speed_mps: Option<f64>,
}

/// A fix that has not been stored yet (no id)
#[derive(Debug, Clone, PartialEq)]
pub struct NewFix {
    pub timestamp: DateTime<Utc>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub speed_mps: Option<f64>,
}

impl NewFix {
    /// Fix at the given position with no optional readings
    #[cfg(test)]
    pub fn at(timestamp: DateTime<Utc>, lat: f64, lng: f64) -> Self {
        Self {
            timestamp,
            lat: Some(lat),
            lng: Some(lng),
            accuracy_m: None,
            speed_mps: None,
        }
    }

    /// Check the fix can be persisted, returning its coordinates
    pub fn coordinates(&self) -> Result<(f64, f64), FixError> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Ok((lat, lng)),
            (Some(_), Some(_)) => Err(FixError::NonFiniteCoordinate),
            _ => Err(FixError::MissingCoordinates),
        }
    }
}

/// Validation failures for incoming fixes
#[derive(Debug, Clone, PartialEq)]
pub enum FixError {
    /// lat or lng absent or not parseable as a number
    MissingCoordinates,
    /// lat or lng parsed but is NaN or infinite
    NonFiniteCoordinate,
    /// timestamp present but not ISO-8601
    InvalidTimestamp(String),
}

impl std::fmt::Display for FixError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixError::MissingCoordinates => write!(f, "lat and lng required"),
            FixError::NonFiniteCoordinate => write!(f, "lat and lng must be finite numbers"),
            FixError::InvalidTimestamp(raw) => write!(f, "invalid timestamp: {}", raw),
        }
    }
}

impl std::error::Error for FixError {}

/// Events pushed to viewers on the broadcast stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Initial snapshot sent when a viewer connects
    Init { points: Vec<Fix> },
    /// New fixes since the viewer's cursor
    Points { points: Vec<Fix> },
    /// Nothing new this tick
    Heartbeat { time: DateTime<Utc> },
    /// A store read failed; the stream stays open
    Error { message: String },
}

impl StreamEvent {
    /// Event name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Init { .. } => "init",
            StreamEvent::Points { .. } => "points",
            StreamEvent::Heartbeat { .. } => "heartbeat",
            StreamEvent::Error { .. } => "error",
        }
    }
}

/// A fixed named point along the route with a known distance marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub name: String,
    pub km: f64,
    pub lat: f64,
    pub lng: f64,
}

impl Checkpoint {
    pub fn new(name: impl Into<String>, km: f64, lat: f64, lng: f64) -> Self {
        Self {
            name: name.into(),
            km,
            lat,
            lng,
        }
    }
}

/// Where the race is relative to its start time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RacePhase {
    InTraining,
    RaceDay,
    Finished,
}

impl RacePhase {
    /// Race day lasts 24 hours from the start gun
    pub fn at(start: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now < start {
            RacePhase::InTraining
        } else if now <= start + Duration::hours(24) {
            RacePhase::RaceDay
        } else {
            RacePhase::Finished
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_fix() -> Fix {
        Fix {
            id: 7,
            timestamp: Utc.with_ymd_and_hms(2026, 8, 15, 6, 0, 0).unwrap(),
            lat: 61.0,
            lng: 14.0,
            accuracy_m: None,
            speed_mps: Some(3.0),
        }
    }

    #[test]
    fn test_fix_serializes_camel_case_with_nulls() {
        let json = serde_json::to_value(sample_fix()).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["lat"], 61.0);
        assert_eq!(json["speedMps"], 3.0);
        assert!(json["accuracyM"].is_null());
        assert!(json["timestamp"]
            .as_str()
            .unwrap()
            .starts_with("2026-08-15T06:00:00"));
    }

    #[test]
    fn test_stream_event_tagged_by_type() {
        let event = StreamEvent::Points {
            points: vec![sample_fix()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "points");
        assert_eq!(json["points"][0]["id"], 7);

        let error = serde_json::to_value(StreamEvent::Error {
            message: "Poll failed".to_string(),
        })
        .unwrap();
        assert_eq!(error["type"], "error");
        assert_eq!(error["message"], "Poll failed");
    }

    #[test]
    fn test_stream_event_parses_heartbeat() {
        let raw = r#"{"type":"heartbeat","time":"2026-08-15T06:00:05.000Z"}"#;
        let event: StreamEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(event, StreamEvent::Heartbeat { .. }));
        assert_eq!(event.kind(), "heartbeat");
    }

    #[test]
    fn test_new_fix_requires_both_coordinates() {
        let now = Utc::now();
        let mut fix = NewFix::at(now, 61.0, 14.0);
        assert_eq!(fix.coordinates(), Ok((61.0, 14.0)));

        fix.lng = None;
        assert_eq!(fix.coordinates(), Err(FixError::MissingCoordinates));

        fix.lng = Some(f64::NAN);
        assert_eq!(fix.coordinates(), Err(FixError::NonFiniteCoordinate));
    }

    #[test]
    fn test_race_phase_boundaries() {
        let start = Utc.with_ymd_and_hms(2026, 8, 15, 3, 0, 0).unwrap();
        assert_eq!(
            RacePhase::at(start, start - Duration::minutes(1)),
            RacePhase::InTraining
        );
        assert_eq!(RacePhase::at(start, start), RacePhase::RaceDay);
        assert_eq!(
            RacePhase::at(start, start + Duration::hours(24)),
            RacePhase::RaceDay
        );
        assert_eq!(
            RacePhase::at(start, start + Duration::hours(25)),
            RacePhase::Finished
        );
    }
}
