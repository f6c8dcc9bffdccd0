// Ping endpoint - ingests one GPS fix from the tracking device
//
// POST /api/race/ping
//   Authorization: Bearer <RACE_PING_SECRET>
//   {"timestamp"?: ISO-8601, "lat": n|"n", "lng": n|"n", "accuracy_m"?: n|"n", "speed_mps"?: n|"n"}
//
// The endpoint does not deduplicate: a retried fix becomes a second row and
// viewers drop it by id at display time.

use super::{error::ApiError, AppState};
use crate::race::{FixError, NewFix};
use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

/// Response for a stored fix
#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub ok: bool,
    pub id: i64,
}

/// Read a JSON number or numeric string; anything else is `None`
fn coerce_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

/// Optional reading: absent or null is fine, garbage is dropped with a warning
fn optional_reading(body: &Value, field: &str) -> Option<f64> {
    let raw = body.get(field).filter(|v| !v.is_null());
    let parsed = coerce_number(raw);
    if let (Some(raw), None) = (raw, parsed) {
        tracing::warn!("Ignoring unparseable {} in race ping: {}", field, raw);
    }
    parsed
}

/// ISO-8601 timestamp; forms without an offset are read as UTC
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Build a fix from the request body, defaulting the timestamp to `received_at`
pub fn parse_ping(body: &Value, received_at: DateTime<Utc>) -> Result<NewFix, FixError> {
    let lat = coerce_number(body.get("lat")).ok_or(FixError::MissingCoordinates)?;
    let lng = coerce_number(body.get("lng")).ok_or(FixError::MissingCoordinates)?;

    let timestamp = match body.get("timestamp") {
        None | Some(Value::Null) => received_at,
        Some(Value::String(raw)) => {
            parse_timestamp(raw).ok_or_else(|| FixError::InvalidTimestamp(raw.clone()))?
        }
        Some(other) => return Err(FixError::InvalidTimestamp(other.to_string())),
    };

    Ok(NewFix {
        timestamp,
        lat: Some(lat),
        lng: Some(lng),
        accuracy_m: optional_reading(body, "accuracy_m"),
        speed_mps: optional_reading(body, "speed_mps"),
    })
}

/// POST /api/race/ping - Store a single GPS fix
pub async fn race_ping(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PingResponse>, ApiError> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if !state.is_authorized(auth) {
        return Err(ApiError::Unauthorized);
    }

    let received_at = Utc::now();
    let body: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?;
    let fix = parse_ping(&body, received_at).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let id = state.store.append(&fix).map_err(|e| {
        tracing::error!("Race ping store error: {:#}", e);
        ApiError::Internal("Failed to save point".to_string())
    })?;

    tracing::info!("Race point saved: {} ({:?}, {:?})", id, fix.lat, fix.lng);
    Ok(Json(PingResponse { ok: true, id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::race::Fix;
    use crate::storage::{PositionStore, SqliteStore};
    use axum::{
        http::{HeaderValue, StatusCode},
        response::IntoResponse,
    };
    use serde_json::json;
    use std::sync::Arc;

    const SECRET: &str = "race-secret";

    fn test_state() -> (AppState, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let config = Config {
            ping_secret: Some(SECRET.to_string()),
            ..Config::default()
        };
        (AppState::new(&config, store.clone()), store)
    }

    fn auth_headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    async fn ping(state: &AppState, headers: HeaderMap, body: Value) -> (StatusCode, Value) {
        let response = race_ping(State(state.clone()), headers, Bytes::from(body.to_string()))
            .await
            .into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    /// Store whose writes always fail
    struct BrokenStore;

    impl PositionStore for BrokenStore {
        fn append(&self, _: &NewFix) -> anyhow::Result<i64> {
            anyhow::bail!("disk full")
        }
        fn query_after(&self, _: i64, _: DateTime<Utc>, _: usize) -> anyhow::Result<Vec<Fix>> {
            Ok(Vec::new())
        }
        fn latest_before(&self, _: DateTime<Utc>) -> anyhow::Result<Option<Fix>> {
            Ok(None)
        }
        fn count(&self) -> anyhow::Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn test_parse_ping_accepts_numeric_strings() {
        let now = Utc::now();
        let fix = parse_ping(
            &json!({"lat": "61.5", "lng": 14, "accuracy_m": "4", "speed_mps": 3.2}),
            now,
        )
        .unwrap();
        assert_eq!(fix.lat, Some(61.5));
        assert_eq!(fix.lng, Some(14.0));
        assert_eq!(fix.accuracy_m, Some(4.0));
        assert_eq!(fix.speed_mps, Some(3.2));
        assert_eq!(fix.timestamp, now);
    }

    #[test]
    fn test_parse_ping_uses_supplied_timestamp() {
        let fix = parse_ping(
            &json!({"lat": 1, "lng": 2, "timestamp": "2026-08-15T07:30:00+02:00"}),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(
            fix.timestamp,
            Utc.with_ymd_and_hms(2026, 8, 15, 5, 30, 0).unwrap()
        );

        // No offset means UTC
        let six = Utc.with_ymd_and_hms(2026, 8, 15, 6, 0, 0).unwrap();
        for raw in ["2026-08-15T06:00:00", "2026-08-15T06:00:00.000"] {
            let fix = parse_ping(&json!({"lat": 61, "lng": 14, "timestamp": raw}), Utc::now())
                .unwrap();
            assert_eq!(fix.timestamp, six, "timestamp: {}", raw);
        }

        let fix = parse_ping(
            &json!({"lat": 61, "lng": 14, "timestamp": "2026-08-15T06:00:00.250"}),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(fix.timestamp, six + chrono::Duration::milliseconds(250));

        let fix = parse_ping(
            &json!({"lat": 61, "lng": 14, "timestamp": "2026-08-15"}),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(
            fix.timestamp,
            Utc.with_ymd_and_hms(2026, 8, 15, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_ping_rejects_missing_or_garbage_coordinates() {
        let now = Utc::now();
        for body in [
            json!({"lng": 14.0}),
            json!({"lat": 61.0}),
            json!({"lat": "north", "lng": 14.0}),
            json!({"lat": null, "lng": 14.0}),
            json!({"lat": "NaN", "lng": 14.0}),
        ] {
            assert_eq!(
                parse_ping(&body, now),
                Err(FixError::MissingCoordinates),
                "body: {}",
                body
            );
        }
    }

    #[test]
    fn test_parse_ping_accepts_zero_coordinates() {
        let fix = parse_ping(&json!({"lat": 0, "lng": 0}), Utc::now()).unwrap();
        assert_eq!(fix.coordinates(), Ok((0.0, 0.0)));
    }

    #[test]
    fn test_parse_ping_drops_garbage_optionals() {
        let fix = parse_ping(
            &json!({"lat": 1, "lng": 2, "speed_mps": "fast", "accuracy_m": null}),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(fix.speed_mps, None);
        assert_eq!(fix.accuracy_m, None);
    }

    #[test]
    fn test_parse_ping_rejects_bad_timestamp() {
        for raw in ["yesterday", "2026-13-01", "2026-08-15T25:00:00"] {
            let result = parse_ping(&json!({"lat": 1, "lng": 2, "timestamp": raw}), Utc::now());
            assert!(
                matches!(result, Err(FixError::InvalidTimestamp(_))),
                "timestamp: {}",
                raw
            );
        }
    }

    #[tokio::test]
    async fn test_ping_without_token_is_unauthorized() {
        let (state, store) = test_state();
        let (status, body) = ping(
            &state,
            HeaderMap::new(),
            json!({"lat": 61.0, "lng": 14.0, "speed_mps": 3.0}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"error": "Unauthorized"}));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ping_with_token_stores_fix() {
        let (state, store) = test_state();
        let (status, body) = ping(
            &state,
            auth_headers(&format!("Bearer {}", SECRET)),
            json!({"lat": 61.0, "lng": 14.0, "speed_mps": 3.0}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        let id = body["id"].as_i64().unwrap();

        let rows = store.query_after(0, DateTime::<Utc>::MAX_UTC, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].speed_mps, Some(3.0));
    }

    #[tokio::test]
    async fn test_ping_missing_lat_is_bad_request_and_not_stored() {
        let (state, store) = test_state();
        let (status, body) = ping(
            &state,
            auth_headers(&format!("Bearer {}", SECRET)),
            json!({"lng": 14.0}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "lat and lng required"}));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ping_store_failure_is_internal_error() {
        let config = Config {
            ping_secret: Some(SECRET.to_string()),
            ..Config::default()
        };
        let state = AppState::new(&config, Arc::new(BrokenStore));
        let (status, body) = ping(
            &state,
            auth_headers(&format!("Bearer {}", SECRET)),
            json!({"lat": 61.0, "lng": 14.0}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Failed to save point"}));
    }

    #[tokio::test]
    async fn test_duplicate_pings_create_duplicate_rows() {
        let (state, store) = test_state();
        let body = json!({"lat": 61.0, "lng": 14.0, "timestamp": "2026-08-15T06:00:00Z"});
        let headers = auth_headers(&format!("Bearer {}", SECRET));
        let (_, first) = ping(&state, headers.clone(), body.clone()).await;
        let (_, second) = ping(&state, headers, body).await;
        assert_ne!(first["id"], second["id"]);
        assert_eq!(store.count().unwrap(), 2);
    }
}
