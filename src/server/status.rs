// Status endpoints - race phase and configuration for dashboards
//
// Status respects the broadcast delay: the latest fix reported is the newest
// one under the horizon, never something viewers have not seen yet.

use super::{error::ApiError, AppState};
use crate::race::{Checkpoint, Fix, RacePhase};
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// JSON structure returned by /api/race/status
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceStatusResponse {
    pub name: String,
    pub phase: RacePhase,
    pub start: DateTime<Utc>,
    pub delay_minutes: u32,
    /// Every stored fix, including ones still held back by the delay
    pub total_points: u64,
    /// Newest fix visible under the delay horizon
    pub latest: Option<Fix>,
    /// Seconds between the latest visible fix and now
    pub seconds_since_latest: Option<i64>,
}

/// JSON structure returned by /api/race/checkpoints
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceInfoResponse {
    pub name: String,
    pub distance_km: f64,
    pub start: DateTime<Utc>,
    pub checkpoints: Vec<Checkpoint>,
    pub route: Vec<[f64; 2]>,
}

/// Build the status snapshot at `now`
pub fn status_at(state: &AppState, now: DateTime<Utc>) -> anyhow::Result<RaceStatusResponse> {
    let horizon = now - state.broadcast.delay();
    let latest = state.store.latest_before(horizon)?;
    let total_points = state.store.count()?;

    Ok(RaceStatusResponse {
        name: state.race.name.clone(),
        phase: RacePhase::at(state.race.start, now),
        start: state.race.start,
        delay_minutes: state.broadcast.delay_minutes,
        total_points,
        seconds_since_latest: latest
            .as_ref()
            .map(|fix| (now - fix.timestamp).num_seconds()),
        latest,
    })
}

/// GET /api/race/status - Delayed snapshot of the race
pub async fn race_status(
    State(state): State<AppState>,
) -> Result<Json<RaceStatusResponse>, ApiError> {
    status_at(&state, Utc::now()).map(Json).map_err(|e| {
        tracing::error!("Race status error: {:#}", e);
        ApiError::Internal("Failed to load status".to_string())
    })
}

/// GET /api/race/checkpoints - Race description, checkpoints and route
pub async fn race_checkpoints(State(state): State<AppState>) -> Json<RaceInfoResponse> {
    let race = &state.race;
    Json(RaceInfoResponse {
        name: race.name.clone(),
        distance_km: race.distance_km,
        start: race.start,
        checkpoints: race.checkpoints.clone(),
        route: race.route.clone(),
    })
}
