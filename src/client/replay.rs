//! Replay source - synthesizes a run along the route for demos
//!
//! Fixes are laid along the route polyline roughly every `step_km`, with
//! timestamps advancing by distance / speed from the race start. They are
//! drip-fed into the session one per interval as `points` events, so replay
//! exercises exactly the same merge and progress code as the live stream.

use super::{project_arrival, SessionState, TrackingSession};
use crate::race::{geo, Fix, StreamEvent};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

/// Distance between synthesized fixes
const DEFAULT_STEP_KM: f64 = 1.0;

/// Nominal GPS accuracy reported on synthesized fixes
const REPLAY_ACCURACY_M: f64 = 5.0;

/// Pre-recorded fix sequence played back in order
#[derive(Debug, Clone)]
pub struct ReplayFeed {
    fixes: Vec<Fix>,
    position: usize,
}

impl ReplayFeed {
    /// Build a feed from an explicit fix sequence
    pub fn new(fixes: Vec<Fix>) -> Self {
        Self { fixes, position: 0 }
    }

    /// Synthesize fixes along `route` starting at `start`
    pub fn from_route(route: &[[f64; 2]], start: DateTime<Utc>, speed_mps: f64) -> Result<Self> {
        Self::from_route_with_step(route, start, speed_mps, DEFAULT_STEP_KM)
    }

    pub fn from_route_with_step(
        route: &[[f64; 2]],
        start: DateTime<Utc>,
        speed_mps: f64,
        step_km: f64,
    ) -> Result<Self> {
        if !speed_mps.is_finite() || speed_mps <= 0.0 {
            bail!("Replay speed must be positive, got {}", speed_mps);
        }
        if !step_km.is_finite() || step_km <= 0.0 {
            bail!("Replay step must be positive, got {}", step_km);
        }
        let Some(first) = route.first() else {
            bail!("Replay needs a route with at least one point");
        };

        let mut fixes = Vec::new();
        let mut travelled_km = 0.0;
        let mut push = |lat: f64, lng: f64, km: f64| -> Result<()> {
            let Some(timestamp) = project_arrival(start, km, speed_mps) else {
                bail!("Replay at {} m/s runs past the representable time range", speed_mps);
            };
            fixes.push(Fix {
                id: fixes.len() as i64 + 1,
                timestamp,
                lat,
                lng,
                accuracy_m: Some(REPLAY_ACCURACY_M),
                speed_mps: Some(speed_mps),
            });
            Ok(())
        };

        push(first[0], first[1], 0.0)?;
        for segment in route.windows(2) {
            let [lat1, lng1] = segment[0];
            let [lat2, lng2] = segment[1];
            let segment_km = geo::haversine_km(lat1, lng1, lat2, lng2);
            let steps = (segment_km / step_km).ceil().max(1.0) as usize;

            for i in 1..=steps {
                let f = i as f64 / steps as f64;
                push(
                    lat1 + (lat2 - lat1) * f,
                    lng1 + (lng2 - lng1) * f,
                    travelled_km + segment_km * f,
                )?;
            }
            travelled_km += segment_km;
        }

        Ok(Self::new(fixes))
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    pub fn fixes(&self) -> &[Fix] {
        &self.fixes
    }

    /// Next fix wrapped as a `points` event, `None` once exhausted
    pub fn next_event(&mut self) -> Option<StreamEvent> {
        let fix = self.fixes.get(self.position)?.clone();
        self.position += 1;
        Some(StreamEvent::Points { points: vec![fix] })
    }
}

/// Drip-feed the replay into the session, one fix per `interval`
///
/// Progress is reported against the replayed fix's own timestamp so
/// staleness reads as it would have during the run. Shutdown closes the
/// session; a finished replay leaves it open so the caller can switch to
/// live tracking.
pub async fn run_replay(
    mut feed: ReplayFeed,
    session: &mut TrackingSession,
    interval: std::time::Duration,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> Result<()> {
    if feed.is_empty() {
        tracing::warn!("Nothing to replay");
        return Ok(());
    }
    let ends = feed
        .fixes()
        .last()
        .map(|f| f.timestamp.format("%H:%M").to_string())
        .unwrap_or_default();
    tracing::info!(
        "Replaying {} fixes every {} ms (run ends {})",
        feed.len(),
        interval.as_millis(),
        ends
    );

    let mut ticker = tokio::time::interval(interval);
    while session.state() != SessionState::Closed {
        tokio::select! {
            _ = &mut *shutdown_rx => session.close(),
            _ = ticker.tick() => {
                let Some(event) = feed.next_event() else {
                    tracing::info!("Replay finished");
                    break;
                };
                let at = match &event {
                    StreamEvent::Points { points } => points.last().map(|f| f.timestamp),
                    _ => None,
                }
                .unwrap_or_else(Utc::now);

                if session.handle(&event, at) > 0 {
                    session.report(at);
                }
            }
        }
    }

    Ok(())
}
