//! Tracking client: merges stream events into a local view of the race
//!
//! # Data flow
//!
//! ```text
//! SSE stream ──decode──→ StreamEvent ──┐
//!                                      ├──→ TrackingSession ──→ Reconciler ──→ RaceProgress
//! Replay feed ─────────→ StreamEvent ──┘
//! ```
//!
//! Live and replay sources produce the same events, so one reconciler
//! handles both. Duplicates are dropped by id; the buffer keeps arrival
//! order and is never re-sorted.

pub mod replay;
pub mod sse;

use crate::config::{RaceConfig, TrackerConfig};
use crate::race::{geo, Checkpoint, Fix, StreamEvent};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashSet, VecDeque};

/// Where tracking data comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    Live,
    Replay,
}

impl TrackingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingMode::Live => "live",
            TrackingMode::Replay => "replay",
        }
    }
}

/// Session lifecycle: Open until the first event, Active while tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Active,
    Closed,
}

/// Derived race progress at the newest buffered fix
#[derive(Debug, Clone, PartialEq)]
pub struct RaceProgress {
    /// Distance marker of the checkpoint nearest the smoothed position
    pub estimated_km: f64,
    pub remaining_km: f64,
    pub nearest: Checkpoint,
    /// Checkpoints with `km <= estimated_km`, in route order
    pub passed: Vec<Checkpoint>,
    pub next: Option<Checkpoint>,
    /// Projected arrival at the next checkpoint at the latest speed
    pub next_eta: Option<DateTime<Utc>>,
    /// Projected finish at the latest speed
    pub eta: Option<DateTime<Utc>>,
}

/// Project an arrival time `km` ahead of `from` at `speed_mps`
fn project_arrival(from: DateTime<Utc>, km: f64, speed_mps: f64) -> Option<DateTime<Utc>> {
    if speed_mps.is_nan() || speed_mps <= 0.0 || !km.is_finite() {
        return None;
    }
    let millis = (km * 1000.0 / speed_mps * 1000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    from.checked_add_signed(Duration::try_milliseconds(millis as i64)?)
}

/// Client-side merge of stream events
#[derive(Debug)]
pub struct Reconciler {
    buffer: VecDeque<Fix>,
    seen: HashSet<i64>,
    cursor: i64,
    connected: bool,
    last_contact: Option<DateTime<Utc>>,
    smoothing_window: usize,
    buffer_limit: Option<usize>,
}

impl Reconciler {
    pub fn new(smoothing_window: usize, buffer_limit: Option<usize>) -> Self {
        Self {
            buffer: VecDeque::new(),
            seen: HashSet::new(),
            cursor: 0,
            connected: false,
            last_contact: None,
            smoothing_window: smoothing_window.max(1),
            buffer_limit,
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.smoothing_window, config.buffer_limit)
    }

    /// Apply one stream event, returning how many fixes were accepted
    pub fn apply(&mut self, event: &StreamEvent, now: DateTime<Utc>) -> usize {
        self.connected = true;
        self.last_contact = Some(now);

        match event {
            StreamEvent::Init { points } | StreamEvent::Points { points } => self.merge(points),
            StreamEvent::Heartbeat { .. } => 0,
            StreamEvent::Error { message } => {
                tracing::warn!("Stream reported error: {}", message);
                0
            }
        }
    }

    /// Append fixes with unseen ids in the order given
    pub fn merge(&mut self, points: &[Fix]) -> usize {
        let mut accepted = 0;
        for fix in points {
            if !self.seen.insert(fix.id) {
                continue;
            }
            self.cursor = self.cursor.max(fix.id);
            self.buffer.push_back(fix.clone());
            accepted += 1;
        }

        // Evicted ids stay in `seen` so a replayed snapshot cannot re-add them
        if let Some(limit) = self.buffer_limit {
            while self.buffer.len() > limit {
                self.buffer.pop_front();
            }
        }
        accepted
    }

    /// Transport dropped; keep the buffer for "last seen"
    pub fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    pub fn mark_connected(&mut self, now: DateTime<Utc>) {
        self.connected = true;
        self.last_contact = Some(now);
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn last_contact(&self) -> Option<DateTime<Utc>> {
        self.last_contact
    }

    /// Highest fix id accepted so far
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Buffered fixes in arrival order
    pub fn fixes(&self) -> impl DoubleEndedIterator<Item = &Fix> {
        self.buffer.iter()
    }

    /// Most recently accepted fix
    pub fn latest(&self) -> Option<&Fix> {
        self.buffer.back()
    }

    /// Time since the most recently accepted fix was taken
    pub fn staleness(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.latest().map(|fix| now - fix.timestamp)
    }

    /// Mean lat/lng over the last `smoothing_window` fixes
    pub fn smoothed_position(&self) -> Option<(f64, f64)> {
        geo::mean_position(self.fixes().rev().take(self.smoothing_window))
    }

    /// Progress along the race, `None` until a fix arrives or without checkpoints
    pub fn progress(&self, race: &RaceConfig) -> Option<RaceProgress> {
        let latest = self.latest()?;
        let (lat, lng) = self.smoothed_position()?;
        let nearest = geo::nearest_checkpoint(&race.checkpoints, lat, lng)?.clone();

        let estimated_km = nearest.km;
        let remaining_km = (race.distance_km - estimated_km).max(0.0);
        let next = geo::next_checkpoint(&race.checkpoints, estimated_km).cloned();
        let passed = race
            .checkpoints
            .iter()
            .filter(|cp| cp.km <= estimated_km)
            .cloned()
            .collect();

        let speed = latest.speed_mps.unwrap_or(0.0);
        let eta = project_arrival(latest.timestamp, remaining_km, speed);
        let next_eta = next
            .as_ref()
            .and_then(|cp| project_arrival(latest.timestamp, cp.km - estimated_km, speed));

        Some(RaceProgress {
            estimated_km,
            remaining_km,
            nearest,
            passed,
            next,
            next_eta,
            eta,
        })
    }

    /// Forget everything, as if freshly created
    pub fn reset(&mut self) {
        *self = Self::new(self.smoothing_window, self.buffer_limit);
    }
}

/// One viewer's tracking state, owned by the caller
#[derive(Debug)]
pub struct TrackingSession {
    mode: TrackingMode,
    state: SessionState,
    race: RaceConfig,
    reconciler: Reconciler,
}

impl TrackingSession {
    pub fn new(mode: TrackingMode, tracker: &TrackerConfig, race: RaceConfig) -> Self {
        Self {
            mode,
            state: SessionState::Open,
            race,
            reconciler: Reconciler::from_config(tracker),
        }
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Feed one event; ignored once the session is closed
    pub fn handle(&mut self, event: &StreamEvent, now: DateTime<Utc>) -> usize {
        if self.state == SessionState::Closed {
            return 0;
        }
        self.state = SessionState::Active;
        self.reconciler.apply(event, now)
    }

    pub fn on_connect(&mut self, now: DateTime<Utc>) {
        if self.state != SessionState::Closed {
            self.reconciler.mark_connected(now);
        }
    }

    pub fn on_disconnect(&mut self) {
        self.reconciler.mark_disconnected();
    }

    /// Switch between live and replay; buffer and cursor start over
    pub fn switch_mode(&mut self, mode: TrackingMode) {
        if self.state == SessionState::Closed || self.mode == mode {
            return;
        }
        tracing::info!("Tracking mode {} -> {}", self.mode.as_str(), mode.as_str());
        self.mode = mode;
        self.state = SessionState::Open;
        self.reconciler.reset();
    }

    pub fn close(&mut self) {
        self.reconciler.mark_disconnected();
        self.state = SessionState::Closed;
    }

    pub fn progress(&self) -> Option<RaceProgress> {
        self.reconciler.progress(&self.race)
    }

    /// "live" while the source is delivering, "disconnected" otherwise
    pub fn link_status(&self) -> &'static str {
        if self.reconciler.is_connected() {
            "live"
        } else {
            "disconnected"
        }
    }

    /// Log a one-line progress report after new fixes
    pub fn report(&self, now: DateTime<Utc>) {
        if self.reconciler.is_empty() {
            tracing::info!(
                "[{}] {}, waiting for first fix",
                self.mode.as_str(),
                self.link_status()
            );
            return;
        }
        let Some(progress) = self.progress() else {
            tracing::info!(
                "[{}] {} fixes, no checkpoints to measure against",
                self.mode.as_str(),
                self.reconciler.len()
            );
            return;
        };
        let eta = progress
            .eta
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let next = progress
            .next
            .as_ref()
            .map(|cp| format!("{} ({} km)", cp.name, cp.km))
            .unwrap_or_else(|| "-".to_string());
        let seen = self
            .reconciler
            .staleness(now)
            .map(|d| format!("{}s ago", d.num_seconds()))
            .unwrap_or_else(|| "-".to_string());

        tracing::info!(
            "[{} {}] {:.1} km done, {:.1} km to go | near {} | next {} | ETA {} | last fix {} | {} fixes (cursor {})",
            self.mode.as_str(),
            self.link_status(),
            progress.estimated_km,
            progress.remaining_km,
            progress.nearest.name,
            next,
            eta,
            seen,
            self.reconciler.len(),
            self.reconciler.cursor()
        );
    }
}
