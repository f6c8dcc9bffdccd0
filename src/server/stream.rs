//! Broadcast stream - tails the position store for each connected viewer
//!
//! # Per-viewer lifecycle
//!
//! ```text
//! Connecting ──open()──→ Streaming ──client gone──→ Closed
//!                          │   ▲
//!                          └───┘ poll() every poll_interval
//! ```
//!
//! Each viewer gets its own task and timer; viewers share nothing but the
//! store. Every read is clipped at the delay horizon (`now - delay`), so a
//! fix stamped T is never sent before T + delay.

use super::AppState;
use crate::config::BroadcastConfig;
use crate::race::StreamEvent;
use crate::storage::SharedStore;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use chrono::{DateTime, Utc};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;

/// Events buffered per viewer before the poll loop waits on the client
const VIEWER_CHANNEL_CAPACITY: usize = 16;

/// Where a viewer connection is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Connecting,
    Streaming,
    Closed,
}

/// Cursor-tracking feed for a single viewer
pub struct ViewerFeed {
    store: SharedStore,
    delay: chrono::Duration,
    init_batch: usize,
    poll_batch: usize,
    cursor: i64,
    state: FeedState,
}

impl ViewerFeed {
    pub fn new(store: SharedStore, config: &BroadcastConfig) -> Self {
        Self {
            store,
            delay: config.delay(),
            init_batch: config.init_batch,
            poll_batch: config.poll_batch,
            cursor: 0,
            state: FeedState::Connecting,
        }
    }

    /// Highest fix id this viewer has been sent
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    fn horizon(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.delay
    }

    /// Send the initial snapshot and move to Streaming
    ///
    /// Returns `None` when nothing is visible yet; the cursor stays at 0.
    pub fn open(&mut self, now: DateTime<Utc>) -> Option<StreamEvent> {
        let horizon = self.horizon(now);
        self.state = FeedState::Streaming;

        match self.store.query_after(0, horizon, self.init_batch) {
            Ok(points) if points.is_empty() => None,
            Ok(points) => {
                self.cursor = points.iter().map(|p| p.id).max().unwrap_or(self.cursor);
                Some(StreamEvent::Init { points })
            }
            Err(e) => {
                tracing::error!("Race stream init error: {:#}", e);
                Some(StreamEvent::Error {
                    message: "Init failed".to_string(),
                })
            }
        }
    }

    /// One poll tick: new fixes past the cursor, or a heartbeat
    pub fn poll(&mut self, now: DateTime<Utc>) -> StreamEvent {
        let horizon = self.horizon(now);

        match self.store.query_after(self.cursor, horizon, self.poll_batch) {
            Ok(points) if points.is_empty() => StreamEvent::Heartbeat { time: now },
            Ok(points) => {
                if let Some(max_id) = points.iter().map(|p| p.id).max() {
                    self.cursor = self.cursor.max(max_id);
                }
                StreamEvent::Points { points }
            }
            Err(e) => {
                tracing::error!("Race stream poll error: {:#}", e);
                StreamEvent::Error {
                    message: "Poll failed".to_string(),
                }
            }
        }
    }

    pub fn close(&mut self) {
        self.state = FeedState::Closed;
    }
}

/// Drive one viewer until its receiver goes away
///
/// The first poll happens one full period after the snapshot. A send
/// failure or a closed channel ends the loop and drops the timer.
pub async fn run_feed(mut feed: ViewerFeed, tx: mpsc::Sender<StreamEvent>, period: Duration) {
    if let Some(event) = feed.open(Utc::now()) {
        tracing::debug!("Viewer snapshot: {} (cursor {})", event.kind(), feed.cursor());
        if tx.send(event).await.is_err() {
            feed.close();
            return;
        }
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tx.closed() => break,
            _ = ticker.tick() => {
                let event = feed.poll(Utc::now());
                tracing::trace!("Viewer tick: {} (cursor {})", event.kind(), feed.cursor());
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        }
    }

    feed.close();
    tracing::debug!("Viewer disconnected at cursor {}", feed.cursor());
}

fn to_sse_event(event: &StreamEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|e| {
        tracing::error!("Failed to serialize stream event: {}", e);
        Event::default().data(r#"{"type":"error","message":"Serialization failed"}"#)
    })
}

/// GET /api/race/stream - Server-sent events feed of delayed fixes
///
/// `Sse` sets `Content-Type: text/event-stream` and `Cache-Control: no-cache`.
pub async fn race_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(VIEWER_CHANNEL_CAPACITY);
    let feed = ViewerFeed::new(state.store.clone(), &state.broadcast);
    tokio::spawn(run_feed(feed, tx, state.broadcast.poll_interval()));

    tracing::debug!(
        "Viewer connected (delay {} min)",
        state.broadcast.delay_minutes
    );

    Sse::new(ReceiverStream::new(rx).map(|event| Ok(to_sse_event(&event))))
}
