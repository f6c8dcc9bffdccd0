// SSE client - decodes the broadcast stream and drives a live session
//
// Frames are separated by a blank line. Within a frame only `data:` lines
// matter; multiple data lines join with "\n". Lines starting with ':' are
// comments, and `event:`/`id:`/`retry:` fields are ignored because the
// broadcast only sends unnamed messages.
//
// The watcher reconnects after a fixed delay like a browser EventSource.
// The buffer survives reconnects; the fresh init snapshot overlaps what we
// already hold and dedup absorbs it.

use super::TrackingSession;
use crate::race::StreamEvent;
use anyhow::{Context, Result};
use chrono::Utc;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::oneshot;

/// Incremental decoder for `text/event-stream` bodies
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning the data payload of every completed frame
    ///
    /// Chunks may split frames, lines or UTF-8 sequences anywhere.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut frames = Vec::new();
        while let Some(end) = self.buf.windows(2).position(|w| w == b"\n\n") {
            let frame: Vec<u8> = self.buf.drain(..end + 2).collect();
            if let Some(data) = frame_data(&String::from_utf8_lossy(&frame[..end])) {
                frames.push(data);
            }
        }
        frames
    }
}

/// Joined `data:` lines of one frame, `None` if there are none
fn frame_data(frame: &str) -> Option<String> {
    let lines: Vec<&str> = frame
        .lines()
        .filter(|line| !line.starts_with(':'))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Parse one frame payload as a stream event
pub fn decode_event(data: &str) -> Result<StreamEvent> {
    serde_json::from_str(data).with_context(|| format!("Invalid stream event: {}", data))
}

/// Connect once and feed events into the session until the stream ends
async fn stream_once(
    client: &reqwest::Client,
    url: &str,
    session: &mut TrackingSession,
) -> Result<()> {
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
        .with_context(|| format!("Failed to connect to {}", url))?
        .error_for_status()
        .context("Stream request rejected")?;

    session.on_connect(Utc::now());
    tracing::info!("Connected to {}", url);

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("Stream read failed")?;
        for data in decoder.push(&chunk) {
            let event = match decode_event(&data) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Skipping frame: {:#}", e);
                    continue;
                }
            };

            let now = Utc::now();
            let accepted = session.handle(&event, now);
            tracing::debug!("Stream event: {} ({} new)", event.kind(), accepted);
            if accepted > 0 {
                session.report(now);
            }
        }
    }

    Ok(())
}

/// Follow the live stream until shutdown, reconnecting after `reconnect`
pub async fn watch(
    url: &str,
    session: &mut TrackingSession,
    reconnect: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> Result<()> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to create HTTP client")?;

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            result = stream_once(&client, url, session) => match result {
                Ok(()) => tracing::warn!("Stream closed by server"),
                Err(e) => tracing::warn!("Stream error: {:#}", e),
            },
        }

        session.on_disconnect();
        let now = Utc::now();
        let contact = session
            .reconciler()
            .last_contact()
            .map(|t| format!("{}s ago", (now - t).num_seconds()))
            .unwrap_or_else(|| "never".to_string());
        if let Some(stale) = session.reconciler().staleness(now) {
            tracing::info!(
                "Disconnected (contact {}), last seen {} min ago; retrying in {}s",
                contact,
                stale.num_minutes(),
                reconnect.as_secs()
            );
        } else {
            tracing::info!(
                "Disconnected (contact {}); retrying in {}s",
                contact,
                reconnect.as_secs()
            );
        }

        tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = tokio::time::sleep(reconnect) => {}
        }
    }

    session.close();
    tracing::info!("Watcher stopped");
    Ok(())
}
