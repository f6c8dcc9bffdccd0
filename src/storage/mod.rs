// Storage module - append-only position store for race fixes
//
// The store is the only shared mutable resource in the pipeline. Every
// operation is a single statement: an insert from the ping endpoint or a
// bounded read from a viewer's poll loop. Ids are the cursor; timestamps
// are device time and only filter and order the reads.
//
// Example: sqlite3 data/race.db 'SELECT id, timestamp_ms, lat, lng FROM race_points'

mod sqlite;

pub use sqlite::SqliteStore;

use crate::race::{Fix, NewFix};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Durable append-only storage of GPS fixes with id-ordered retrieval
pub trait PositionStore: Send + Sync {
    /// Insert a fix and return its newly assigned id
    ///
    /// Fails with a `FixError` if lat/lng are absent or not finite.
    fn append(&self, fix: &NewFix) -> Result<i64>;

    /// Fixes with `id > after_id` and `timestamp <= before`,
    /// oldest timestamp first, at most `limit` rows
    fn query_after(&self, after_id: i64, before: DateTime<Utc>, limit: usize) -> Result<Vec<Fix>>;

    /// Most recent fix (by timestamp) at or before `before`
    fn latest_before(&self, before: DateTime<Utc>) -> Result<Option<Fix>>;

    /// Total number of stored fixes
    fn count(&self) -> Result<u64>;
}

/// Store handle shared between the ping handler and every viewer task
pub type SharedStore = Arc<dyn PositionStore>;
