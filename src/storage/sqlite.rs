//! SQLite-backed position store
//!
//! # Architecture
//!
//! ```text
//! Ping handler ──┐
//!                ├──→ SqliteStore (r2d2 pool, max 4)
//! Viewer tasks ──┘        │
//!                         └──→ race_points (WAL mode)
//! ```
//!
//! WAL lets the viewer reads run alongside the single writer. `AUTOINCREMENT`
//! keeps ids strictly increasing even if rows are ever removed externally.

use super::PositionStore;
use crate::race::{Fix, NewFix};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Current schema version stored in the metadata table
const SCHEMA_VERSION: i32 = 1;

const SELECT_COLUMNS: &str = "id, timestamp_ms, lat, lng, accuracy_m, speed_mps";

/// Row as read from SQLite, before timestamp conversion
type RawRow = (i64, i64, f64, f64, Option<f64>, Option<f64>);

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Open (or create) the store at `db_path`
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                r#"
                PRAGMA busy_timeout=5000;
                PRAGMA journal_mode=WAL;
                PRAGMA synchronous=NORMAL;
                "#,
            )
        });
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .context("Failed to build SQLite connection pool")?;

        Self::from_pool(pool)
    }

    /// Private in-memory store for tests
    ///
    /// Every SQLite `:memory:` connection is its own database, so the pool
    /// is capped at a single connection that is never recycled.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(SqliteConnectionManager::memory())
            .context("Failed to build in-memory SQLite pool")?;
        Self::from_pool(pool)
    }

    fn from_pool(pool: Pool<SqliteConnectionManager>) -> Result<Self> {
        let store = Self { pool };
        let conn = store.conn()?;
        Self::init_schema(&conn)?;
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .context("Failed to get SQLite connection from pool")
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT
            );

            CREATE TABLE IF NOT EXISTS race_points (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp_ms INTEGER NOT NULL,  -- device time, ms since epoch
                lat REAL NOT NULL,
                lng REAL NOT NULL,
                accuracy_m REAL,
                speed_mps REAL,
                received_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_race_points_timestamp ON race_points(timestamp_ms);
            "#,
        )
        .context("Failed to create race_points schema")?;

        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    fn to_fix((id, ts_ms, lat, lng, accuracy_m, speed_mps): RawRow) -> Result<Fix> {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(ts_ms)
            .with_context(|| format!("Fix {} has out-of-range timestamp {}", id, ts_ms))?;
        Ok(Fix {
            id,
            timestamp,
            lat,
            lng,
            accuracy_m,
            speed_mps,
        })
    }

    fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }
}

impl PositionStore for SqliteStore {
    fn append(&self, fix: &NewFix) -> Result<i64> {
        let (lat, lng) = fix.coordinates()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO race_points (timestamp_ms, lat, lng, accuracy_m, speed_mps, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                fix.timestamp.timestamp_millis(),
                lat,
                lng,
                fix.accuracy_m,
                fix.speed_mps,
                Utc::now().to_rfc3339(),
            ],
        )
        .context("Failed to insert race point")?;
        Ok(conn.last_insert_rowid())
    }

    fn query_after(&self, after_id: i64, before: DateTime<Utc>, limit: usize) -> Result<Vec<Fix>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM race_points
             WHERE id > ?1 AND timestamp_ms <= ?2
             ORDER BY timestamp_ms ASC, id ASC
             LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(
                params![
                    after_id,
                    before.timestamp_millis(),
                    // SQLite reads a negative LIMIT as unbounded
                    i64::try_from(limit).unwrap_or(i64::MAX)
                ],
                Self::read_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read race points")?;

        rows.into_iter().map(Self::to_fix).collect()
    }

    fn latest_before(&self, before: DateTime<Utc>) -> Result<Option<Fix>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM race_points
                     WHERE timestamp_ms <= ?1
                     ORDER BY timestamp_ms DESC, id DESC
                     LIMIT 1"
                ),
                params![before.timestamp_millis()],
                Self::read_row,
            )
            .optional()
            .context("Failed to read latest race point")?;
        row.map(Self::to_fix).transpose()
    }

    fn count(&self) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM race_points", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race::FixError;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 15, 6, 0, 0).unwrap()
    }

    #[test]
    fn test_append_assigns_increasing_ids() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.append(&NewFix::at(t0(), 61.0, 14.0)).unwrap();
        let b = store.append(&NewFix::at(t0(), 61.1, 14.1)).unwrap();
        let c = store.append(&NewFix::at(t0(), 61.2, 14.2)).unwrap();
        assert!(a < b && b < c);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_query_returns_fields_as_submitted() {
        let store = SqliteStore::in_memory().unwrap();
        let fix = NewFix {
            timestamp: t0(),
            lat: Some(61.0),
            lng: Some(14.0),
            accuracy_m: Some(4.5),
            speed_mps: Some(3.0),
        };
        let id = store.append(&fix).unwrap();

        let rows = store.query_after(0, DateTime::<Utc>::MAX_UTC, 10).unwrap();
        assert_eq!(
            rows,
            vec![Fix {
                id,
                timestamp: t0(),
                lat: 61.0,
                lng: 14.0,
                accuracy_m: Some(4.5),
                speed_mps: Some(3.0),
            }]
        );
    }

    #[test]
    fn test_missing_coordinates_never_persisted() {
        let store = SqliteStore::in_memory().unwrap();
        let before = store.count().unwrap();

        let mut fix = NewFix::at(t0(), 61.0, 14.0);
        fix.lat = None;
        let err = store.append(&fix).unwrap_err();
        assert_eq!(
            err.downcast_ref::<FixError>(),
            Some(&FixError::MissingCoordinates)
        );
        assert_eq!(store.count().unwrap(), before);
    }

    #[test]
    fn test_query_filters_by_cursor_and_horizon() {
        let store = SqliteStore::in_memory().unwrap();
        let first = store.append(&NewFix::at(t0(), 61.0, 14.0)).unwrap();
        store
            .append(&NewFix::at(t0() + Duration::minutes(1), 61.1, 14.1))
            .unwrap();
        store
            .append(&NewFix::at(t0() + Duration::minutes(10), 61.2, 14.2))
            .unwrap();

        let rows = store
            .query_after(first, t0() + Duration::minutes(5), 10)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].lat, 61.1);
    }

    #[test]
    fn test_query_orders_by_timestamp_and_caps_limit() {
        let store = SqliteStore::in_memory().unwrap();
        // Inserted out of timestamp order
        store
            .append(&NewFix::at(t0() + Duration::minutes(2), 2.0, 2.0))
            .unwrap();
        store.append(&NewFix::at(t0(), 0.0, 0.0)).unwrap();
        store
            .append(&NewFix::at(t0() + Duration::minutes(1), 1.0, 1.0))
            .unwrap();

        let rows = store.query_after(0, DateTime::<Utc>::MAX_UTC, 2).unwrap();
        let lats: Vec<f64> = rows.iter().map(|f| f.lat).collect();
        assert_eq!(lats, vec![0.0, 1.0]);
    }

    #[test]
    fn test_query_with_huge_limit_returns_everything() {
        let store = SqliteStore::in_memory().unwrap();
        for i in 0..3 {
            store
                .append(&NewFix::at(t0() + Duration::minutes(i), 1.0, 1.0))
                .unwrap();
        }

        for limit in [usize::MAX, usize::MAX / 2 + 1] {
            let rows = store.query_after(0, DateTime::<Utc>::MAX_UTC, limit).unwrap();
            assert_eq!(rows.len(), 3, "limit: {}", limit);
        }
        assert!(store
            .query_after(0, DateTime::<Utc>::MAX_UTC, 0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_latest_before_respects_horizon() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.latest_before(t0()).unwrap().is_none());

        store.append(&NewFix::at(t0(), 61.0, 14.0)).unwrap();
        store
            .append(&NewFix::at(t0() + Duration::minutes(30), 61.5, 14.5))
            .unwrap();

        let latest = store
            .latest_before(t0() + Duration::minutes(10))
            .unwrap()
            .unwrap();
        assert_eq!(latest.lat, 61.0);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!(
            "racetrack-store-test-{}-{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let path = dir.join("race.db");

        let id = {
            let store = SqliteStore::open(&path).unwrap();
            store.append(&NewFix::at(t0(), 61.0, 14.0)).unwrap()
        };
        let store = SqliteStore::open(&path).unwrap();
        let rows = store.query_after(0, DateTime::<Utc>::MAX_UTC, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);

        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
