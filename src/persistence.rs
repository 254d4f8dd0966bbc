//! Persistence Gateway (C11, spec §4.11).
//!
//! Two append-only SQLite tables (`observations`, `detections`), both
//! carrying `mode`. Grounded on the teacher's `DbSignalStorage`:
//! `rusqlite` with the `bundled` feature, a `parking_lot::Mutex`-guarded
//! synchronous connection, schema created at open. Observation writes
//! are funneled through one bounded `tokio::sync::mpsc` channel with a
//! single writer task and oldest-drop on overflow; detection writes are
//! exactly-once via a `UNIQUE(mode, source, window_id)` constraint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::error::PersistenceError;
use crate::models::{Detection, Mode, Observation};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS observations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mode TEXT NOT NULL,
    source TEXT NOT NULL,
    route TEXT NOT NULL,
    method TEXT NOT NULL,
    status INTEGER NOT NULL,
    latency_ms REAL NOT NULL,
    payload_bytes INTEGER NOT NULL,
    ts_wall TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_observations_mode_source
    ON observations(mode, source, ts_wall DESC);

CREATE TABLE IF NOT EXISTS detections (
    id TEXT PRIMARY KEY,
    mode TEXT NOT NULL,
    source TEXT NOT NULL,
    window_id INTEGER NOT NULL,
    timestamp TEXT NOT NULL,
    risk_score REAL NOT NULL,
    priority TEXT NOT NULL,
    detection_json TEXT NOT NULL,
    UNIQUE(mode, source, window_id)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_detections_mode_timestamp
    ON detections(mode, timestamp DESC);
"#;

/// A best-effort, batched observation write. Dropped silently (with a
/// counter bump) under overflow — never blocks the hot path.
struct PendingObservation(Observation);

pub struct PersistenceGateway {
    conn: Arc<Mutex<Connection>>,
    observation_tx: mpsc::Sender<PendingObservation>,
    dropped_observations: Arc<AtomicU64>,
    conflicted_detections: Arc<AtomicU64>,
}

impl PersistenceGateway {
    /// Opens (creating if absent) the database at `db_path`, applies
    /// the schema, and spawns the single observation-writer task.
    pub fn open(db_path: &str, observation_queue_depth: usize) -> Result<Self, PersistenceError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(db_path, flags)?;
        conn.execute_batch(SCHEMA_SQL)?;

        let conn = Arc::new(Mutex::new(conn));
        let (tx, mut rx) = mpsc::channel::<PendingObservation>(observation_queue_depth);
        let dropped_observations = Arc::new(AtomicU64::new(0));

        let writer_conn = conn.clone();
        tokio::spawn(async move {
            while let Some(PendingObservation(obs)) = rx.recv().await {
                let conn = writer_conn.lock();
                if let Err(e) = insert_observation(&conn, &obs) {
                    error!(error = %e, "observation write failed");
                }
            }
        });

        Ok(Self {
            conn,
            observation_tx: tx,
            dropped_observations,
            conflicted_detections: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Fire-and-forget, bounded; drops the new observation (and counts
    /// it) if the writer queue is full rather than blocking the
    /// producer (spec §7 Overload policy).
    pub fn write_observation(&self, obs: Observation) {
        if self.observation_tx.try_send(PendingObservation(obs)).is_err() {
            self.dropped_observations.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_queue_drop("observations", 1);
            warn!("observation write queue full, dropping newest observation");
        }
    }

    pub fn dropped_observation_count(&self) -> u64 {
        self.dropped_observations.load(Ordering::Relaxed)
    }

    pub fn conflicted_detection_count(&self) -> u64 {
        self.conflicted_detections.load(Ordering::Relaxed)
    }

    /// Exactly-once per (mode, source, window_id). A conflict here is
    /// a Logic-class bug (spec §7) — logged and counted, never
    /// propagated, since the Detection already lives in memory / the
    /// event bus regardless of persistence outcome.
    pub fn write_detection(&self, detection: &Detection) {
        let conn = self.conn.lock();
        match insert_detection(&conn, detection) {
            Ok(true) => {}
            Ok(false) => {
                self.conflicted_detections.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_detection_conflict();
                error!(
                    mode = detection.mode.as_str(),
                    source = %detection.source,
                    window_id = detection.window_id,
                    "duplicate detection write for (mode, source, window_id) — exactly-once invariant violated"
                );
            }
            Err(e) => {
                error!(error = %e, "detection write failed");
            }
        }
    }

    pub fn query_detections(&self, mode: Mode, limit: usize) -> Result<Vec<String>, PersistenceError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT detection_json FROM detections WHERE mode = ?1 ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![mode.as_str(), limit as i64], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

fn insert_observation(conn: &Connection, obs: &Observation) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO observations (mode, source, route, method, status, latency_ms, payload_bytes, ts_wall)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            obs.mode.as_str(),
            obs.source,
            obs.route,
            format!("{:?}", obs.method),
            obs.status,
            obs.latency_ms,
            obs.payload_bytes,
            obs.ts_wall.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Returns `Ok(true)` on a fresh insert, `Ok(false)` on a unique-key
/// conflict (already written for this window).
fn insert_detection(conn: &Connection, detection: &Detection) -> Result<bool, PersistenceError> {
    let json = serde_json::to_string(detection)?;
    let changes = conn.execute(
        "INSERT OR IGNORE INTO detections (id, mode, source, window_id, timestamp, risk_score, priority, detection_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            detection.id,
            detection.mode.as_str(),
            detection.source,
            detection.window_id as i64,
            detection.timestamp.to_rfc3339(),
            detection.risk_score,
            format!("{:?}", detection.priority),
            json,
        ],
    )?;
    Ok(changes > 0)
}
