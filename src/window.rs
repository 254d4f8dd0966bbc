//! Window Aggregator (C2, spec §4.2).
//!
//! Per-(mode, source) tumbling windows of fixed size `N`. Each push can
//! seal at most one window; the next observation always opens a fresh
//! one. Grounded on the teacher's `SignalStorage` bounded-ring pattern
//! (`examples/cooprefr-bettersys/rust-backend/src/signals/storage.rs`),
//! generalized from one global ring to a per-key map of in-progress
//! windows guarded by a single `parking_lot::Mutex`.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;

use crate::models::{Mode, Observation, Window};

#[derive(Debug, Clone, Default)]
struct InProgress {
    observations: Vec<Observation>,
    opened_at: Option<chrono::DateTime<Utc>>,
}

pub struct WindowAggregator {
    window_size: usize,
    next_window_id: Mutex<u64>,
    streams: Mutex<HashMap<(Mode, String), InProgress>>,
}

impl WindowAggregator {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            next_window_id: Mutex::new(1),
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Appends `obs` to its (mode, source) stream. Returns `Some(Window)`
    /// exactly when this push fills the window to `window_size`; the
    /// stream is reset to empty immediately after (tumbling, not
    /// sliding — spec.md §9 pins this).
    pub fn push(&self, obs: Observation) -> Option<Window> {
        let key = (obs.mode, obs.source.clone());
        let mut streams = self.streams.lock();
        let entry = streams.entry(key.clone()).or_default();

        if entry.observations.is_empty() {
            entry.opened_at = Some(obs.ts_wall);
        }
        entry.observations.push(obs);

        if entry.observations.len() < self.window_size {
            return None;
        }

        let observations = std::mem::take(&mut entry.observations);
        let opened_at = entry.opened_at.take().unwrap_or_else(Utc::now);
        let closed_at = observations
            .last()
            .map(|o| o.ts_wall)
            .unwrap_or_else(Utc::now);

        let window_id = {
            let mut id = self.next_window_id.lock();
            let this = *id;
            *id += 1;
            this
        };

        Some(Window {
            window_id,
            mode: key.0,
            source: key.1,
            opened_at,
            closed_at,
            observations,
        })
    }

    /// Read-only snapshot of the current in-progress count for a
    /// stream, for status/diagnostics endpoints. Never seals.
    pub fn in_progress_len(&self, mode: Mode, source: &str) -> usize {
        self.streams
            .lock()
            .get(&(mode, source.to_string()))
            .map(|e| e.observations.len())
            .unwrap_or(0)
    }

    /// Sum of in-progress observation counts across every stream for
    /// `mode`, for the `/live/stats` and `/sim/stats` endpoints.
    pub fn total_in_progress(&self, mode: Mode) -> usize {
        self.streams
            .lock()
            .iter()
            .filter(|((m, _), _)| *m == mode)
            .map(|(_, e)| e.observations.len())
            .sum()
    }
}
