//! Detector Orchestrator (C13, spec §4.13).
//!
//! Drives C1→C2→C3→{C4,C5}→C6→C7→C8→Detection assembly→C10 (SIM only)
//! →C11→C12. Grounded on the teacher's `AppState` + `main()` wiring
//! shape: one long-lived struct holding every subsystem, constructed
//! once, shared behind an `Arc` with every HTTP handler and background
//! task.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tracing::instrument;

use crate::bus::EventBus;
use crate::config::DetectorConfig;
use crate::error::SimulationError;
use crate::features;
use crate::filter::{FilterDecision, ObservationFilter};
use crate::history::{self, HistoryStore};
use crate::metrics;
use crate::model_holder::ModelHolder;
use crate::models::{
    AccuracyStats, Detection, EmergencyEntry, ModelScores, Mode, Observation, SimPattern,
    SubmodelStatus,
};
use crate::persistence::PersistenceGateway;
use crate::resolutions;
use crate::root_cause;
use crate::rules;
use crate::scorer;
use crate::simulation::{ObservationSink, SimLifecycle, SimulationEngine};
use crate::window::WindowAggregator;

const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

fn encode_base32(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while value > 0 {
        buf.push(CROCKFORD_ALPHABET[(value % 32) as usize]);
        value /= 32;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap()
}

#[derive(Debug, Default)]
struct ModeCounters {
    total_requests: AtomicU64,
    windows_processed: AtomicU64,
    anomalies_detected: AtomicU64,
}

/// Forwards the simulation engine's emitted observations back into
/// `Orchestrator::observe`, without the orchestrator owning a strong
/// reference cycle back to itself through the engine.
struct SimSink(Weak<Orchestrator>);

impl ObservationSink for SimSink {
    fn accept(&self, obs: Observation) {
        if let Some(orchestrator) = self.0.upgrade() {
            orchestrator.observe(obs);
        }
    }
}

pub struct Orchestrator {
    config: DetectorConfig,
    filter: ObservationFilter,
    window: WindowAggregator,
    models: ModelHolder,
    history: HistoryStore,
    persistence: Arc<PersistenceGateway>,
    bus: Arc<EventBus>,
    simulation: SimulationEngine,
    detection_seq: AtomicU64,
    source_workers: Mutex<HashMap<(Mode, String), mpsc::UnboundedSender<crate::models::Window>>>,
    scoring_semaphore: Arc<Semaphore>,
    live_counters: ModeCounters,
    live_per_source: Mutex<HashMap<String, u64>>,
    sim_counters: ModeCounters,
}

impl Orchestrator {
    pub fn new(config: DetectorConfig, persistence: Arc<PersistenceGateway>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Orchestrator>| {
            let sink: Arc<dyn ObservationSink> = Arc::new(SimSink(weak.clone()));
            let simulation = SimulationEngine::new(config.sim_virtual_routes.clone(), sink);
            let models = ModelHolder::load(Path::new(&config.model_artifact_dir));
            let filter = ObservationFilter::new(
                config.live_tracked_routes.clone(),
                config.sim_virtual_routes.clone(),
            );
            let window = WindowAggregator::new(config.window_size);
            let history = HistoryStore::new(config.history_capacity);
            let bus = Arc::new(EventBus::new(config.subscriber_queue_depth));
            let concurrency = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4);

            Self {
                config,
                filter,
                window,
                models,
                history,
                persistence,
                bus,
                simulation,
                detection_seq: AtomicU64::new(0),
                source_workers: Mutex::new(HashMap::new()),
                scoring_semaphore: Arc::new(Semaphore::new(concurrency)),
                live_counters: ModeCounters::default(),
                live_per_source: Mutex::new(HashMap::new()),
                sim_counters: ModeCounters::default(),
            }
        })
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Entry point for every observation, LIVE or SIM alike. Filters,
    /// aggregates, and — when a window seals — schedules scoring on a
    /// background task. Never blocks the caller on scoring work.
    pub fn observe(self: &Arc<Self>, obs: Observation) {
        if self.filter.classify(&obs) != FilterDecision::Tracked {
            metrics::record_observation_dropped_filter();
            return;
        }

        let mode = obs.mode;
        let source = obs.source.clone();
        let counters = self.counters_for(mode);
        counters.total_requests.fetch_add(1, Ordering::Relaxed);
        if mode == Mode::Live {
            let mut per_source = self.live_per_source.lock();
            *per_source.entry(source.clone()).or_insert(0) += 1;
        }

        self.persistence.write_observation(obs.clone());

        if let Some(window) = self.window.push(obs) {
            metrics::record_window_sealed(mode);
            let sender = self.source_worker(mode, &source);
            // `window.push` seals under one global lock, so sends here
            // land on the worker's channel in strictly increasing
            // window_id order; the worker drains them one at a time,
            // which is what gives P4 its ordering guarantee.
            let _ = sender.send(window);
        }
    }

    fn counters_for(&self, mode: Mode) -> &ModeCounters {
        match mode {
            Mode::Live => &self.live_counters,
            Mode::Sim => &self.sim_counters,
        }
    }

    /// Returns the sequencing channel for (mode, source), spawning its
    /// dedicated worker task on first use. One worker per stream drains
    /// its channel strictly in send order, so windows from the same
    /// stream are scored and published in arrival order (P4) without
    /// depending on task-scheduling order the way a plain mutex would.
    fn source_worker(
        self: &Arc<Self>,
        mode: Mode,
        source: &str,
    ) -> mpsc::UnboundedSender<crate::models::Window> {
        let mut workers = self.source_workers.lock();
        workers
            .entry((mode, source.to_string()))
            .or_insert_with(|| {
                let (tx, mut rx) = mpsc::unbounded_channel::<crate::models::Window>();
                let this = self.clone();
                let source = source.to_string();
                tokio::spawn(async move {
                    while let Some(window) = rx.recv().await {
                        this.clone().score_window(mode, source.clone(), window).await;
                    }
                });
                tx
            })
            .clone()
    }

    /// C3→{C4,C5}→C6→C7→C8→Detection assembly→C10 (SIM only)→C11→C12.
    /// Run from this stream's dedicated worker task (see
    /// `source_worker`), which already guarantees per-(mode, source)
    /// ordering; the semaphore here only caps cross-stream concurrency.
    #[instrument(skip(self, window), fields(mode = ?mode, source = %source, window_id = window.window_id))]
    async fn score_window(self: Arc<Self>, mode: Mode, source: String, window: crate::models::Window) {
        let _permit = self.scoring_semaphore.clone().acquire_owned().await;

        let started = std::time::Instant::now();
        let features = features::extract(&window);
        let deadline = self.config.scoring_deadline;

        let this = self.clone();
        let (anomaly_score, anomaly_status) =
            with_deadline(deadline, (0.0, SubmodelStatus::Unavailable), move || {
                this.models.predict_if(&features)
            })
            .await;

        let this = self.clone();
        let (failure_probability, failure_status) =
            with_deadline(deadline, (0.0, SubmodelStatus::Unavailable), move || {
                this.models.predict_failure(&features)
            })
            .await;

        let this = self.clone();
        let (cluster_id, cluster_distance, cluster_status) = with_deadline(
            deadline,
            (0u8, 0.0, SubmodelStatus::Unavailable),
            move || this.models.assign_cluster(&features),
        )
        .await;

        let this = self.clone();
        let (next_window_failure_probability, next_window_status) =
            with_deadline(deadline, (0.0, SubmodelStatus::Unavailable), move || {
                this.models.predict_next_failure(&features)
            })
            .await;

        for (status, name) in [
            (anomaly_status, "isolation_forest"),
            (failure_status, "failure_predictor"),
            (cluster_status, "kmeans"),
            (next_window_status, "next_failure_predictor"),
        ] {
            if status == SubmodelStatus::Unavailable {
                metrics::record_submodel_unavailable(name);
            }
        }

        let model_scores = ModelScores {
            anomaly_score,
            anomaly_status,
            failure_probability,
            failure_status,
            cluster_id,
            cluster_distance,
            cluster_status,
            next_window_failure_probability,
            next_window_status,
        };

        let rule_alerts = rules::evaluate(&features, &self.config.rule_thresholds);
        let scored = scorer::score(
            &rule_alerts,
            &model_scores,
            &self.config.score_weights,
            &self.config.priority_bands,
        );
        let classification = root_cause::classify(&features, &model_scores);
        let resolutions = resolutions::generate(
            classification.root_cause,
            scored.priority,
            &classification.contributing_conditions,
        );

        let injected_label = window.observations.first().and_then(|o| o.injected_label);
        let is_correctly_detected = if mode == Mode::Sim {
            injected_label.map(|injected| {
                if injected == SimPattern::Normal {
                    !scored.is_anomaly
                } else {
                    scored.is_anomaly && history::maps_to(injected, classification.root_cause)
                }
            })
        } else {
            None
        };

        let detection_latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::record_scoring_latency_ms(detection_latency_ms);

        let detection = Detection {
            id: self.next_detection_id(),
            timestamp: Utc::now(),
            mode,
            source,
            window_id: window.window_id,
            features,
            rule_alerts,
            model_scores,
            risk_score: scored.risk_score,
            priority: scored.priority,
            is_anomaly: scored.is_anomaly,
            root_cause: classification.root_cause,
            contributing_conditions: classification.contributing_conditions,
            resolutions,
            detection_latency_ms,
            injected_label,
            emergency_rank: None,
            is_correctly_detected,
        };

        let counters = self.counters_for(mode);
        counters.windows_processed.fetch_add(1, Ordering::Relaxed);
        if detection.is_anomaly {
            counters.anomalies_detected.fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_detection_emitted(mode);

        if mode == Mode::Sim {
            self.history.append(detection.clone());
        }
        self.persistence.write_detection(&detection);
        self.bus.publish(detection);
    }

    fn next_detection_id(&self) -> String {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        let seq = self.detection_seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", encode_base32(millis), encode_base32(seq))
    }

    pub fn start_simulation(
        &self,
        virtual_source: String,
        pattern: SimPattern,
        duration_s: u64,
        batch_size: usize,
        seed: u64,
    ) -> Result<(), SimulationError> {
        self.simulation
            .start(virtual_source, pattern, duration_s, batch_size, seed)
    }

    pub fn stop_simulation(&self) -> Result<(), SimulationError> {
        self.simulation.stop()
    }

    pub fn clear_simulation_history(&self) {
        self.history.clear();
    }

    pub fn live_stats(&self) -> LiveStats {
        LiveStats {
            mode: "LIVE",
            total_requests: self.live_counters.total_requests.load(Ordering::Relaxed),
            current_window_count: self.window.total_in_progress(Mode::Live),
            windows_processed: self.live_counters.windows_processed.load(Ordering::Relaxed),
            status: if self.live_counters.total_requests.load(Ordering::Relaxed) == 0 {
                "idle"
            } else {
                "active"
            },
            per_source_counts: self.live_per_source.lock().clone(),
        }
    }

    pub fn sim_stats(&self) -> SimStats {
        let target = self.simulation.current_target();
        SimStats {
            mode: "SIM",
            active: self.simulation.is_active(),
            injected_target: target.as_ref().map(|(source, _)| source.clone()),
            pattern: target.map(|(_, pattern)| pattern),
            total_requests: self.sim_counters.total_requests.load(Ordering::Relaxed),
            windows_processed: self.sim_counters.windows_processed.load(Ordering::Relaxed),
            anomalies_detected: self.sim_counters.anomalies_detected.load(Ordering::Relaxed),
            accuracy: self.history.accuracy(),
            current_window_count: self.window.total_in_progress(Mode::Sim),
        }
    }

    pub fn detections(&self, mode: Mode, limit: usize) -> Vec<Detection> {
        if mode == Mode::Sim {
            self.history.all_newest_first().into_iter().take(limit).collect()
        } else {
            match self.persistence.query_detections(mode, limit) {
                Ok(rows) => rows
                    .into_iter()
                    .filter_map(|json| serde_json::from_str(&json).ok())
                    .collect(),
                Err(_) => Vec::new(),
            }
        }
    }

    pub fn top_emergencies(&self, limit: usize) -> Vec<EmergencyEntry> {
        self.history.top_emergencies(limit)
    }

    pub fn simulation_lifecycle(&self) -> SimLifecycle {
        self.simulation.lifecycle()
    }
}

async fn with_deadline<T, F>(deadline: Duration, unavailable: T, compute: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    match tokio::time::timeout(deadline, async move { compute() }).await {
        Ok(value) => value,
        Err(_) => unavailable,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveStats {
    pub mode: &'static str,
    pub total_requests: u64,
    pub current_window_count: usize,
    pub windows_processed: u64,
    pub status: &'static str,
    pub per_source_counts: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimStats {
    pub mode: &'static str,
    pub active: bool,
    pub injected_target: Option<String>,
    pub pattern: Option<SimPattern>,
    pub total_requests: u64,
    pub windows_processed: u64,
    pub anomalies_detected: u64,
    pub accuracy: AccuracyStats,
    pub current_window_count: usize,
}
