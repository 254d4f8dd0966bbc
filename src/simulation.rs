//! Simulation Engine (C9, spec §4.9).
//!
//! Produces labeled synthetic observations targeting exactly one
//! virtual source with exactly one anomaly pattern, at a controlled
//! rate, for a controlled duration, without ever touching the LIVE
//! pipeline. Grounded on the teacher's `DataSourceKillSwitch` /
//! background-task lifecycle pattern in `main.rs`: a small state
//! machine flipped by a background `tokio::spawn`, never by the
//! caller directly.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::info;

use crate::error::SimulationError;
use crate::models::{HttpMethod, Mode, Observation, SimPattern};

/// Emission tick interval. Fine enough to comfortably clear the
/// "≥150 emissions/s at batch_size≥100" target without busy-spinning.
const TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimLifecycle {
    Idle,
    Scheduled,
    Running,
    Stopping,
}

/// Anything that accepts emitted observations — the Detector
/// Orchestrator's `observe` entry point, in production; a recording
/// stub in tests.
pub trait ObservationSink: Send + Sync {
    fn accept(&self, obs: Observation);
}

#[derive(Debug, Default)]
pub struct SimCounters {
    pub total_emitted: AtomicU64,
}

struct ActiveRun {
    virtual_source: String,
    pattern: SimPattern,
    started_at: std::time::Instant,
    duration: Duration,
    batch_size: usize,
    seed: u64,
    cancel: Arc<AtomicBool>,
}

pub struct SimulationEngine {
    virtual_routes: Vec<String>,
    sink: Arc<dyn ObservationSink>,
    state: Arc<Mutex<SimLifecycle>>,
    active: Arc<Mutex<Option<ActiveRun>>>,
    counters: Arc<SimCounters>,
}

impl SimulationEngine {
    pub fn new(virtual_routes: Vec<String>, sink: Arc<dyn ObservationSink>) -> Self {
        Self {
            virtual_routes,
            sink,
            state: Arc::new(Mutex::new(SimLifecycle::Idle)),
            active: Arc::new(Mutex::new(None)),
            counters: Arc::new(SimCounters::default()),
        }
    }

    pub fn lifecycle(&self) -> SimLifecycle {
        *self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.lifecycle(), SimLifecycle::Idle)
    }

    pub fn counters(&self) -> Arc<SimCounters> {
        self.counters.clone()
    }

    pub fn current_target(&self) -> Option<(String, SimPattern)> {
        self.active
            .lock()
            .as_ref()
            .map(|r| (r.virtual_source.clone(), r.pattern))
    }

    /// Starts a new run. Fails with `InvalidTarget`/`InvalidPattern`
    /// for bad input, `AlreadyActive` if a run is already in
    /// Scheduled/Running/Stopping state.
    pub fn start(
        &self,
        virtual_source: String,
        pattern: SimPattern,
        duration_s: u64,
        batch_size: usize,
        seed: u64,
    ) -> Result<(), SimulationError> {
        if !self.virtual_routes.iter().any(|r| r == &virtual_source) {
            return Err(SimulationError::InvalidTarget);
        }

        {
            let mut state = self.state.lock();
            if *state != SimLifecycle::Idle {
                return Err(SimulationError::AlreadyActive);
            }
            *state = SimLifecycle::Scheduled;
        }

        let cancel = Arc::new(AtomicBool::new(false));
        *self.active.lock() = Some(ActiveRun {
            virtual_source: virtual_source.clone(),
            pattern,
            started_at: std::time::Instant::now(),
            duration: Duration::from_secs(duration_s),
            batch_size: batch_size.max(1),
            seed,
            cancel: cancel.clone(),
        });

        self.spawn_run(virtual_source, pattern, duration_s, batch_size.max(1), seed, cancel);
        Ok(())
    }

    /// Idempotent stop: fails with `NotActive` if nothing is running,
    /// leaving state unchanged (already IDLE).
    pub fn stop(&self) -> Result<(), SimulationError> {
        let mut state = self.state.lock();
        if *state == SimLifecycle::Idle {
            return Err(SimulationError::NotActive);
        }
        *state = SimLifecycle::Stopping;
        if let Some(run) = self.active.lock().as_ref() {
            run.cancel.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn spawn_run(
        &self,
        virtual_source: String,
        pattern: SimPattern,
        duration_s: u64,
        batch_size: usize,
        seed: u64,
        cancel: Arc<AtomicBool>,
    ) {
        let sink = self.sink.clone();
        let counters = self.counters.clone();
        let duration = Duration::from_secs(duration_s.max(1));
        let self_state = self.state.clone();
        let self_active = self.active.clone();

        tokio::spawn(async move {
            *self_state.lock() = SimLifecycle::Running;
            let deadline = std::time::Instant::now() + duration;
            let mut tick: u64 = 0;

            while std::time::Instant::now() < deadline && !cancel.load(Ordering::SeqCst) {
                let count = amplified_count(pattern, batch_size);
                let batch: Vec<Observation> = (0..count)
                    .into_par_iter()
                    .map(|i| {
                        let mut rng = ChaCha8Rng::seed_from_u64(seed ^ tick.wrapping_mul(0x9E3779B97F4A7C15) ^ i as u64);
                        emit_one(&virtual_source, pattern, &mut rng)
                    })
                    .collect();

                for obs in batch {
                    sink.accept(obs);
                    counters.total_emitted.fetch_add(1, Ordering::Relaxed);
                }

                tick += 1;
                tokio::time::sleep(TICK).await;
            }

            *self_state.lock() = SimLifecycle::Stopping;
            info!(source = %virtual_source, pattern = ?pattern, "simulation run finished");
            *self_active.lock() = None;
            *self_state.lock() = SimLifecycle::Idle;
        });
    }
}

/// RATE_SPIKE and ENDPOINT_FLOOD amplify emission count per tick per
/// spec §4.9; all other patterns emit exactly `batch_size`.
fn amplified_count(pattern: SimPattern, batch_size: usize) -> usize {
    match pattern {
        SimPattern::RateSpike => batch_size * 5,
        SimPattern::EndpointFlood => batch_size * 10,
        _ => batch_size,
    }
}

fn emit_one(virtual_source: &str, pattern: SimPattern, rng: &mut ChaCha8Rng) -> Observation {
    let effective_pattern = if pattern == SimPattern::Mixed {
        *[
            SimPattern::RateSpike,
            SimPattern::PayloadAbuse,
            SimPattern::ErrorBurst,
            SimPattern::ParamRepetition,
            SimPattern::EndpointFlood,
        ]
        .get(rng.gen_range(0..5))
        .unwrap()
    } else {
        pattern
    };

    let (status, latency_ms, payload_bytes, params, user_agent, method) =
        match effective_pattern {
            SimPattern::Normal => (
                if rng.gen_bool(0.85) { 200 } else { 201 },
                rng.gen_range(50.0..300.0),
                rng.gen_range(0..2000),
                vec![("q".to_string(), format!("v{}", rng.gen_range(0..1000)))],
                format!("agent-{}", rng.gen_range(0..50)),
                random_method(rng),
            ),
            SimPattern::RateSpike => (
                if rng.gen_bool(0.1) { 503 } else { 200 },
                rng.gen_range(1.0..20.0),
                rng.gen_range(0..200),
                vec![],
                "load-gen".to_string(),
                HttpMethod::Get,
            ),
            SimPattern::PayloadAbuse => (
                200,
                rng.gen_range(80.0..400.0),
                rng.gen_range(10_000..50_000),
                vec![],
                format!("agent-{}", rng.gen_range(0..50)),
                HttpMethod::Post,
            ),
            SimPattern::ErrorBurst => (
                if rng.gen_bool(0.8) { 500 } else { 200 },
                rng.gen_range(100.0..900.0),
                rng.gen_range(0..2000),
                vec![],
                format!("agent-{}", rng.gen_range(0..50)),
                HttpMethod::Post,
            ),
            SimPattern::ParamRepetition => {
                let pool = ["alpha", "bravo", "charlie"];
                let ua_pool_size = rng.gen_range(1..=3);
                (
                    200,
                    rng.gen_range(50.0..300.0),
                    rng.gen_range(0..500),
                    vec![(
                        "ref".to_string(),
                        pool[rng.gen_range(0..pool.len())].to_string(),
                    )],
                    format!("agent-{}", rng.gen_range(0..ua_pool_size)),
                    HttpMethod::Get,
                )
            }
            SimPattern::EndpointFlood => (
                200,
                rng.gen_range(10.0..100.0),
                rng.gen_range(0..300),
                vec![],
                "flood-bot".to_string(),
                HttpMethod::Get,
            ),
            SimPattern::Mixed => unreachable!("resolved to a concrete sub-pattern above"),
        };

    Observation {
        ts_monotonic_ms: 0,
        ts_wall: Utc::now(),
        source: virtual_source.to_string(),
        route: virtual_source.to_string(),
        method,
        status,
        latency_ms,
        payload_bytes,
        user_agent,
        params,
        mode: Mode::Sim,
        injected_label: Some(pattern),
    }
}

fn random_method(rng: &mut ChaCha8Rng) -> HttpMethod {
    match rng.gen_range(0..4) {
        0 => HttpMethod::Get,
        1 => HttpMethod::Post,
        2 => HttpMethod::Put,
        _ => HttpMethod::Delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingSink {
        observations: StdMutex<Vec<Observation>>,
    }

    impl ObservationSink for RecordingSink {
        fn accept(&self, obs: Observation) {
            self.observations.lock().unwrap().push(obs);
        }
    }

    fn engine() -> (SimulationEngine, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink {
            observations: StdMutex::new(Vec::new()),
        });
        let engine = SimulationEngine::new(vec!["/sim/login".to_string()], sink.clone());
        (engine, sink)
    }

    #[test]
    fn rejects_invalid_target() {
        let (engine, _sink) = engine();
        let err = engine
            .start("/sim/not-a-route".to_string(), SimPattern::Normal, 1, 10, 1)
            .unwrap_err();
        assert!(matches!(err, SimulationError::InvalidTarget));
    }

    #[test]
    fn stop_without_active_run_is_not_active() {
        let (engine, _sink) = engine();
        assert!(matches!(engine.stop(), Err(SimulationError::NotActive)));
    }

    #[test]
    fn second_start_while_active_is_rejected() {
        let (engine, _sink) = engine();
        engine
            .start("/sim/login".to_string(), SimPattern::Normal, 5, 10, 1)
            .unwrap();
        let err = engine
            .start("/sim/login".to_string(), SimPattern::Normal, 5, 10, 2)
            .unwrap_err();
        assert!(matches!(err, SimulationError::AlreadyActive));
        engine.stop().unwrap();
    }

    #[test]
    fn amplification_factors_match_spec() {
        assert_eq!(amplified_count(SimPattern::RateSpike, 100), 500);
        assert_eq!(amplified_count(SimPattern::EndpointFlood, 100), 1000);
        assert_eq!(amplified_count(SimPattern::Normal, 100), 100);
    }

    #[test]
    fn emitted_observations_are_always_sim_mode_and_labeled() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let obs = emit_one("/sim/login", SimPattern::ErrorBurst, &mut rng);
        assert_eq!(obs.mode, Mode::Sim);
        assert_eq!(obs.injected_label, Some(SimPattern::ErrorBurst));
    }
}
