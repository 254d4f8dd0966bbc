//! Control API handlers (spec §6 Control API table).

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

use crate::models::{Detection, EmergencyEntry, Mode, SimPattern};
use crate::orchestrator::Orchestrator;

pub async fn health() -> &'static str {
    "ok"
}

pub async fn live_stats(State(orchestrator): State<Arc<Orchestrator>>) -> impl IntoResponse {
    Json(orchestrator.live_stats())
}

pub async fn sim_stats(State(orchestrator): State<Arc<Orchestrator>>) -> impl IntoResponse {
    Json(orchestrator.sim_stats())
}

#[derive(Debug, Deserialize)]
pub struct SimStartQuery {
    pub virtual_source: String,
    pub pattern: String,
    pub duration_s: u64,
    pub batch_size: usize,
    pub seed: Option<u64>,
}

/// Parses the `pattern` query value by hand so an unrecognized string
/// fails with the spec-mandated `SimulationError::InvalidPattern`
/// rather than axum's generic `Query` extraction-failure body (which
/// `SimPattern: Deserialize` would otherwise produce).
fn parse_sim_pattern(raw: &str) -> Result<SimPattern, crate::error::SimulationError> {
    match raw {
        "NORMAL" => Ok(SimPattern::Normal),
        "RATE_SPIKE" => Ok(SimPattern::RateSpike),
        "PAYLOAD_ABUSE" => Ok(SimPattern::PayloadAbuse),
        "ERROR_BURST" => Ok(SimPattern::ErrorBurst),
        "PARAM_REPETITION" => Ok(SimPattern::ParamRepetition),
        "ENDPOINT_FLOOD" => Ok(SimPattern::EndpointFlood),
        "MIXED" => Ok(SimPattern::Mixed),
        _ => Err(crate::error::SimulationError::InvalidPattern),
    }
}

#[derive(Debug, Serialize)]
pub struct SimStartResponse {
    pub status: &'static str,
    pub virtual_source: String,
    pub pattern: SimPattern,
    pub duration_s: u64,
}

/// POST /sim/start — spec §6. Errors map through `SimulationError`'s
/// `IntoResponse` impl to the exact 400/409 bodies.
pub async fn sim_start(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(q): Query<SimStartQuery>,
) -> Result<Json<SimStartResponse>, crate::error::SimulationError> {
    let pattern = parse_sim_pattern(&q.pattern)?;
    let seed = q.seed.unwrap_or_else(|| chrono::Utc::now().timestamp_millis().max(0) as u64);
    orchestrator.start_simulation(
        q.virtual_source.clone(),
        pattern,
        q.duration_s,
        q.batch_size,
        seed,
    )?;
    Ok(Json(SimStartResponse {
        status: "started",
        virtual_source: q.virtual_source,
        pattern,
        duration_s: q.duration_s,
    }))
}

#[derive(Debug, Serialize)]
pub struct SimStopResponse {
    pub status: &'static str,
    pub final_stats: crate::orchestrator::SimStats,
}

pub async fn sim_stop(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> Result<Json<SimStopResponse>, crate::error::SimulationError> {
    orchestrator.stop_simulation()?;
    Ok(Json(SimStopResponse {
        status: "stopped",
        final_stats: orchestrator.sim_stats(),
    }))
}

/// POST /sim/clear — spec §6: clears ring + counters, fails if active.
pub async fn sim_clear(State(orchestrator): State<Arc<Orchestrator>>) -> impl IntoResponse {
    use crate::simulation::SimLifecycle;
    match orchestrator.simulation_lifecycle() {
        SimLifecycle::Idle | SimLifecycle::Scheduled => {
            orchestrator.clear_simulation_history();
            StatusCode::OK.into_response()
        }
        SimLifecycle::Running | SimLifecycle::Stopping => {
            crate::error::SimulationError::AlreadyActive.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DetectionsQuery {
    pub mode: Mode,
    #[serde(default = "default_detections_limit")]
    pub limit: usize,
}

fn default_detections_limit() -> usize {
    100
}

pub async fn list_detections(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(q): Query<DetectionsQuery>,
) -> impl IntoResponse {
    let limit = q.limit.min(1000);
    let detections: Vec<Detection> = orchestrator.detections(q.mode, limit);
    Json(detections)
}

#[derive(Debug, Deserialize)]
pub struct EmergenciesQuery {
    #[serde(default = "default_emergencies_limit")]
    pub limit: usize,
}

fn default_emergencies_limit() -> usize {
    50
}

pub async fn top_emergencies(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(q): Query<EmergenciesQuery>,
) -> impl IntoResponse {
    let entries: Vec<EmergencyEntry> = orchestrator.top_emergencies(q.limit);
    Json(entries)
}
