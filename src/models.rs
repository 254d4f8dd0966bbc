//! Core data model (spec §3): Observation, Window, FeatureVector, rule
//! alerts, model scores, Detection, and the simulation-only emergency
//! ranking entry.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// LIVE is real production traffic; SIM is synthetic traffic from the
/// simulation engine. Every observation, window, and detection is
/// tagged with exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    Live,
    Sim,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Live => "LIVE",
            Mode::Sim => "SIM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
    Other,
}

impl HttpMethod {
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "PATCH" => HttpMethod::Patch,
            "DELETE" => HttpMethod::Delete,
            "OPTIONS" => HttpMethod::Options,
            "HEAD" => HttpMethod::Head,
            _ => HttpMethod::Other,
        }
    }
}

/// A single observed HTTP request, as reported by instrumentation
/// (`mode = Live`) or by the simulation engine (`mode = Sim`).
/// Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub ts_monotonic_ms: u64,
    pub ts_wall: DateTime<Utc>,
    pub source: String,
    pub route: String,
    pub method: HttpMethod,
    pub status: u16,
    pub latency_ms: f64,
    pub payload_bytes: u64,
    pub user_agent: String,
    /// Request parameter (name, value) pairs. Raw strings are retained
    /// only up to feature extraction (spec §9 "dynamic typing" note) —
    /// nothing downstream of C3 holds onto them.
    pub params: Vec<(String, String)>,
    pub mode: Mode,
    /// Ground truth pattern label, present only for `mode = Sim`
    /// observations.
    pub injected_label: Option<SimPattern>,
}

/// A sealed, fixed-size (N = `WINDOW_SIZE`) sequence of observations
/// for one (mode, source) pair.
#[derive(Debug, Clone)]
pub struct Window {
    pub window_id: u64,
    pub mode: Mode,
    pub source: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub observations: Vec<Observation>,
}

/// The nine-dimensional feature vector computed from one sealed window
/// (spec §3 FeatureVector). Field order is the model input order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub request_rate: f64,
    pub unique_endpoints: f64,
    pub method_ratio: f64,
    pub avg_payload_size: f64,
    pub error_rate: f64,
    pub repeated_parameter_ratio: f64,
    pub user_agent_entropy: f64,
    pub avg_response_time: f64,
    pub max_response_time: f64,
}

impl FeatureVector {
    pub const LEN: usize = 9;

    pub fn as_array(&self) -> [f64; Self::LEN] {
        [
            self.request_rate,
            self.unique_endpoints,
            self.method_ratio,
            self.avg_payload_size,
            self.error_rate,
            self.repeated_parameter_ratio,
            self.user_agent_entropy,
            self.avg_response_time,
            self.max_response_time,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleAlert {
    RateSpike,
    ErrorBurst,
    BotPattern,
    LargePayload,
    EndpointScan,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleAlertSet {
    pub alerts: HashSet<RuleAlert>,
    pub rule_score: f64,
}

/// Whether a submodel contributed a real score or was degraded. Spec
/// §4.4/§9: exceptions-for-control-flow in model loading become an
/// explicit `ModelHandle` state rather than a thrown error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SubmodelStatus {
    Ready,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelScores {
    pub anomaly_score: f64,
    pub anomaly_status: SubmodelStatus,
    pub failure_probability: f64,
    pub failure_status: SubmodelStatus,
    pub cluster_id: u8,
    pub cluster_distance: f64,
    pub cluster_status: SubmodelStatus,
    pub next_window_failure_probability: f64,
    pub next_window_status: SubmodelStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RootCause {
    LatencyBottleneck,
    BackendInstability,
    TrafficSurge,
    AbuseOrBot,
    SystemOverload,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContributingCondition {
    LatencyBottleneck,
    BackendInstability,
    TrafficSurge,
    AbuseOrBot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionCategory {
    Caching,
    AsyncIo,
    Database,
    Concurrency,
    Debugging,
    Resilience,
    Deployment,
    Isolation,
    RateLimiting,
    Autoscaling,
    EdgeCaching,
    Security,
    Authentication,
    Scaling,
    Backpressure,
    Degradation,
    PayloadHandling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub category: ResolutionCategory,
    pub action: String,
    pub detail: String,
    pub priority: Priority,
}

/// The seven traffic patterns the simulation engine can emit (spec
/// §4.9). NORMAL doubles as the simulation-only ground-truth label
/// meaning "no injected anomaly".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimPattern {
    Normal,
    RateSpike,
    PayloadAbuse,
    ErrorBurst,
    ParamRepetition,
    EndpointFlood,
    Mixed,
}

/// The headline record (spec §3 Detection): produced once per sealed
/// window, immutable, persisted, and broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub mode: Mode,
    pub source: String,
    pub window_id: u64,
    pub features: FeatureVector,
    pub rule_alerts: RuleAlertSet,
    pub model_scores: ModelScores,
    pub risk_score: f64,
    pub priority: Priority,
    pub is_anomaly: bool,
    pub root_cause: RootCause,
    pub contributing_conditions: HashSet<ContributingCondition>,
    pub resolutions: Vec<Resolution>,
    pub detection_latency_ms: f64,
    /// Simulation-only fields; `None` for LIVE detections.
    pub injected_label: Option<SimPattern>,
    pub emergency_rank: Option<u32>,
    pub is_correctly_detected: Option<bool>,
}

/// A position in the simulation journal's risk-ordered ranking (spec
/// §3 EmergencyRanking). `rank` is 1-based, 1 = highest risk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyEntry {
    pub rank: u32,
    pub detection: Detection,
}

/// Simulation accuracy counters (spec §4.10), derived from detected vs.
/// injected comparison.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AccuracyStats {
    pub total: u64,
    pub correct: u64,
    pub fp: u64,
    pub fn_: u64,
}

impl AccuracyStats {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

pub type ParamBag = HashMap<String, String>;
