//! Error taxonomy (spec §7): narrow `thiserror` enums at each component
//! boundary, `anyhow::Error` only at the binary/HTTP-boundary layer
//! where arbitrary context is acceptable.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Input-class errors from the Simulation Engine control operation
/// (spec §4.9). Surfaced as 4xx; never affects other in-flight work.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("invalid virtual source")]
    InvalidTarget,
    #[error("invalid pattern")]
    InvalidPattern,
    #[error("simulation already active")]
    AlreadyActive,
    #[error("simulation not active")]
    NotActive,
}

impl SimulationError {
    fn kind(&self) -> &'static str {
        match self {
            SimulationError::InvalidTarget => "InvalidTarget",
            SimulationError::InvalidPattern => "InvalidPattern",
            SimulationError::AlreadyActive => "AlreadyActive",
            SimulationError::NotActive => "NotActive",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            SimulationError::InvalidTarget | SimulationError::InvalidPattern => {
                StatusCode::BAD_REQUEST
            }
            SimulationError::AlreadyActive | SimulationError::NotActive => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for SimulationError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(json!({ "error": self.kind() }))).into_response()
    }
}

/// Configuration-class errors: a model/scaler artifact missing or
/// rejected at load time. Per-artifact issues degrade that one
/// submodel to `Unavailable` (spec §4.4) rather than aborting startup;
/// this type exists to carry the reason into a structured log line.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact file not found: {0}")]
    NotFound(String),
    #[error("artifact failed to parse: {0}")]
    Malformed(String),
    #[error("artifact version/shape mismatch: expected feature_len={expected}, got {got}")]
    ShapeMismatch { expected: usize, got: usize },
}

/// Transient-I/O errors from the Persistence Gateway (spec §4.11).
/// Logged and counted; never propagated to producers.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A window was sealed with a count other than `WINDOW_SIZE`. This is
/// the *Logic* error class (spec §7): an internally unreachable state.
/// It aborts the scoring task for that one window with a structured
/// log entry; it does not poison the process.
#[derive(Debug, thiserror::Error)]
#[error("window {window_id} for {source} sealed with {actual} observations, expected {expected}")]
pub struct MalformedWindowError {
    pub window_id: u64,
    pub source: String,
    pub actual: usize,
    pub expected: usize,
}
