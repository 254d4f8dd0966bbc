//! Online detector for API misuse and impending failure.
//!
//! Data flow: Observation -> C1 Filter -> C2 Window Aggregator -> (on
//! seal) C3 Feature Extractor -> {C4 Model Holder, C5 Rule Engine} ->
//! C6 Hybrid Scorer -> C7 Root-Cause Classifier -> C8 Resolution
//! Generator -> Detection -> C10 History (sim only) -> C11 Persistence
//! -> C12 Event Bus. C9 Simulation Engine and C13 Detector Orchestrator
//! own lifecycle and isolation between LIVE and SIM traffic; C14
//! Control API and C15 Observability are the ambient surface.

pub mod api;
pub mod bus;
pub mod config;
pub mod error;
pub mod features;
pub mod filter;
pub mod history;
pub mod metrics;
pub mod middleware;
pub mod model_holder;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod resolutions;
pub mod root_cause;
pub mod rules;
pub mod scorer;
pub mod simulation;
pub mod window;

pub use config::DetectorConfig;
pub use orchestrator::Orchestrator;
