//! Detector configuration (spec §6 environment/configuration list),
//! loaded the way the teacher's `Config::from_env` loads — `dotenv`
//! then typed `std::env::var` fallbacks.

use std::time::Duration;

/// Calibrated rule thresholds (spec §4.5). All tunable.
#[derive(Debug, Clone, Copy)]
pub struct RuleThresholds {
    pub rate_spike_rps: f64,
    pub error_burst_ratio: f64,
    pub bot_entropy_max: f64,
    pub bot_repeated_param_min: f64,
    pub large_payload_bytes: f64,
    pub endpoint_scan_unique: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            rate_spike_rps: 15.0,
            error_burst_ratio: 0.5,
            bot_entropy_max: 0.5,
            bot_repeated_param_min: 0.5,
            large_payload_bytes: 5000.0,
            endpoint_scan_unique: 8.0,
        }
    }
}

/// Hybrid scorer weights (spec §4.6). Fixed to the single canonical
/// scheme spec.md §9 settles on; a future recalibration is a config
/// change here, not a code change (see DESIGN.md Open Questions).
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub rule: f64,
    pub anomaly: f64,
    pub failure: f64,
    pub next_failure: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            rule: 0.30,
            anomaly: 0.25,
            failure: 0.30,
            next_failure: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PriorityBands {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for PriorityBands {
    fn default() -> Self {
        Self {
            critical: 0.75,
            high: 0.55,
            medium: 0.35,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub bind_addr: String,
    pub database_path: String,
    pub window_size: usize,
    pub rule_thresholds: RuleThresholds,
    pub score_weights: ScoreWeights,
    pub priority_bands: PriorityBands,
    pub live_tracked_routes: Vec<String>,
    pub sim_virtual_routes: Vec<String>,
    pub history_capacity: usize,
    pub subscriber_queue_depth: usize,
    pub scoring_deadline: Duration,
    pub model_artifact_dir: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_path: "./sentinel.db".to_string(),
            window_size: 10,
            rule_thresholds: RuleThresholds::default(),
            score_weights: ScoreWeights::default(),
            priority_bands: PriorityBands::default(),
            live_tracked_routes: vec![
                "/login".to_string(),
                "/signup".to_string(),
                "/search".to_string(),
                "/profile".to_string(),
                "/payment".to_string(),
                "/logout".to_string(),
            ],
            sim_virtual_routes: vec![
                "/sim/login".to_string(),
                "/sim/search".to_string(),
                "/sim/profile".to_string(),
                "/sim/payment".to_string(),
                "/sim/signup".to_string(),
            ],
            history_capacity: 1000,
            subscriber_queue_depth: 256,
            scoring_deadline: Duration::from_millis(500),
            model_artifact_dir: "./models".to_string(),
        }
    }
}

impl DetectorConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let mut config = Self::default();

        if let Ok(v) = std::env::var("BIND_ADDR") {
            config.bind_addr = v;
        }
        if let Ok(v) = std::env::var("DATABASE_PATH") {
            config.database_path = v;
        }
        if let Some(v) = parse_env("WINDOW_SIZE") {
            config.window_size = v;
        }
        if let Some(v) = parse_env("HISTORY_CAPACITY") {
            config.history_capacity = v;
        }
        if let Some(v) = parse_env("SUBSCRIBER_QUEUE_DEPTH") {
            config.subscriber_queue_depth = v;
        }
        if let Some(ms) = parse_env::<u64>("SCORING_DEADLINE_MS") {
            config.scoring_deadline = Duration::from_millis(ms);
        }
        if let Ok(v) = std::env::var("MODEL_ARTIFACT_DIR") {
            config.model_artifact_dir = v;
        }
        if let Ok(v) = std::env::var("LIVE_TRACKED_ROUTES") {
            config.live_tracked_routes = split_csv(&v);
        }
        if let Ok(v) = std::env::var("SIM_VIRTUAL_ROUTES") {
            config.sim_virtual_routes = split_csv(&v);
        }

        config
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',').map(|p| p.trim().to_string()).collect()
}
