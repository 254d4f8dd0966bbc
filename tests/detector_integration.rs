//! End-to-end orchestrator tests (spec §8 concrete scenarios 1 and 4),
//! driven directly against `Orchestrator` the way the teacher's
//! `tests/` directory exercises `backtest_v2` — no HTTP layer, just
//! `tokio::test` pushing observations and reading the bus/stats back.

use std::sync::Arc;
use std::time::Duration;

use apisentinel::models::{HttpMethod, Mode, Observation, Priority, SimPattern};
use apisentinel::persistence::PersistenceGateway;
use apisentinel::{DetectorConfig, Orchestrator};
use chrono::Utc;

fn test_config(db_path: &str) -> DetectorConfig {
    let mut config = DetectorConfig::default();
    config.database_path = db_path.to_string();
    config.model_artifact_dir = "/nonexistent/for/tests".to_string();
    config
}

/// `seq` spaces consecutive observations 150ms apart so a 10-observation
/// window spans long enough (~1.35s) to stay under the default
/// RATE_SPIKE threshold of 15 rps — a tight loop pushing all 10 within
/// the same millisecond would otherwise read as a massive request rate.
fn normal_observation(route: &str, seq: i64) -> Observation {
    Observation {
        ts_monotonic_ms: 0,
        ts_wall: Utc::now() + chrono::Duration::milliseconds(150 * seq),
        source: route.to_string(),
        route: route.to_string(),
        method: HttpMethod::Get,
        status: 200,
        latency_ms: 20.0,
        payload_bytes: 128,
        user_agent: "integration-test".to_string(),
        params: vec![],
        mode: Mode::Sim,
        injected_label: Some(SimPattern::Normal),
    }
}

fn live_observation(route: &str) -> Observation {
    Observation {
        ts_monotonic_ms: 0,
        ts_wall: Utc::now(),
        source: route.to_string(),
        route: route.to_string(),
        method: HttpMethod::Post,
        status: 200,
        latency_ms: 20.0,
        payload_bytes: 128,
        user_agent: "integration-test".to_string(),
        params: vec![],
        mode: Mode::Live,
        injected_label: None,
    }
}

async fn build_orchestrator(db_path: &std::path::Path) -> Arc<Orchestrator> {
    let config = test_config(db_path.to_str().unwrap());
    let persistence = Arc::new(PersistenceGateway::open(db_path.to_str().unwrap(), 256).unwrap());
    Orchestrator::new(config, persistence)
}

/// Scenario 1 — Pure NORMAL: 30 NORMAL observations into SIM
/// `/sim/profile` (window size 10) produce exactly 3 Detections, none
/// anomalous, no rule alerts, LOW priority, and perfect accuracy.
#[tokio::test]
async fn pure_normal_scenario_yields_three_correct_low_priority_detections() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = build_orchestrator(&dir.path().join("normal.db")).await;

    let mut sub = orchestrator.bus().subscribe();
    for i in 0..30 {
        orchestrator.observe(normal_observation("/sim/profile", i));
    }

    let mut detections = Vec::new();
    for _ in 0..3 {
        let detection = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("detection within timeout")
            .expect("bus still open");
        detections.push(detection);
    }

    assert_eq!(detections.len(), 3);
    for d in &detections {
        assert!(!d.is_anomaly);
        assert!(d.rule_alerts.alerts.is_empty());
        assert_eq!(d.priority, Priority::Low);
        assert_eq!(d.is_correctly_detected, Some(true));
    }

    let stats = orchestrator.sim_stats();
    assert_eq!(stats.accuracy.total, 3);
    assert_eq!(stats.accuracy.correct, 3);
    assert_eq!(stats.accuracy.fp, 0);
    assert_eq!(stats.accuracy.fn_, 0);
}

/// Scenario 4 — Isolation: SIM activity never moves LIVE counters;
/// a single tracked LIVE call afterward moves the LIVE counter to
/// exactly 1.
#[tokio::test]
async fn sim_activity_never_touches_live_counters() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = build_orchestrator(&dir.path().join("isolation.db")).await;

    for i in 0..30 {
        orchestrator.observe(normal_observation("/sim/profile", i));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let live_before = orchestrator.live_stats();
    assert_eq!(live_before.total_requests, 0);
    assert_eq!(live_before.status, "idle");

    orchestrator.observe(live_observation("/login"));

    let live_after = orchestrator.live_stats();
    assert_eq!(live_after.total_requests, 1);
}
