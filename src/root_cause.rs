//! Root-Cause Classifier (C7, spec §4.7).
//!
//! Pure function over a feature vector plus model scores. Grounded on
//! the teacher's `route_quality::baseline` style of evaluating an
//! ordered list of named conditions over precomputed stats.

use std::collections::HashSet;

use crate::models::{ContributingCondition, FeatureVector, ModelScores, RootCause};

pub struct Classification {
    pub root_cause: RootCause,
    pub contributing_conditions: HashSet<ContributingCondition>,
    pub confidence: f64,
}

const TRAFFIC_SURGE_BASELINE: f64 = 5.0;

pub fn classify(features: &FeatureVector, model_scores: &ModelScores) -> Classification {
    let latency_bottleneck = features.avg_response_time > 800.0 && features.error_rate < 0.3;
    let backend_instability = features.error_rate >= 0.3;
    let traffic_surge = features.request_rate >= 2.0 * TRAFFIC_SURGE_BASELINE;
    let abuse_or_bot = features.repeated_parameter_ratio > 0.7 || model_scores.cluster_id == 2;

    let mut conditions = HashSet::new();
    if latency_bottleneck {
        conditions.insert(ContributingCondition::LatencyBottleneck);
    }
    if backend_instability {
        conditions.insert(ContributingCondition::BackendInstability);
    }
    if traffic_surge {
        conditions.insert(ContributingCondition::TrafficSurge);
    }
    if abuse_or_bot {
        conditions.insert(ContributingCondition::AbuseOrBot);
    }

    let count = conditions.len();

    let root_cause = if count == 0 {
        RootCause::None
    } else if count >= 2 {
        RootCause::SystemOverload
    } else if latency_bottleneck {
        RootCause::LatencyBottleneck
    } else if backend_instability {
        RootCause::BackendInstability
    } else if traffic_surge {
        RootCause::TrafficSurge
    } else {
        RootCause::AbuseOrBot
    };

    let confidence = match count {
        0 => 0.0,
        1 => single_condition_confidence(&root_cause),
        2 => 0.90,
        _ => 0.95,
    };

    Classification {
        root_cause,
        contributing_conditions: conditions,
        confidence,
    }
}

/// Single-condition confidence sits in the published 0.88-0.92 band;
/// picked per root cause so repeated runs are byte-identical (P7).
fn single_condition_confidence(root_cause: &RootCause) -> f64 {
    match root_cause {
        RootCause::LatencyBottleneck => 0.88,
        RootCause::BackendInstability => 0.92,
        RootCause::TrafficSurge => 0.90,
        RootCause::AbuseOrBot => 0.89,
        _ => 0.90,
    }
}
