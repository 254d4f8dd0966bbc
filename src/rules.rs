//! Rule Engine (C5, spec §4.5).
//!
//! Deterministic, order-independent threshold checks over a
//! `FeatureVector`. Grounded on the teacher's `SignalDetector`
//! threshold-driven `Option<Signal>`-per-check style, assembled here in
//! one pass into a `RuleAlertSet`.

use crate::config::RuleThresholds;
use crate::models::{FeatureVector, RuleAlert, RuleAlertSet};

pub fn evaluate(features: &FeatureVector, thresholds: &RuleThresholds) -> RuleAlertSet {
    let mut alerts = std::collections::HashSet::new();

    if features.request_rate > thresholds.rate_spike_rps {
        alerts.insert(RuleAlert::RateSpike);
    }
    if features.error_rate > thresholds.error_burst_ratio {
        alerts.insert(RuleAlert::ErrorBurst);
    }
    if features.user_agent_entropy < thresholds.bot_entropy_max
        && features.repeated_parameter_ratio > thresholds.bot_repeated_param_min
    {
        alerts.insert(RuleAlert::BotPattern);
    }
    if features.avg_payload_size > thresholds.large_payload_bytes {
        alerts.insert(RuleAlert::LargePayload);
    }
    if features.unique_endpoints > thresholds.endpoint_scan_unique {
        alerts.insert(RuleAlert::EndpointScan);
    }

    let rule_score = (0.2 * alerts.len() as f64).min(1.0);

    RuleAlertSet { alerts, rule_score }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(overrides: impl Fn(&mut FeatureVector)) -> FeatureVector {
        let mut f = FeatureVector {
            request_rate: 1.0,
            unique_endpoints: 1.0,
            method_ratio: 1.0,
            avg_payload_size: 10.0,
            error_rate: 0.0,
            repeated_parameter_ratio: 0.0,
            user_agent_entropy: 5.0,
            avg_response_time: 10.0,
            max_response_time: 10.0,
        };
        overrides(&mut f);
        f
    }

    #[test]
    fn no_alerts_on_quiet_window() {
        let thresholds = RuleThresholds::default();
        let result = evaluate(&feature(|_| {}), &thresholds);
        assert!(result.alerts.is_empty());
        assert_eq!(result.rule_score, 0.0);
    }

    #[test]
    fn rate_spike_fires_above_threshold() {
        let thresholds = RuleThresholds::default();
        let f = feature(|f| f.request_rate = 16.0);
        let result = evaluate(&f, &thresholds);
        assert!(result.alerts.contains(&RuleAlert::RateSpike));
        assert_eq!(result.rule_score, 0.2);
    }

    #[test]
    fn bot_pattern_requires_both_conditions() {
        let thresholds = RuleThresholds::default();
        let only_entropy = feature(|f| f.user_agent_entropy = 0.1);
        assert!(!evaluate(&only_entropy, &thresholds)
            .alerts
            .contains(&RuleAlert::BotPattern));

        let both = feature(|f| {
            f.user_agent_entropy = 0.1;
            f.repeated_parameter_ratio = 0.9;
        });
        assert!(evaluate(&both, &thresholds)
            .alerts
            .contains(&RuleAlert::BotPattern));
    }

    #[test]
    fn rule_score_caps_at_one() {
        let thresholds = RuleThresholds::default();
        let f = feature(|f| {
            f.request_rate = 100.0;
            f.error_rate = 0.9;
            f.user_agent_entropy = 0.0;
            f.repeated_parameter_ratio = 1.0;
            f.avg_payload_size = 10_000.0;
            f.unique_endpoints = 20.0;
        });
        let result = evaluate(&f, &thresholds);
        assert_eq!(result.alerts.len(), 5);
        assert_eq!(result.rule_score, 1.0);
    }
}
