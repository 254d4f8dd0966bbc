//! Feature Extractor (C3, spec §4.3).
//!
//! Pure function: sealed `Window` in, `FeatureVector` out. Grounded on
//! the teacher's `signals::quality::RollingStats` accumulation style,
//! collapsed from incremental (Welford) updates to a one-shot pass
//! since a window is already complete when this runs.

use std::collections::HashMap;

use crate::models::{FeatureVector, HttpMethod, Window};

/// Computes the nine-dimensional feature vector for a sealed window.
///
/// Edge cases (spec §4.3 B2): a window of ten identical observations
/// yields `unique_endpoints = 1.0` and `user_agent_entropy = 0.0` (a
/// single-symbol distribution has zero Shannon entropy) rather than a
/// division-by-zero or NaN.
pub fn extract(window: &Window) -> FeatureVector {
    let n = window.observations.len().max(1) as f64;

    let span_secs = (window.closed_at - window.opened_at)
        .num_milliseconds()
        .max(1) as f64
        / 1000.0;
    let request_rate = window.observations.len() as f64 / span_secs;

    let mut endpoint_counts: HashMap<&str, u32> = HashMap::new();
    let mut get_count = 0u32;
    let mut error_count = 0u32;
    let mut payload_sum = 0f64;
    let mut param_counts: HashMap<(&str, &str), u32> = HashMap::new();
    let mut param_total = 0u32;
    let mut ua_counts: HashMap<&str, u32> = HashMap::new();
    let mut latency_sum = 0f64;
    let mut latency_max = 0f64;

    for obs in &window.observations {
        *endpoint_counts.entry(obs.route.as_str()).or_insert(0) += 1;
        if obs.method == HttpMethod::Get {
            get_count += 1;
        }
        if obs.status >= 400 {
            error_count += 1;
        }
        payload_sum += obs.payload_bytes as f64;
        for (k, v) in &obs.params {
            *param_counts.entry((k.as_str(), v.as_str())).or_insert(0) += 1;
            param_total += 1;
        }
        *ua_counts.entry(obs.user_agent.as_str()).or_insert(0) += 1;
        latency_sum += obs.latency_ms;
        if obs.latency_ms > latency_max {
            latency_max = obs.latency_ms;
        }
    }

    let unique_endpoints = endpoint_counts.len() as f64;
    let method_ratio = get_count as f64 / n;
    let avg_payload_size = payload_sum / n;
    let error_rate = error_count as f64 / n;

    let repeated_parameter_ratio = if param_total == 0 {
        0.0
    } else {
        let repeated: u32 = param_counts.values().filter(|&&c| c > 1).sum();
        repeated as f64 / param_total as f64
    };

    let user_agent_entropy = shannon_entropy(ua_counts.values().copied(), n as u64);

    let avg_response_time = latency_sum / n;
    let max_response_time = latency_max;

    FeatureVector {
        request_rate,
        unique_endpoints,
        method_ratio,
        avg_payload_size,
        error_rate,
        repeated_parameter_ratio,
        user_agent_entropy,
        avg_response_time,
        max_response_time,
    }
}

/// Shannon entropy in bits, over a frequency distribution of `total`
/// items. A single distinct symbol (all mass on one bucket) yields 0.0
/// rather than `-0.0` or NaN.
fn shannon_entropy(counts: impl Iterator<Item = u32>, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    let mut h = 0.0;
    for c in counts {
        if c == 0 {
            continue;
        }
        let p = c as f64 / total;
        h -= p * p.log2();
    }
    if h.abs() < f64::EPSILON {
        0.0
    } else {
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Mode, Observation};
    use chrono::{Duration, Utc};

    fn make_window(obs_builder: impl Fn(usize) -> Observation, count: usize) -> Window {
        let opened_at = Utc::now();
        let observations: Vec<Observation> = (0..count).map(obs_builder).collect();
        Window {
            window_id: 1,
            mode: Mode::Live,
            source: "test".to_string(),
            opened_at,
            closed_at: opened_at + Duration::seconds(1),
            observations,
        }
    }

    #[test]
    fn identical_observations_give_neutral_entropy_and_unique_endpoints() {
        let window = make_window(
            |_| Observation {
                ts_monotonic_ms: 0,
                ts_wall: Utc::now(),
                source: "test".to_string(),
                route: "/login".to_string(),
                method: HttpMethod::Post,
                status: 200,
                latency_ms: 12.0,
                payload_bytes: 100,
                user_agent: "same-ua".to_string(),
                params: vec![],
                mode: Mode::Live,
                injected_label: None,
            },
            10,
        );

        let f = extract(&window);
        assert_eq!(f.unique_endpoints, 1.0);
        assert_eq!(f.user_agent_entropy, 0.0);
        assert_eq!(f.error_rate, 0.0);
        assert_eq!(f.avg_response_time, 12.0);
        assert_eq!(f.max_response_time, 12.0);
    }

    #[test]
    fn distinct_user_agents_give_positive_entropy() {
        let window = make_window(
            |i| Observation {
                ts_monotonic_ms: 0,
                ts_wall: Utc::now(),
                source: "test".to_string(),
                route: "/search".to_string(),
                method: HttpMethod::Get,
                status: if i % 2 == 0 { 200 } else { 500 },
                latency_ms: 10.0 + i as f64,
                payload_bytes: 50,
                user_agent: format!("ua-{i}"),
                params: vec![],
                mode: Mode::Live,
                injected_label: None,
            },
            10,
        );

        let f = extract(&window);
        assert!(f.user_agent_entropy > 3.0);
        assert_eq!(f.error_rate, 0.5);
        assert_eq!(f.method_ratio, 1.0);
    }

    #[test]
    fn repeated_parameters_are_tracked() {
        let window = make_window(
            |i| Observation {
                ts_monotonic_ms: 0,
                ts_wall: Utc::now(),
                source: "test".to_string(),
                route: "/payment".to_string(),
                method: HttpMethod::Post,
                status: 200,
                latency_ms: 5.0,
                payload_bytes: 10,
                user_agent: "ua".to_string(),
                params: vec![("id".to_string(), if i < 5 { "x".to_string() } else { "y".to_string() })],
                mode: Mode::Live,
                injected_label: None,
            },
            10,
        );

        let f = extract(&window);
        assert_eq!(f.repeated_parameter_ratio, 1.0);
    }
}
