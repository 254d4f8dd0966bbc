//! Resolution Generator (C8, spec §4.8).
//!
//! Fixed deterministic `(root_cause, priority) → Vec<Resolution>`
//! lookup. Grounded on the teacher's `route_quality::mitigation`
//! categorized-action-enum-with-fixed-catalogue style.

use crate::models::{Priority, Resolution, ResolutionCategory, RootCause};

fn latency_bottleneck_catalogue() -> Vec<Resolution> {
    vec![
        Resolution {
            category: ResolutionCategory::Caching,
            action: "Add read-through cache".to_string(),
            detail: "Front the slow dependency with a read-through cache to cut tail latency."
                .to_string(),
            priority: Priority::High,
        },
        Resolution {
            category: ResolutionCategory::AsyncIo,
            action: "Enable async I/O".to_string(),
            detail: "Move blocking calls off the request path onto an async executor."
                .to_string(),
            priority: Priority::High,
        },
        Resolution {
            category: ResolutionCategory::Database,
            action: "Tune DB indexes".to_string(),
            detail: "Review query plans for the slow routes and add missing indexes."
                .to_string(),
            priority: Priority::Medium,
        },
        Resolution {
            category: ResolutionCategory::Concurrency,
            action: "Raise worker concurrency".to_string(),
            detail: "Increase the worker pool size so queued requests drain faster.".to_string(),
            priority: Priority::Medium,
        },
    ]
}

fn backend_instability_catalogue() -> Vec<Resolution> {
    vec![
        Resolution {
            category: ResolutionCategory::Debugging,
            action: "Inspect traces".to_string(),
            detail: "Pull distributed traces for the failing window to locate the faulty hop."
                .to_string(),
            priority: Priority::Critical,
        },
        Resolution {
            category: ResolutionCategory::Resilience,
            action: "Enable circuit breaker".to_string(),
            detail: "Trip a circuit breaker around the unstable dependency to stop cascading failures."
                .to_string(),
            priority: Priority::High,
        },
        Resolution {
            category: ResolutionCategory::Deployment,
            action: "Rollback last deploy".to_string(),
            detail: "If instability began at a deploy boundary, roll back to the prior release."
                .to_string(),
            priority: Priority::High,
        },
        Resolution {
            category: ResolutionCategory::Isolation,
            action: "Isolate failing dependency".to_string(),
            detail: "Bulkhead the failing dependency so it cannot exhaust shared resources."
                .to_string(),
            priority: Priority::Medium,
        },
    ]
}

fn traffic_surge_catalogue() -> Vec<Resolution> {
    vec![
        Resolution {
            category: ResolutionCategory::RateLimiting,
            action: "Token-bucket rate limit".to_string(),
            detail: "Apply a token-bucket limiter at the edge of the surging route.".to_string(),
            priority: Priority::Critical,
        },
        Resolution {
            category: ResolutionCategory::Autoscaling,
            action: "Autoscale".to_string(),
            detail: "Scale the handling tier out to absorb the increased request volume."
                .to_string(),
            priority: Priority::High,
        },
        Resolution {
            category: ResolutionCategory::Caching,
            action: "Cache idempotent responses".to_string(),
            detail: "Cache responses for idempotent requests to shed repeat load.".to_string(),
            priority: Priority::Medium,
        },
        Resolution {
            category: ResolutionCategory::EdgeCaching,
            action: "Enable edge caching".to_string(),
            detail: "Push cacheable content to the edge to keep surge traffic off origin."
                .to_string(),
            priority: Priority::Medium,
        },
    ]
}

fn abuse_or_bot_catalogue() -> Vec<Resolution> {
    vec![
        Resolution {
            category: ResolutionCategory::RateLimiting,
            action: "Adaptive rate limits".to_string(),
            detail: "Tighten rate limits dynamically for sources matching the abuse pattern."
                .to_string(),
            priority: Priority::Critical,
        },
        Resolution {
            category: ResolutionCategory::Security,
            action: "IP reputation filter".to_string(),
            detail: "Check the source against an IP reputation list and challenge or block."
                .to_string(),
            priority: Priority::High,
        },
        Resolution {
            category: ResolutionCategory::Authentication,
            action: "Auth throttling + challenge".to_string(),
            detail: "Throttle authentication attempts and interpose a human-verification challenge."
                .to_string(),
            priority: Priority::High,
        },
        Resolution {
            category: ResolutionCategory::Security,
            action: "WAF rules".to_string(),
            detail: "Add a WAF rule matching the observed parameter-repetition signature."
                .to_string(),
            priority: Priority::Medium,
        },
    ]
}

fn system_overload_catalogue() -> Vec<Resolution> {
    vec![
        Resolution {
            category: ResolutionCategory::Scaling,
            action: "Horizontal scale".to_string(),
            detail: "Add capacity across the board; multiple subsystems are under strain at once."
                .to_string(),
            priority: Priority::Critical,
        },
        Resolution {
            category: ResolutionCategory::Backpressure,
            action: "Request queue with backpressure".to_string(),
            detail: "Queue excess requests with an explicit backpressure signal to callers."
                .to_string(),
            priority: Priority::High,
        },
        Resolution {
            category: ResolutionCategory::Degradation,
            action: "Graceful degradation".to_string(),
            detail: "Shed non-essential response fields to keep the core path responsive."
                .to_string(),
            priority: Priority::High,
        },
        Resolution {
            category: ResolutionCategory::PayloadHandling,
            action: "Payload minimisation".to_string(),
            detail: "Trim request/response payload size to reduce per-request cost.".to_string(),
            priority: Priority::Medium,
        },
    ]
}

fn priority_rank(priority: Priority) -> u8 {
    match priority {
        Priority::Critical => 0,
        Priority::High => 1,
        Priority::Medium => 2,
        Priority::Low => 3,
    }
}

fn catalogue_for(root_cause: RootCause) -> Vec<Resolution> {
    match root_cause {
        RootCause::LatencyBottleneck => latency_bottleneck_catalogue(),
        RootCause::BackendInstability => backend_instability_catalogue(),
        RootCause::TrafficSurge => traffic_surge_catalogue(),
        RootCause::AbuseOrBot => abuse_or_bot_catalogue(),
        RootCause::SystemOverload => system_overload_catalogue(),
        RootCause::None => Vec::new(),
    }
}

/// Builds the resolution list for a detection. For `SYSTEM_OVERLOAD`,
/// items from each contributing root are appended after the
/// overload-specific list, deduplicated by `(category, action)` with
/// first-occurrence order preserved, then stable-sorted by
/// `priority_rank`.
pub fn generate(
    root_cause: RootCause,
    _priority: Priority,
    contributing: &std::collections::HashSet<crate::models::ContributingCondition>,
) -> Vec<Resolution> {
    let mut items = catalogue_for(root_cause);

    if root_cause == RootCause::SystemOverload {
        use crate::models::ContributingCondition as CC;
        let ordered_roots = [
            (CC::LatencyBottleneck, RootCause::LatencyBottleneck),
            (CC::BackendInstability, RootCause::BackendInstability),
            (CC::TrafficSurge, RootCause::TrafficSurge),
            (CC::AbuseOrBot, RootCause::AbuseOrBot),
        ];
        for (condition, contributing_root) in ordered_roots {
            if contributing.contains(&condition) {
                items.extend(catalogue_for(contributing_root));
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    let mut deduped = Vec::with_capacity(items.len());
    for item in items {
        let key = (item.category, item.action.clone());
        if seen.insert(key) {
            deduped.push(item);
        }
    }

    deduped.sort_by_key(|r| priority_rank(r.priority));
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContributingCondition;

    #[test]
    fn each_bucket_has_at_least_four_items() {
        for rc in [
            RootCause::LatencyBottleneck,
            RootCause::BackendInstability,
            RootCause::TrafficSurge,
            RootCause::AbuseOrBot,
            RootCause::SystemOverload,
        ] {
            let items = catalogue_for(rc);
            assert!(items.len() >= 4, "{rc:?} has fewer than 4 items");
        }
    }

    #[test]
    fn backend_instability_first_item_is_critical_debugging() {
        let items = generate(
            RootCause::BackendInstability,
            Priority::Critical,
            &Default::default(),
        );
        assert_eq!(items[0].category, ResolutionCategory::Debugging);
        assert_eq!(items[0].priority, Priority::Critical);
    }

    #[test]
    fn system_overload_merges_contributing_roots_deduplicated() {
        let mut contributing = std::collections::HashSet::new();
        contributing.insert(ContributingCondition::TrafficSurge);
        contributing.insert(ContributingCondition::AbuseOrBot);

        let items = generate(RootCause::SystemOverload, Priority::Critical, &contributing);

        let rate_limit_count = items
            .iter()
            .filter(|r| r.action == "Token-bucket rate limit" || r.action == "Adaptive rate limits")
            .count();
        assert_eq!(rate_limit_count, 2);

        let mut seen = std::collections::HashSet::new();
        for item in &items {
            assert!(seen.insert((item.category, item.action.clone())), "duplicate item");
        }

        for w in items.windows(2) {
            assert!(priority_rank(w[0].priority) <= priority_rank(w[1].priority));
        }
    }
}
