//! Observation Filter (C1, spec §4.1).
//!
//! Pure, side-effect free, constant time: decides whether an
//! observation is worth aggregating at all.

use crate::models::{HttpMethod, Mode, Observation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Tracked,
    Ignored,
}

pub struct ObservationFilter {
    live_tracked_routes: Vec<String>,
    sim_virtual_routes: Vec<String>,
}

impl ObservationFilter {
    pub fn new(live_tracked_routes: Vec<String>, sim_virtual_routes: Vec<String>) -> Self {
        Self {
            live_tracked_routes,
            sim_virtual_routes,
        }
    }

    #[inline]
    pub fn classify(&self, obs: &Observation) -> FilterDecision {
        if obs.method == HttpMethod::Options {
            return FilterDecision::Ignored;
        }

        let tracked = match obs.mode {
            Mode::Live => self.live_tracked_routes.iter().any(|r| r == &obs.route),
            Mode::Sim => self.sim_virtual_routes.iter().any(|r| r == &obs.route),
        };

        if tracked {
            FilterDecision::Tracked
        } else {
            FilterDecision::Ignored
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn obs(route: &str, method: HttpMethod, mode: Mode) -> Observation {
        Observation {
            ts_monotonic_ms: 0,
            ts_wall: Utc::now(),
            source: route.to_string(),
            route: route.to_string(),
            method,
            status: 200,
            latency_ms: 10.0,
            payload_bytes: 0,
            user_agent: "test".to_string(),
            params: vec![],
            mode,
            injected_label: None,
        }
    }

    fn filter() -> ObservationFilter {
        ObservationFilter::new(
            vec!["/login".to_string(), "/search".to_string()],
            vec!["/sim/login".to_string()],
        )
    }

    #[test]
    fn tracks_live_allowlisted_route() {
        let f = filter();
        assert_eq!(
            f.classify(&obs("/login", HttpMethod::Post, Mode::Live)),
            FilterDecision::Tracked
        );
    }

    #[test]
    fn ignores_live_route_not_allowlisted() {
        let f = filter();
        assert_eq!(
            f.classify(&obs("/metrics", HttpMethod::Get, Mode::Live)),
            FilterDecision::Ignored
        );
    }

    #[test]
    fn sim_uses_virtual_routes_not_live_routes() {
        let f = filter();
        assert_eq!(
            f.classify(&obs("/login", HttpMethod::Post, Mode::Sim)),
            FilterDecision::Ignored
        );
        assert_eq!(
            f.classify(&obs("/sim/login", HttpMethod::Post, Mode::Sim)),
            FilterDecision::Tracked
        );
    }

    #[test]
    fn ignores_preflight_regardless_of_route() {
        let f = filter();
        assert_eq!(
            f.classify(&obs("/login", HttpMethod::Options, Mode::Live)),
            FilterDecision::Ignored
        );
    }
}
