//! Event Bus (C12, spec §4.12).
//!
//! Fans out Detection records to any number of subscribers (the
//! WebSocket handlers in the Control API, primarily). At-most-once
//! delivery per subscriber, FIFO per subscriber, slow subscribers drop
//! rather than back-pressure producers. Grounded on `tokio::sync::
//! broadcast`, the same fan-out primitive the teacher's market-data
//! feed handlers use.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;

use crate::models::Detection;

pub struct EventBus {
    tx: broadcast::Sender<Detection>,
    dropped: Arc<AtomicU64>,
}

pub struct BusSubscription {
    rx: broadcast::Receiver<Detection>,
    dropped: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publishes a detection to every current subscriber. Returns
    /// without error even if there are no subscribers.
    pub fn publish(&self, detection: Detection) {
        // `send` only errors when there are zero receivers, which is
        // an expected, harmless state (no one is watching yet).
        let _ = self.tx.send(detection);
    }

    pub fn subscribe(&self) -> BusSubscription {
        BusSubscription {
            rx: self.tx.subscribe(),
            dropped: self.dropped.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Total lagged-and-dropped messages across all subscribers, ever.
    pub fn total_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl BusSubscription {
    /// Awaits the next detection. On subscriber lag, counts the drop
    /// and transparently resumes from the oldest retained message
    /// rather than surfacing `Lagged` to the caller.
    pub async fn recv(&mut self) -> Option<Detection> {
        loop {
            match self.rx.recv().await {
                Ok(detection) => return Some(detection),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.dropped.fetch_add(n, Ordering::Relaxed);
                    crate::metrics::record_queue_drop("event_bus", n);
                    warn!(lagged = n, "event bus subscriber lagged, dropping oldest");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ContributingCondition, FeatureVector, ModelScores, Mode, Priority, RootCause,
        RuleAlertSet, SubmodelStatus,
    };
    use chrono::Utc;
    use std::collections::HashSet;

    fn sample() -> Detection {
        Detection {
            id: "det-1".to_string(),
            timestamp: Utc::now(),
            mode: Mode::Live,
            source: "/login".to_string(),
            window_id: 1,
            features: FeatureVector {
                request_rate: 1.0,
                unique_endpoints: 1.0,
                method_ratio: 1.0,
                avg_payload_size: 1.0,
                error_rate: 0.0,
                repeated_parameter_ratio: 0.0,
                user_agent_entropy: 0.0,
                avg_response_time: 1.0,
                max_response_time: 1.0,
            },
            rule_alerts: RuleAlertSet {
                alerts: HashSet::new(),
                rule_score: 0.0,
            },
            model_scores: ModelScores {
                anomaly_score: 0.0,
                anomaly_status: SubmodelStatus::Ready,
                failure_probability: 0.0,
                failure_status: SubmodelStatus::Ready,
                cluster_id: 0,
                cluster_distance: 0.0,
                cluster_status: SubmodelStatus::Ready,
                next_window_failure_probability: 0.0,
                next_window_status: SubmodelStatus::Ready,
            },
            risk_score: 0.1,
            priority: Priority::Low,
            is_anomaly: false,
            root_cause: RootCause::None,
            contributing_conditions: HashSet::<ContributingCondition>::new(),
            resolutions: vec![],
            detection_latency_ms: 1.0,
            injected_label: None,
            emergency_rank: None,
            is_correctly_detected: None,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_detection() {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe();
        bus.publish(sample());
        let received = sub.recv().await.unwrap();
        assert_eq!(received.id, "det-1");
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_a_copy() {
        let bus = EventBus::new(16);
        let mut sub_a = bus.subscribe();
        let mut sub_b = bus.subscribe();
        bus.publish(sample());
        assert!(sub_a.recv().await.is_some());
        assert!(sub_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn lagging_subscriber_counts_drops_instead_of_erroring() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for _ in 0..5 {
            bus.publish(sample());
        }
        assert!(sub.recv().await.is_some());
        assert!(bus.total_dropped() > 0);
    }

    #[test]
    fn subscriber_count_tracks_active_subscriptions() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }
}
