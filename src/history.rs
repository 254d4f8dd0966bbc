//! History & Ranking Store (C10, spec §4.10).
//!
//! Bounded ring of the last K Detection records, simulation mode only.
//! Grounded on the teacher's `SignalStorage` bounded-ring (evict
//! oldest) pattern, with rank recomputation and accuracy bookkeeping
//! layered on top.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::models::{AccuracyStats, Detection, EmergencyEntry, RootCause, SimPattern};

struct Inner {
    ring: VecDeque<Detection>,
    capacity: usize,
    accuracy: AccuracyStats,
}

pub struct HistoryStore {
    inner: Mutex<Inner>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ring: VecDeque::with_capacity(capacity),
                capacity,
                accuracy: AccuracyStats::default(),
            }),
        }
    }

    /// Appends a detection, evicting the oldest entry if at capacity,
    /// then recomputes ranks and accuracy counters. `detection` must
    /// already carry `injected_label` (simulation-only caller).
    pub fn append(&self, mut detection: Detection) {
        let mut inner = self.inner.lock();

        update_accuracy(&mut inner.accuracy, &detection);

        if inner.ring.len() >= inner.capacity {
            inner.ring.pop_front();
        }
        detection.emergency_rank = None;
        inner.ring.push_back(detection);

        recompute_ranks(&mut inner.ring);
    }

    /// Top-n detections by current rank (rank 1 = highest risk).
    pub fn top_emergencies(&self, n: usize) -> Vec<EmergencyEntry> {
        let inner = self.inner.lock();
        let mut ranked: Vec<&Detection> = inner.ring.iter().collect();
        ranked.sort_by(|a, b| {
            b.risk_score
                .partial_cmp(&a.risk_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });

        ranked
            .into_iter()
            .take(n)
            .enumerate()
            .map(|(i, d)| EmergencyEntry {
                rank: (i + 1) as u32,
                detection: d.clone(),
            })
            .collect()
    }

    pub fn accuracy(&self) -> AccuracyStats {
        self.inner.lock().accuracy
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.ring.clear();
        inner.accuracy = AccuracyStats::default();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all entries, newest-first, for the `/detections`
    /// list endpoint.
    pub fn all_newest_first(&self) -> Vec<Detection> {
        let inner = self.inner.lock();
        inner.ring.iter().rev().cloned().collect()
    }
}

fn recompute_ranks(ring: &mut VecDeque<Detection>) {
    let mut indices: Vec<usize> = (0..ring.len()).collect();
    indices.sort_by(|&i, &j| {
        ring[j]
            .risk_score
            .partial_cmp(&ring[i].risk_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| ring[j].timestamp.cmp(&ring[i].timestamp))
    });
    for (rank, idx) in indices.into_iter().enumerate() {
        ring[idx].emergency_rank = Some((rank + 1) as u32);
    }
}

/// Root-cause-maps-to-injected-label table (spec §4.10). Shared with
/// the orchestrator's `is_correctly_detected` assembly.
pub(crate) fn maps_to(injected: SimPattern, root_cause: RootCause) -> bool {
    match injected {
        SimPattern::RateSpike => root_cause == RootCause::TrafficSurge,
        SimPattern::ErrorBurst => root_cause == RootCause::BackendInstability,
        SimPattern::PayloadAbuse => {
            matches!(root_cause, RootCause::LatencyBottleneck | RootCause::SystemOverload)
        }
        SimPattern::ParamRepetition => root_cause == RootCause::AbuseOrBot,
        SimPattern::EndpointFlood => {
            matches!(root_cause, RootCause::TrafficSurge | RootCause::AbuseOrBot)
        }
        SimPattern::Normal | SimPattern::Mixed => false,
    }
}

fn update_accuracy(accuracy: &mut AccuracyStats, detection: &Detection) {
    accuracy.total += 1;

    let Some(injected) = detection.injected_label else {
        return;
    };

    let correct = if injected == SimPattern::Normal {
        !detection.is_anomaly
    } else {
        detection.is_anomaly && maps_to(injected, detection.root_cause)
    };

    if correct {
        accuracy.correct += 1;
    } else if injected == SimPattern::Normal && detection.is_anomaly {
        accuracy.fp += 1;
    } else if injected != SimPattern::Normal && !detection.is_anomaly {
        accuracy.fn_ += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ContributingCondition, FeatureVector, ModelScores, Priority, RuleAlertSet, SubmodelStatus,
    };
    use chrono::Utc;
    use std::collections::HashSet;

    fn detection(risk_score: f64, injected: Option<SimPattern>, is_anomaly: bool, root_cause: RootCause) -> Detection {
        Detection {
            id: format!("det-{risk_score}"),
            timestamp: Utc::now(),
            mode: crate::models::Mode::Sim,
            source: "/sim/login".to_string(),
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
            risk_score,
            priority: Priority::Low,
            is_anomaly,
            root_cause,
            contributing_conditions: HashSet::<ContributingCondition>::new(),
            resolutions: vec![],
            detection_latency_ms: 1.0,
            injected_label: injected,
            emergency_rank: None,
            is_correctly_detected: None,
        }
    }

    #[test]
    fn ranks_recomputed_on_append_highest_risk_first() {
        let store = HistoryStore::new(10);
        store.append(detection(0.2, None, false, RootCause::None));
        store.append(detection(0.9, None, true, RootCause::TrafficSurge));
        store.append(detection(0.5, None, false, RootCause::None));

        let top = store.top_emergencies(3);
        assert_eq!(top[0].rank, 1);
        assert_eq!(top[0].detection.risk_score, 0.9);
        assert_eq!(top[1].detection.risk_score, 0.5);
        assert_eq!(top[2].detection.risk_score, 0.2);
    }

    #[test]
    fn ring_evicts_oldest_when_over_capacity() {
        let store = HistoryStore::new(2);
        store.append(detection(0.1, None, false, RootCause::None));
        store.append(detection(0.2, None, false, RootCause::None));
        store.append(detection(0.3, None, false, RootCause::None));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn accuracy_counts_normal_and_matching_root_cause_as_correct() {
        let store = HistoryStore::new(10);
        store.append(detection(0.1, Some(SimPattern::Normal), false, RootCause::None));
        store.append(detection(
            0.9,
            Some(SimPattern::RateSpike),
            true,
            RootCause::TrafficSurge,
        ));
        store.append(detection(
            0.9,
            Some(SimPattern::RateSpike),
            true,
            RootCause::AbuseOrBot,
        ));

        let acc = store.accuracy();
        assert_eq!(acc.total, 3);
        assert_eq!(acc.correct, 2);
        assert_eq!(acc.fp, 0);
        assert_eq!(acc.fn_, 0);
    }

    #[test]
    fn clear_resets_ring_and_accuracy() {
        let store = HistoryStore::new(10);
        store.append(detection(0.5, Some(SimPattern::Normal), false, RootCause::None));
        store.clear();
        assert_eq!(store.len(), 0);
        assert_eq!(store.accuracy().total, 0);
        assert!(store.top_emergencies(10).is_empty());
    }
}
