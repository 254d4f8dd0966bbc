//! Model Holder (C4, spec §4.4).
//!
//! Loads once at startup, then serves read-only references for the
//! process lifetime. Grounded on the teacher's preference for small
//! versioned JSON config/state blobs (`route_quality::config`) — here
//! applied to model+scaler sidecar pairs. No FFI to a real ML runtime:
//! every artifact is `Vec<f64>`/`Vec<Vec<f64>>` arithmetic, matching
//! the "training is out of scope" framing.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::error::ArtifactError;
use crate::models::{FeatureVector, SubmodelStatus};

const FEATURE_LEN: usize = FeatureVector::LEN;

#[derive(Debug, Deserialize)]
struct ScalerArtifact {
    version: u32,
    feature_len: usize,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl ScalerArtifact {
    fn transform(&self, x: &[f64; FEATURE_LEN]) -> [f64; FEATURE_LEN] {
        let mut out = [0.0; FEATURE_LEN];
        for i in 0..FEATURE_LEN {
            let scale = if self.scale[i] == 0.0 { 1.0 } else { self.scale[i] };
            out[i] = (x[i] - self.mean[i]) / scale;
        }
        out
    }
}

/// Axis-aligned isolation-forest split, stored flat: one row of
/// per-feature split thresholds per tree. `path_length` counts how
/// many splits a point falls below threshold on, a cheap proxy for
/// the real average-path-length statistic.
#[derive(Debug, Deserialize)]
struct IsolationForestArtifact {
    version: u32,
    feature_len: usize,
    trees: Vec<Vec<f64>>,
    max_path_length: f64,
}

impl IsolationForestArtifact {
    fn score(&self, x: &[f64; FEATURE_LEN]) -> f64 {
        let mut total = 0.0;
        for tree in &self.trees {
            let mut depth = 0.0;
            for (i, &threshold) in tree.iter().enumerate() {
                if i >= FEATURE_LEN {
                    break;
                }
                if x[i] < threshold {
                    depth += 1.0;
                }
            }
            total += depth;
        }
        let avg_path = total / self.trees.len().max(1) as f64;
        // Order-preserving affine map to [0,1]: shorter average path
        // (more isolated) -> higher anomaly score.
        let normalized = 1.0 - (avg_path / self.max_path_length.max(1.0));
        normalized.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Deserialize)]
struct LogisticRegressionArtifact {
    version: u32,
    feature_len: usize,
    weights: Vec<f64>,
    bias: f64,
}

impl LogisticRegressionArtifact {
    fn predict(&self, x: &[f64; FEATURE_LEN]) -> f64 {
        let z: f64 = self
            .weights
            .iter()
            .zip(x.iter())
            .map(|(w, xi)| w * xi)
            .sum::<f64>()
            + self.bias;
        1.0 / (1.0 + (-z).exp())
    }
}

#[derive(Debug, Deserialize)]
struct KMeansArtifact {
    version: u32,
    feature_len: usize,
    centroids: Vec<Vec<f64>>,
}

impl KMeansArtifact {
    fn assign(&self, x: &[f64; FEATURE_LEN]) -> (u8, f64) {
        let mut best = (0u8, f64::MAX);
        for (id, centroid) in self.centroids.iter().enumerate() {
            let dist: f64 = centroid
                .iter()
                .zip(x.iter())
                .map(|(c, xi)| (c - xi).powi(2))
                .sum::<f64>()
                .sqrt();
            if dist < best.1 {
                best = (id as u8, dist);
            }
        }
        best
    }
}

enum ModelHandle<T> {
    Ready { artifact: T, scaler: ScalerArtifact },
    Unavailable,
}

/// Read-only post-load view of the four scoring artifacts. Constructed
/// once via [`ModelHolder::load`]; every `predict_*` call is `&self`.
pub struct ModelHolder {
    isolation_forest: ModelHandle<IsolationForestArtifact>,
    failure_predictor: ModelHandle<LogisticRegressionArtifact>,
    kmeans: ModelHandle<KMeansArtifact>,
    next_failure_predictor: ModelHandle<LogisticRegressionArtifact>,
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path, feature_len: impl Fn(&T) -> usize, version: impl Fn(&T) -> u32) -> Result<T, ArtifactError> {
    let bytes = fs::read(path).map_err(|_| ArtifactError::NotFound(path.display().to_string()))?;
    let artifact: T = serde_json::from_slice(&bytes)
        .map_err(|e| ArtifactError::Malformed(format!("{}: {e}", path.display())))?;
    let _ = version(&artifact);
    let got = feature_len(&artifact);
    if got != FEATURE_LEN {
        return Err(ArtifactError::ShapeMismatch {
            expected: FEATURE_LEN,
            got,
        });
    }
    Ok(artifact)
}

fn load_pair<T: for<'de> Deserialize<'de>>(
    dir: &Path,
    name: &str,
    feature_len: impl Fn(&T) -> usize,
    version: impl Fn(&T) -> u32,
) -> ModelHandle<T> {
    let artifact_path = dir.join(format!("{name}.model.json"));
    let scaler_path = dir.join(format!("{name}.scaler.json"));

    let artifact = load_json(&artifact_path, &feature_len, &version);
    let scaler = load_json::<ScalerArtifact>(&scaler_path, |s| s.feature_len, |s| s.version);

    match (artifact, scaler) {
        (Ok(artifact), Ok(scaler)) => ModelHandle::Ready { artifact, scaler },
        (Err(e), _) | (_, Err(e)) => {
            warn!(model = name, error = %e, "model artifact unavailable, submodel degraded");
            ModelHandle::Unavailable
        }
    }
}

impl ModelHolder {
    /// Loads all four artifact pairs from `dir`. Any missing or
    /// malformed artifact degrades only that submodel to
    /// `Unavailable`; never aborts startup (spec §4.4 / §7
    /// Configuration-class handling).
    pub fn load(dir: &Path) -> Self {
        Self {
            isolation_forest: load_pair(dir, "isolation_forest", |a: &IsolationForestArtifact| a.feature_len, |a| a.version),
            failure_predictor: load_pair(dir, "failure_predictor", |a: &LogisticRegressionArtifact| a.feature_len, |a| a.version),
            kmeans: load_pair(dir, "kmeans", |a: &KMeansArtifact| a.feature_len, |a| a.version),
            next_failure_predictor: load_pair(dir, "next_failure_predictor", |a: &LogisticRegressionArtifact| a.feature_len, |a| a.version),
        }
    }

    pub fn predict_if(&self, x: &FeatureVector) -> (f64, SubmodelStatus) {
        match &self.isolation_forest {
            ModelHandle::Ready { artifact, scaler } => {
                let scaled = scaler.transform(&x.as_array());
                (artifact.score(&scaled), SubmodelStatus::Ready)
            }
            ModelHandle::Unavailable => (0.0, SubmodelStatus::Unavailable),
        }
    }

    pub fn predict_failure(&self, x: &FeatureVector) -> (f64, SubmodelStatus) {
        match &self.failure_predictor {
            ModelHandle::Ready { artifact, scaler } => {
                let scaled = scaler.transform(&x.as_array());
                (artifact.predict(&scaled), SubmodelStatus::Ready)
            }
            ModelHandle::Unavailable => (0.0, SubmodelStatus::Unavailable),
        }
    }

    pub fn assign_cluster(&self, x: &FeatureVector) -> (u8, f64, SubmodelStatus) {
        match &self.kmeans {
            ModelHandle::Ready { artifact, scaler } => {
                let scaled = scaler.transform(&x.as_array());
                let (id, dist) = artifact.assign(&scaled);
                (id, dist, SubmodelStatus::Ready)
            }
            ModelHandle::Unavailable => (0, 0.0, SubmodelStatus::Unavailable),
        }
    }

    pub fn predict_next_failure(&self, x: &FeatureVector) -> (f64, SubmodelStatus) {
        match &self.next_failure_predictor {
            ModelHandle::Ready { artifact, scaler } => {
                let scaled = scaler.transform(&x.as_array());
                (artifact.predict(&scaled), SubmodelStatus::Ready)
            }
            ModelHandle::Unavailable => (0.0, SubmodelStatus::Unavailable),
        }
    }
}
