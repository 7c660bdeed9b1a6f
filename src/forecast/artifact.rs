//! Trained model artifacts and their on-disk layout.
//!
//! One JSON blob per model name plus one for the ensemble weights, all in a
//! single directory:
//!
//! ```text
//! models/
//!   linear_regression.json
//!   random_forest.json
//!   ensemble_weights.json
//! ```
//!
//! Blobs are written to a temporary sibling and renamed into place, so a
//! reader sees either the previous artifact or the complete new one.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::features::{align, FeatureRow};
use super::forest::ForestModel;
use super::linear::LinearModel;
use crate::error::ArtifactError;

// ---

const WEIGHTS_FILE: &str = "ensemble_weights.json";

/// Model name → relative contribution to the ensemble.
pub type EnsembleWeights = BTreeMap<String, f64>;

/// Training-set accuracy of a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    // ---
    pub r2: f64,
    pub mae: f64,
    pub rmse: f64,
}

impl ModelMetrics {
    /// Score predictions against actual values.
    ///
    /// R² is 0.0 when the actual values have no variance.
    pub fn score(actual: &[f64], predicted: &[f64]) -> Self {
        // ---
        let n = actual.len().min(predicted.len());
        if n == 0 {
            return Self::default();
        }

        let mean = actual[..n].iter().sum::<f64>() / n as f64;
        let (mut ss_res, mut ss_tot, mut abs_err) = (0.0, 0.0, 0.0);
        for (a, p) in actual.iter().zip(predicted).take(n) {
            ss_res += (a - p).powi(2);
            ss_tot += (a - mean).powi(2);
            abs_err += (a - p).abs();
        }

        ModelMetrics {
            r2: if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 },
            mae: abs_err / n as f64,
            rmse: (ss_res / n as f64).sqrt(),
        }
    }
}

/// Fitted model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predictor {
    Linear(LinearModel),
    Forest(ForestModel),
}

impl Predictor {
    pub fn predict(&self, features: &[f64]) -> f64 {
        // ---
        match self {
            Predictor::Linear(model) => model.predict(features),
            Predictor::Forest(model) => model.predict(features),
        }
    }
}

/// A trained predictor with its feature schema and accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    // ---
    pub name: String,
    pub feature_schema: Vec<String>,
    pub predictor: Predictor,
    pub metrics: ModelMetrics,
    pub training_records: usize,
    pub trained_at: DateTime<Utc>,
}

impl ModelArtifact {
    /// Predict AQI for a named feature row.
    pub fn predict_row(&self, row: &FeatureRow) -> f64 {
        self.predictor.predict(&align(&self.feature_schema, row))
    }
}

/// Everything the ensemble needs: the loaded artifacts and their weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSet {
    // ---
    pub artifacts: BTreeMap<String, ModelArtifact>,
    pub weights: EnsembleWeights,
}

impl ModelSet {
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Equal weights over `names`.
pub fn uniform_weights<'a>(names: impl IntoIterator<Item = &'a str>) -> EnsembleWeights {
    // ---
    let names: Vec<&str> = names.into_iter().collect();
    if names.is_empty() {
        return EnsembleWeights::new();
    }
    let share = 1.0 / names.len() as f64;
    names.into_iter().map(|n| (n.to_string(), share)).collect()
}

/// Weights proportional to each model's R². Negative R² counts as zero;
/// when nothing scores above zero every model gets an equal share.
pub fn weights_from_metrics(metrics: &BTreeMap<String, ModelMetrics>) -> EnsembleWeights {
    // ---
    let total: f64 = metrics.values().map(|m| m.r2.max(0.0)).sum();
    if total <= 0.0 || !total.is_finite() {
        return uniform_weights(metrics.keys().map(String::as_str));
    }
    metrics
        .iter()
        .map(|(name, m)| (name.clone(), m.r2.max(0.0) / total))
        .collect()
}

/// The directory holding persisted artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    // ---
    root: PathBuf,
}

impl ArtifactDir {
    // ---
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn artifact_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    fn weights_path(&self) -> PathBuf {
        self.root.join(WEIGHTS_FILE)
    }

    /// True when every named artifact is on disk.
    pub async fn has_all(&self, names: &[&str]) -> bool {
        // ---
        for name in names {
            match tokio::fs::try_exists(self.artifact_path(name)).await {
                Ok(true) => {}
                _ => return false,
            }
        }
        !names.is_empty()
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ArtifactError> {
        // ---
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
        // ---
        let bytes = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Load whichever of the named artifacts exist. Unreadable blobs are
    /// skipped with a warning. Missing weights fall back to equal shares
    /// over `names`.
    pub async fn load(&self, names: &[&str]) -> ModelSet {
        // ---
        let mut artifacts = BTreeMap::new();
        for name in names {
            let path = self.artifact_path(name);
            match Self::read_json::<ModelArtifact>(&path).await {
                Ok(Some(artifact)) => {
                    debug!(model = name, "Loaded model artifact");
                    artifacts.insert(name.to_string(), artifact);
                }
                Ok(None) => debug!(model = name, "No artifact on disk"),
                Err(e) => warn!(model = name, error = %e, "Skipping unreadable artifact"),
            }
        }

        let weights = match Self::read_json::<EnsembleWeights>(&self.weights_path()).await {
            Ok(Some(weights)) => weights,
            Ok(None) => uniform_weights(names.iter().copied()),
            Err(e) => {
                warn!(error = %e, "Unreadable ensemble weights, using equal shares");
                uniform_weights(names.iter().copied())
            }
        };

        ModelSet { artifacts, weights }
    }

    /// Persist every artifact and then the weights.
    pub async fn commit(&self, set: &ModelSet) -> Result<(), ArtifactError> {
        // ---
        tokio::fs::create_dir_all(&self.root).await?;
        for (name, artifact) in &set.artifacts {
            Self::write_json(&self.artifact_path(name), artifact).await?;
        }
        Self::write_json(&self.weights_path(), &set.weights).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn linear_artifact(name: &str, intercept: f64) -> ModelArtifact {
        // ---
        ModelArtifact {
            name: name.to_string(),
            feature_schema: vec!["pm25".into(), "hour".into()],
            predictor: Predictor::Linear(LinearModel {
                intercept,
                coefficients: vec![2.0, 0.5],
            }),
            metrics: ModelMetrics {
                r2: 0.8,
                mae: 3.0,
                rmse: 4.0,
            },
            training_records: 120,
            trained_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn perfect_predictions_score_r2_one() {
        // ---
        let actual = [10.0, 20.0, 30.0];
        let m = ModelMetrics::score(&actual, &actual);
        assert_eq!(m, ModelMetrics { r2: 1.0, mae: 0.0, rmse: 0.0 });

        let off = ModelMetrics::score(&actual, &[12.0, 18.0, 30.0]);
        assert!((off.mae - 4.0 / 3.0).abs() < 1e-12);
        assert!((off.rmse - (8.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((off.r2 - (1.0 - 8.0 / 200.0)).abs() < 1e-12);
    }

    #[test]
    fn weights_are_r2_proportions() {
        // ---
        let metrics: BTreeMap<String, ModelMetrics> = [
            ("a".to_string(), ModelMetrics { r2: 0.6, ..Default::default() }),
            ("b".to_string(), ModelMetrics { r2: 0.2, ..Default::default() }),
            ("c".to_string(), ModelMetrics { r2: -0.5, ..Default::default() }),
        ]
        .into_iter()
        .collect();

        let weights = weights_from_metrics(&metrics);

        assert!((weights["a"] - 0.75).abs() < 1e-12);
        assert!((weights["b"] - 0.25).abs() < 1e-12);
        assert_eq!(weights["c"], 0.0);
    }

    #[test]
    fn non_positive_total_falls_back_to_equal_shares() {
        // ---
        let metrics: BTreeMap<String, ModelMetrics> = [
            ("a".to_string(), ModelMetrics::default()),
            ("b".to_string(), ModelMetrics { r2: -1.0, ..Default::default() }),
        ]
        .into_iter()
        .collect();

        let weights = weights_from_metrics(&metrics);
        assert_eq!(weights["a"], 0.5);
        assert_eq!(weights["b"], 0.5);
    }

    #[test]
    fn predict_row_aligns_by_name() {
        // ---
        let artifact = linear_artifact("linear_regression", 1.0);
        let row: FeatureRow = [("hour".to_string(), 4.0), ("pm25".to_string(), 10.0), ("co2".to_string(), 999.0)]
            .into_iter()
            .collect();

        assert_eq!(artifact.predict_row(&row), 1.0 + 20.0 + 2.0);
    }

    #[tokio::test]
    async fn commit_then_load_restores_the_set() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactDir::new(dir.path().join("models"));
        let names = ["linear_regression", "random_forest"];

        assert!(!artifacts.has_all(&names).await);
        assert!(artifacts.load(&names).await.is_empty());

        let mut set = ModelSet::default();
        set.artifacts.insert("linear_regression".into(), linear_artifact("linear_regression", 1.0));
        set.weights.insert("linear_regression".into(), 1.0);
        artifacts.commit(&set).await.unwrap();

        assert!(!artifacts.has_all(&names).await);
        assert!(artifacts.has_all(&names[..1]).await);

        let loaded = artifacts.load(&names).await;
        assert_eq!(loaded, set);
    }

    #[tokio::test]
    async fn corrupt_blob_is_skipped_and_weights_default() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("random_forest.json"), b"{not json").await.unwrap();
        let artifacts = ArtifactDir::new(dir.path());

        let loaded = artifacts.load(&["random_forest", "linear_regression"]).await;

        assert!(loaded.is_empty());
        assert_eq!(loaded.weights["random_forest"], 0.5);
    }
}
