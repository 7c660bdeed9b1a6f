//! Ensemble AQI forecasting.
//!
//! Several independently trained models each project the next 24 hours of
//! AQI from a city's latest reading; the projections are blended with
//! weights proportional to each model's training-set R².
//!
//! Trained artifacts live in an [`ArtifactDir`]. They are loaded lazily on
//! the first forecast and swapped in memory after every successful
//! training run, so a forecast never waits on training. The metrics of
//! every run are also appended to a [`MetricsStore`] so training history
//! outlives the process.

pub mod artifact;
pub mod features;
pub mod forest;
pub mod linear;
pub mod trainer;

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use artifact::{ArtifactDir, EnsembleWeights, ModelArtifact, ModelMetrics, ModelSet};
pub use forest::RandomForestTrainer;
pub use linear::LinearRegressionTrainer;
pub use trainer::{Trainer, TrainingSet, MIN_TRAINING_RECORDS};

use crate::cache::LatestReadingCache;
use crate::clock::Clock;
use crate::error::{ForecastError, TrainError};
use crate::models::{ModelMetricsRecord, Reading};
use crate::store::{bounded, MetricsStore};
use artifact::weights_from_metrics;
use features::derive_row;

// ---

pub const FORECAST_HOURS: i64 = 24;

/// How weights are applied when some weighted models are not loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WeightPolicy {
    /// Use the persisted weights as is; a missing model contributes 0.
    #[default]
    AsStored,
    /// Rescale the weights of loaded models to sum to 1.
    Renormalize,
}

impl FromStr for WeightPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s.trim().to_ascii_lowercase().as_str() {
            "as_stored" => Ok(WeightPolicy::AsStored),
            "renormalize" => Ok(WeightPolicy::Renormalize),
            other => Err(format!("unknown weight policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    // ---
    pub target_time: DateTime<Utc>,
    pub predicted_aqi: f64,
}

/// The reading a forecast projects forward from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Baseline {
    // ---
    pub city: String,
    pub timestamp: DateTime<Utc>,
    pub aqi: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    // ---
    pub generated_at: DateTime<Utc>,
    pub baseline: Option<Baseline>,
    pub models: BTreeMap<String, ModelMetrics>,
    pub predictions: BTreeMap<String, Vec<ForecastPoint>>,
    pub ensemble: Vec<ForecastPoint>,
    pub ensemble_weights: EnsembleWeights,
}

impl Forecast {
    fn empty(generated_at: DateTime<Utc>, baseline: Option<Baseline>) -> Self {
        // ---
        Forecast {
            generated_at,
            baseline,
            models: BTreeMap::new(),
            predictions: BTreeMap::new(),
            ensemble: Vec::new(),
            ensemble_weights: EnsembleWeights::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    // ---
    pub models: BTreeMap<String, ModelMetrics>,
    pub ensemble_weights: EnsembleWeights,
    pub training_records: usize,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainOutcome {
    Trained(TrainingReport),
    /// Every model already has an artifact and retraining was not forced.
    Cached,
    InsufficientData { records: usize },
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct ForecastEnsemble {
    // ---
    cache: Arc<LatestReadingCache>,
    metrics: Arc<dyn MetricsStore>,
    trainers: Vec<Arc<dyn Trainer>>,
    artifacts: ArtifactDir,
    clock: Arc<dyn Clock>,
    policy: WeightPolicy,
    train_history_limit: usize,
    models: RwLock<Option<Arc<ModelSet>>>,
    train_lock: tokio::sync::Mutex<()>,
}

impl ForecastEnsemble {
    // ---
    pub fn new(
        cache: Arc<LatestReadingCache>,
        metrics: Arc<dyn MetricsStore>,
        trainers: Vec<Arc<dyn Trainer>>,
        artifacts: ArtifactDir,
        clock: Arc<dyn Clock>,
        policy: WeightPolicy,
        train_history_limit: usize,
    ) -> Self {
        // ---
        Self {
            cache,
            metrics,
            trainers,
            artifacts,
            clock,
            policy,
            train_history_limit,
            models: RwLock::new(None),
            train_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn model_names(&self) -> Vec<&'static str> {
        self.trainers.iter().map(|t| t.name()).collect()
    }

    fn committed(&self) -> Option<Arc<ModelSet>> {
        self.models.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn swap(&self, set: ModelSet) {
        *self.models.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(set));
    }

    /// The committed model set, loading it from disk on first use. An empty
    /// load is not remembered, so artifacts written later are picked up.
    pub async fn current_models(&self) -> Arc<ModelSet> {
        // ---
        if let Some(set) = self.committed() {
            return set;
        }

        let loaded = self.artifacts.load(&self.model_names()).await;
        if loaded.is_empty() {
            debug!(dir = %self.artifacts.root().display(), "No model artifacts available");
            return Arc::new(loaded);
        }

        info!(models = loaded.artifacts.len(), "Model artifacts loaded");
        self.install_loaded(loaded)
    }

    /// Publish a set read from disk unless a training run promoted one
    /// while the read was in flight. Returns whichever set is current.
    fn install_loaded(&self, loaded: ModelSet) -> Arc<ModelSet> {
        // ---
        let mut slot = self.models.write().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = slot.as_ref() {
            debug!("Newer model set already installed, discarding disk load");
            return Arc::clone(current);
        }
        let loaded = Arc::new(loaded);
        *slot = Some(Arc::clone(&loaded));
        loaded
    }

    fn effective_weights(&self, set: &ModelSet) -> EnsembleWeights {
        // ---
        match self.policy {
            WeightPolicy::AsStored => set.weights.clone(),
            WeightPolicy::Renormalize => {
                let present: EnsembleWeights = set
                    .weights
                    .iter()
                    .filter(|(name, _)| set.artifacts.contains_key(*name))
                    .map(|(name, w)| (name.clone(), *w))
                    .collect();
                let total: f64 = present.values().sum();
                if total > 0.0 {
                    present.into_iter().map(|(name, w)| (name, w / total)).collect()
                } else {
                    present
                }
            }
        }
    }

    /// Project AQI for the next 24 hours from the latest reading of `city`,
    /// or of the most polluted city when `city` is absent or unknown.
    pub async fn predict_next_24(&self, city: Option<&str>) -> Forecast {
        // ---
        let generated_at = self.clock.now();
        let latest = self.cache.get(true).await;

        let chosen: Option<&Reading> = city
            .and_then(|c| latest.iter().find(|r| r.city.eq_ignore_ascii_case(c.trim())))
            .or_else(|| latest.first());
        let Some(reading) = chosen else {
            debug!("No readings to forecast from");
            return Forecast::empty(generated_at, None);
        };

        let baseline = Baseline {
            city: reading.city.clone(),
            timestamp: reading.timestamp,
            aqi: reading.aqi,
        };

        let set = self.current_models().await;
        if set.is_empty() {
            return Forecast::empty(generated_at, Some(baseline));
        }

        let mut predictions = BTreeMap::new();
        for (name, artifact) in &set.artifacts {
            let series: Vec<ForecastPoint> = (1..=FORECAST_HOURS)
                .map(|h| {
                    let target_time = reading.timestamp + TimeDelta::hours(h);
                    let row = derive_row(reading, target_time);
                    ForecastPoint {
                        target_time,
                        predicted_aqi: round2(artifact.predict_row(&row)),
                    }
                })
                .collect();
            predictions.insert(name.clone(), series);
        }

        let weights = self.effective_weights(&set);
        let ensemble = (0..FORECAST_HOURS as usize)
            .map(|i| {
                let blended: f64 = weights
                    .iter()
                    .map(|(name, w)| {
                        w * predictions
                            .get(name)
                            .and_then(|series| series.get(i))
                            .map_or(0.0, |p| p.predicted_aqi)
                    })
                    .sum();
                ForecastPoint {
                    target_time: reading.timestamp + TimeDelta::hours(i as i64 + 1),
                    predicted_aqi: round2(blended),
                }
            })
            .collect();

        Forecast {
            generated_at,
            baseline: Some(baseline),
            models: set
                .artifacts
                .iter()
                .map(|(name, a)| (name.clone(), a.metrics))
                .collect(),
            predictions,
            ensemble,
            ensemble_weights: weights,
        }
    }

    /// Train every registered model unless all artifacts already exist.
    ///
    /// Runs are serialized. A trainer that fails is left out of the run;
    /// the run fails only if every trainer does.
    pub async fn train_if_needed(&self, force: bool) -> Result<TrainOutcome, ForecastError> {
        // ---
        let _guard = self.train_lock.lock().await;

        let names = self.model_names();
        if !force && self.artifacts.has_all(&names).await {
            debug!("Model artifacts present, skipping training");
            return Ok(TrainOutcome::Cached);
        }

        let readings = self.cache.recent(self.train_history_limit).await;
        let set = TrainingSet::from_readings(&readings);
        if set.len() < MIN_TRAINING_RECORDS {
            info!(records = set.len(), required = MIN_TRAINING_RECORDS, "Not enough data to train");
            return Ok(TrainOutcome::InsufficientData { records: set.len() });
        }

        let trained_at = self.clock.now();
        let records = set.len();
        let trainers = self.trainers.clone();
        info!(records, models = trainers.len(), "Training models");

        let results = tokio::task::spawn_blocking(move || {
            trainers
                .iter()
                .map(|t| (t.name(), t.train(&set, trained_at)))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| ForecastError::Task(e.to_string()))?;

        let mut models = ModelSet::default();
        let mut first_error: Option<TrainError> = None;
        for (name, result) in results {
            match result {
                Ok(artifact) => {
                    info!(model = name, r2 = artifact.metrics.r2, mae = artifact.metrics.mae, "Model trained");
                    models.artifacts.insert(name.to_string(), artifact);
                }
                Err(e) => {
                    warn!(model = name, error = %e, "Model training failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if models.is_empty() {
            return Err(first_error
                .unwrap_or_else(|| TrainError::Degenerate("no trainers registered".into()))
                .into());
        }

        let metrics: BTreeMap<String, ModelMetrics> = models
            .artifacts
            .iter()
            .map(|(name, a)| (name.clone(), a.metrics))
            .collect();
        models.weights = weights_from_metrics(&metrics);

        self.artifacts.commit(&models).await?;
        let report = TrainingReport {
            models: metrics,
            ensemble_weights: models.weights.clone(),
            training_records: records,
            trained_at,
        };
        self.swap(models);
        info!(records, "Model artifacts committed");

        self.record_metrics(&report).await;
        Ok(TrainOutcome::Trained(report))
    }

    /// Append one record per trained model. Failures are logged only: the
    /// artifacts are already promoted.
    async fn record_metrics(&self, report: &TrainingReport) {
        // ---
        let run_id = Uuid::new_v4();
        let training_records = i64::try_from(report.training_records).unwrap_or(i64::MAX);
        let records: Vec<ModelMetricsRecord> = report
            .models
            .iter()
            .map(|(name, m)| ModelMetricsRecord {
                id: Uuid::new_v4(),
                run_id,
                model: name.clone(),
                r2: m.r2,
                mae: m.mae,
                rmse: m.rmse,
                weight: report.ensemble_weights.get(name).copied().unwrap_or(0.0),
                training_records,
                trained_at: report.trained_at,
            })
            .collect();

        let limit = self.cache.store_timeout();
        if let Err(e) = bounded(limit, self.metrics.insert_model_metrics(&records)).await {
            warn!(%run_id, error = %e, "Failed to record training metrics");
        }
    }

    /// Metrics of past training runs, newest first. Store failures yield an
    /// empty list.
    pub async fn metrics_history(&self, limit: usize) -> Vec<ModelMetricsRecord> {
        // ---
        let timeout = self.cache.store_timeout();
        match bounded(timeout, self.metrics.find_recent_model_metrics(limit)).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Model metrics query failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::cache::CacheSettings;
    use crate::clock::ManualClock;
    use crate::forecast::artifact::Predictor;
    use crate::forecast::linear::LinearModel;
    use crate::models::StoredReading;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    }

    fn stored(city: &str, pm25: f64, hours_ago: i64) -> StoredReading {
        // ---
        StoredReading {
            id: Uuid::new_v4(),
            city: city.to_string(),
            state: "Telangana".to_string(),
            latitude: 17.0,
            longitude: 78.0,
            pm25: Some(pm25),
            pm10: Some(60.0),
            co2: Some(500.0),
            no2: Some(20.0),
            temperature: Some(30.0),
            humidity: Some(50.0),
            timestamp: start() - TimeDelta::hours(hours_ago),
        }
    }

    fn ensemble_over(store: MemoryStore, dir: &std::path::Path, policy: WeightPolicy) -> ForecastEnsemble {
        // ---
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::new(start()));
        let cache = Arc::new(LatestReadingCache::new(
            store.clone(),
            clock.clone(),
            CacheSettings::default(),
        ));
        ForecastEnsemble::new(
            cache,
            store,
            vec![
                Arc::new(LinearRegressionTrainer::default()),
                Arc::new(RandomForestTrainer {
                    n_trees: 10,
                    ..Default::default()
                }),
            ],
            ArtifactDir::new(dir),
            clock,
            policy,
            1000,
        )
    }

    fn two_cities() -> MemoryStore {
        // ---
        let store = MemoryStore::new();
        store
            .extend([stored("Warangal", 20.0, 0), stored("Hyderabad", 80.0, 0)])
            .unwrap();
        store
    }

    fn constant_model(name: &str, intercept: f64) -> ModelArtifact {
        // ---
        ModelArtifact {
            name: name.to_string(),
            feature_schema: vec!["hour".into()],
            predictor: Predictor::Linear(LinearModel {
                intercept,
                coefficients: vec![1.0],
            }),
            metrics: ModelMetrics {
                r2: 0.9,
                mae: 1.0,
                rmse: 1.5,
            },
            training_records: 100,
            trained_at: start(),
        }
    }

    async fn commit(dir: &std::path::Path, models: &[(&str, f64)], weights: &[(&str, f64)]) {
        // ---
        let mut set = ModelSet::default();
        for (name, intercept) in models {
            set.artifacts.insert(name.to_string(), constant_model(name, *intercept));
        }
        for (name, w) in weights {
            set.weights.insert(name.to_string(), *w);
        }
        ArtifactDir::new(dir).commit(&set).await.unwrap();
    }

    #[tokio::test]
    async fn no_models_gives_empty_series() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let ensemble = ensemble_over(two_cities(), dir.path(), WeightPolicy::AsStored);

        let forecast = ensemble.predict_next_24(None).await;

        assert_eq!(forecast.baseline.unwrap().city, "Hyderabad");
        assert!(forecast.predictions.is_empty());
        assert!(forecast.ensemble.is_empty());
    }

    #[tokio::test]
    async fn empty_cache_gives_empty_forecast() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let ensemble = ensemble_over(MemoryStore::new(), dir.path(), WeightPolicy::AsStored);

        let forecast = ensemble.predict_next_24(Some("Hyderabad")).await;

        assert!(forecast.baseline.is_none());
        assert!(forecast.ensemble.is_empty());
    }

    #[tokio::test]
    async fn single_model_at_full_weight_is_the_ensemble() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        commit(dir.path(), &[("linear_regression", 50.0)], &[("linear_regression", 1.0)]).await;
        let ensemble = ensemble_over(two_cities(), dir.path(), WeightPolicy::AsStored);

        let forecast = ensemble.predict_next_24(Some("warangal")).await;

        let series = &forecast.predictions["linear_regression"];
        assert_eq!(series.len(), 24);
        assert_eq!(&forecast.ensemble, series);
        assert_eq!(forecast.baseline.unwrap().city, "Warangal");
        // 08:00 baseline, first point at 09:00.
        assert_eq!(series[0].target_time, start() + TimeDelta::hours(1));
        assert_eq!(series[0].predicted_aqi, 59.0);
        assert_eq!(series[23].predicted_aqi, 58.0);
    }

    #[tokio::test]
    async fn unknown_city_falls_back_to_most_polluted() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let ensemble = ensemble_over(two_cities(), dir.path(), WeightPolicy::AsStored);

        let forecast = ensemble.predict_next_24(Some("Atlantis")).await;

        assert_eq!(forecast.baseline.unwrap().city, "Hyderabad");
    }

    #[tokio::test]
    async fn missing_model_contributes_zero_unless_renormalized() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        commit(
            dir.path(),
            &[("linear_regression", 50.0)],
            &[("linear_regression", 0.5), ("random_forest", 0.5)],
        )
        .await;

        let stored = ensemble_over(two_cities(), dir.path(), WeightPolicy::AsStored)
            .predict_next_24(None)
            .await;
        assert_eq!(stored.ensemble[0].predicted_aqi, 29.5);

        let renormalized = ensemble_over(two_cities(), dir.path(), WeightPolicy::Renormalize)
            .predict_next_24(None)
            .await;
        assert_eq!(renormalized.ensemble[0].predicted_aqi, 59.0);
        assert_eq!(renormalized.ensemble_weights["linear_regression"], 1.0);
    }

    #[tokio::test]
    async fn training_needs_enough_readings() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let ensemble = ensemble_over(two_cities(), dir.path(), WeightPolicy::AsStored);

        let outcome = ensemble.train_if_needed(false).await.unwrap();

        assert_eq!(outcome, TrainOutcome::InsufficientData { records: 2 });
    }

    #[tokio::test]
    async fn train_then_predict_then_cached() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        store
            .extend((0..120).map(|h| {
                let city = ["Hyderabad", "Warangal", "Guntur"][(h % 3) as usize];
                stored(city, 20.0 + (h % 24) as f64 * 3.0, h)
            }))
            .unwrap();
        let ensemble = ensemble_over(store, dir.path(), WeightPolicy::AsStored);

        let TrainOutcome::Trained(report) = ensemble.train_if_needed(false).await.unwrap() else {
            panic!("expected a training run");
        };
        assert_eq!(report.training_records, 120);
        assert_eq!(report.models.len(), 2);
        let total: f64 = report.ensemble_weights.values().sum();
        assert!((total - 1.0).abs() < 1e-9);

        let forecast = ensemble.predict_next_24(Some("Guntur")).await;
        assert_eq!(forecast.predictions.len(), 2);
        assert_eq!(forecast.ensemble.len(), 24);

        assert_eq!(ensemble.train_if_needed(false).await.unwrap(), TrainOutcome::Cached);
        assert!(matches!(
            ensemble.train_if_needed(true).await.unwrap(),
            TrainOutcome::Trained(_)
        ));
    }

    #[tokio::test]
    async fn every_training_run_is_recorded() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        store
            .extend((0..60).map(|h| stored("Hyderabad", 30.0 + (h % 12) as f64, h)))
            .unwrap();
        let ensemble = ensemble_over(store, dir.path(), WeightPolicy::AsStored);

        let TrainOutcome::Trained(report) = ensemble.train_if_needed(true).await.unwrap() else {
            panic!("expected a training run");
        };
        ensemble.train_if_needed(true).await.unwrap();

        let history = ensemble.metrics_history(10).await;
        assert_eq!(history.len(), 4);
        assert!(history.iter().all(|r| r.training_records == 60));

        let runs: std::collections::BTreeSet<Uuid> = history.iter().map(|r| r.run_id).collect();
        assert_eq!(runs.len(), 2);
        let linear = history
            .iter()
            .find(|r| r.model == "linear_regression")
            .unwrap();
        assert_eq!(linear.r2, report.models["linear_regression"].r2);
    }

    #[tokio::test]
    async fn late_disk_load_keeps_freshly_trained_models() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        commit(dir.path(), &[("linear_regression", 10.0)], &[("linear_regression", 1.0)]).await;
        let ensemble = ensemble_over(two_cities(), dir.path(), WeightPolicy::AsStored);

        // A first forecast has read the old artifacts from disk while a
        // training run promotes a new set.
        let old = ensemble.artifacts.load(&ensemble.model_names()).await;
        assert!(!old.is_empty());
        let mut fresh = ModelSet::default();
        fresh
            .artifacts
            .insert("linear_regression".into(), constant_model("linear_regression", 90.0));
        fresh.weights.insert("linear_regression".into(), 1.0);
        ensemble.swap(fresh);

        let installed = ensemble.install_loaded(old);
        assert!(Arc::ptr_eq(&installed, &ensemble.current_models().await));

        let forecast = ensemble.predict_next_24(Some("Warangal")).await;
        assert_eq!(forecast.ensemble[0].predicted_aqi, 99.0);
    }

    #[test]
    fn weight_policy_parses() {
        // ---
        assert_eq!("renormalize".parse::<WeightPolicy>(), Ok(WeightPolicy::Renormalize));
        assert_eq!(" AS_STORED ".parse::<WeightPolicy>(), Ok(WeightPolicy::AsStored));
        assert!("blend".parse::<WeightPolicy>().is_err());
    }
}
