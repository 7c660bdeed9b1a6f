//! Training capability and the design matrix it consumes.

use chrono::{DateTime, Utc};

use super::artifact::{ModelArtifact, ModelMetrics, Predictor};
use super::features::{align, derive_row, training_schema};
use crate::aqi::UNKNOWN_CATEGORY;
use crate::error::TrainError;
use crate::models::Reading;

// ---

/// Fewer usable readings than this and no model is trained.
pub const MIN_TRAINING_RECORDS: usize = 50;

/// Aligned feature rows and their AQI targets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSet {
    // ---
    pub schema: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl TrainingSet {
    /// Build the matrix from historical readings. Readings with no scorable
    /// pollutant carry no target and are left out.
    pub fn from_readings(readings: &[Reading]) -> Self {
        // ---
        let usable: Vec<Reading> = readings
            .iter()
            .filter(|r| r.category != UNKNOWN_CATEGORY)
            .cloned()
            .collect();
        let schema = training_schema(&usable);

        let rows = usable
            .iter()
            .map(|r| align(&schema, &derive_row(r, r.timestamp)))
            .collect();
        let targets = usable.iter().map(|r| f64::from(r.aqi)).collect();

        TrainingSet {
            schema,
            rows,
            targets,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Something that can fit an AQI model to a training set.
pub trait Trainer: Send + Sync {
    // ---
    /// Stable model name, also the artifact file stem.
    fn name(&self) -> &'static str;

    /// Fit predictor parameters.
    fn fit(&self, set: &TrainingSet) -> Result<Predictor, TrainError>;

    /// Fit, score on the training rows, and package the result.
    fn train(&self, set: &TrainingSet, trained_at: DateTime<Utc>) -> Result<ModelArtifact, TrainError> {
        // ---
        if set.len() < MIN_TRAINING_RECORDS {
            return Err(TrainError::InsufficientData {
                records: set.len(),
                required: MIN_TRAINING_RECORDS,
            });
        }

        let predictor = self.fit(set)?;
        let predicted: Vec<f64> = set.rows.iter().map(|row| predictor.predict(row)).collect();
        let metrics = ModelMetrics::score(&set.targets, &predicted);

        Ok(ModelArtifact {
            name: self.name().to_string(),
            feature_schema: set.schema.clone(),
            predictor,
            metrics,
            training_records: set.len(),
            trained_at,
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::forecast::linear::LinearRegressionTrainer;
    use crate::models::StoredReading;
    use chrono::{TimeDelta, TimeZone};
    use uuid::Uuid;

    fn readings(count: usize) -> Vec<Reading> {
        // ---
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                StoredReading {
                    id: Uuid::new_v4(),
                    city: if i % 2 == 0 { "Hyderabad" } else { "Warangal" }.to_string(),
                    state: "Telangana".to_string(),
                    latitude: 17.0,
                    longitude: 78.0,
                    pm25: Some(10.0 + i as f64),
                    pm10: Some(40.0),
                    co2: None,
                    no2: None,
                    temperature: Some(30.0),
                    humidity: Some(50.0),
                    timestamp: start + TimeDelta::hours(i as i64),
                }
                .to_reading()
            })
            .collect()
    }

    #[test]
    fn unscorable_readings_are_left_out() {
        // ---
        let mut all = readings(4);
        all[1].category = UNKNOWN_CATEGORY;

        let set = TrainingSet::from_readings(&all);

        assert_eq!(set.len(), 3);
        assert_eq!(set.targets[0], f64::from(all[0].aqi));
        assert!(set.rows.iter().all(|row| row.len() == set.schema.len()));
    }

    #[test]
    fn train_refuses_small_sets() {
        // ---
        let set = TrainingSet::from_readings(&readings(MIN_TRAINING_RECORDS - 1));

        let result = LinearRegressionTrainer::default().train(&set, Utc::now());

        assert!(matches!(
            result,
            Err(TrainError::InsufficientData { records: 49, required: 50 })
        ));
    }

    #[test]
    fn train_scores_and_packages_the_model() {
        // ---
        let set = TrainingSet::from_readings(&readings(80));
        let at = Utc.with_ymd_and_hms(2025, 6, 9, 0, 0, 0).unwrap();

        let artifact = LinearRegressionTrainer::default().train(&set, at).unwrap();

        assert_eq!(artifact.name, "linear_regression");
        assert_eq!(artifact.training_records, 80);
        assert_eq!(artifact.feature_schema, set.schema);
        assert_eq!(artifact.trained_at, at);
        assert!(artifact.metrics.r2 > 0.5, "{:?}", artifact.metrics);
    }
}
