//! Feature rows for the forecasting models.
//!
//! A model declares an ordered feature schema when it is trained. Rows are
//! built as name → value maps and then aligned to a schema by explicit name
//! lookup, with 0.0 for any feature the row does not carry (for instance a
//! city the model never saw).

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::models::Reading;

// ---

/// Measurement features, in schema order. Missing measurements become 0.0.
pub const MEASUREMENT_FEATURES: [&str; 8] = [
    "latitude",
    "longitude",
    "pm25",
    "pm10",
    "co2",
    "no2",
    "temperature",
    "humidity",
];

/// Time features derived from the row's timestamp.
pub const TIME_FEATURES: [&str; 2] = ["hour", "dayofweek"];

const CITY_PREFIX: &str = "city_";

pub type FeatureRow = HashMap<String, f64>;

pub fn city_feature(city: &str) -> String {
    format!("{CITY_PREFIX}{city}")
}

/// Build the feature row for `reading` as if it were observed at `at`.
///
/// Time features come from `at`, so a forecast can shift the baseline
/// forward hour by hour. Day of week counts from Monday = 0.
pub fn derive_row(reading: &Reading, at: DateTime<Utc>) -> FeatureRow {
    // ---
    let measurements = [
        reading.latitude,
        reading.longitude,
        reading.pm25.unwrap_or(0.0),
        reading.pm10.unwrap_or(0.0),
        reading.co2.unwrap_or(0.0),
        reading.no2.unwrap_or(0.0),
        reading.temperature.unwrap_or(0.0),
        reading.humidity.unwrap_or(0.0),
    ];

    let mut row: FeatureRow = MEASUREMENT_FEATURES
        .iter()
        .zip(measurements)
        .map(|(name, value)| (name.to_string(), value))
        .collect();

    row.insert("hour".to_string(), f64::from(at.hour()));
    row.insert(
        "dayofweek".to_string(),
        f64::from(at.weekday().num_days_from_monday()),
    );
    row.insert(city_feature(&reading.city), 1.0);

    row
}

/// Schema for a training run: measurements, time features, then one
/// indicator column per city except the alphabetically first one, which is
/// the implicit baseline.
pub fn training_schema(readings: &[Reading]) -> Vec<String> {
    // ---
    let cities: BTreeSet<&str> = readings.iter().map(|r| r.city.as_str()).collect();

    MEASUREMENT_FEATURES
        .iter()
        .chain(TIME_FEATURES.iter())
        .map(|name| name.to_string())
        .chain(cities.into_iter().skip(1).map(city_feature))
        .collect()
}

/// Order `row` by `schema`. Unknown features default to 0.0; features the
/// schema does not name are dropped.
pub fn align(schema: &[String], row: &FeatureRow) -> Vec<f64> {
    // ---
    schema
        .iter()
        .map(|name| row.get(name).copied().unwrap_or(0.0))
        .collect()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::StoredReading;
    use chrono::{TimeDelta, TimeZone};
    use uuid::Uuid;

    fn reading(city: &str) -> Reading {
        // ---
        StoredReading {
            id: Uuid::new_v4(),
            city: city.into(),
            state: "Telangana".into(),
            latitude: 17.385,
            longitude: 78.4867,
            pm25: Some(42.0),
            pm10: None,
            co2: Some(550.0),
            no2: Some(30.0),
            temperature: Some(31.0),
            humidity: Some(55.0),
            // A Sunday.
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 22, 0, 0).unwrap(),
        }
        .to_reading()
    }

    #[test]
    fn time_features_follow_the_shifted_timestamp() {
        // ---
        let r = reading("Hyderabad");

        let same = derive_row(&r, r.timestamp);
        assert_eq!(same["hour"], 22.0);
        assert_eq!(same["dayofweek"], 6.0);

        let later = derive_row(&r, r.timestamp + TimeDelta::hours(3));
        assert_eq!(later["hour"], 1.0);
        assert_eq!(later["dayofweek"], 0.0);
    }

    #[test]
    fn missing_measurements_become_zero() {
        // ---
        let row = derive_row(&reading("Hyderabad"), Utc::now());

        assert_eq!(row["pm10"], 0.0);
        assert_eq!(row["pm25"], 42.0);
        assert_eq!(row["city_Hyderabad"], 1.0);
    }

    #[test]
    fn schema_drops_first_city() {
        // ---
        let readings = vec![reading("Warangal"), reading("Guntur"), reading("Hyderabad"), reading("Guntur")];

        let schema = training_schema(&readings);

        assert_eq!(schema.len(), MEASUREMENT_FEATURES.len() + TIME_FEATURES.len() + 2);
        assert!(!schema.contains(&"city_Guntur".to_string()));
        assert_eq!(schema[schema.len() - 2], "city_Hyderabad");
        assert_eq!(schema[schema.len() - 1], "city_Warangal");
    }

    #[test]
    fn align_fills_unseen_features_with_zero() {
        // ---
        let schema: Vec<String> = ["pm25", "city_Tirupati", "hour"].iter().map(|s| s.to_string()).collect();
        let r = reading("Hyderabad");
        let row = derive_row(&r, r.timestamp);

        assert_eq!(align(&schema, &row), vec![42.0, 0.0, 22.0]);
    }
}
