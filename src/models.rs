//! Data models for air quality readings and alerts.
//!
//! Readings come in three shapes:
//! - [`NewReading`]: the ingest payload, loosely typed and validated at the boundary
//! - [`StoredReading`]: what the store keeps (raw measurements only)
//! - [`Reading`]: what callers see, with AQI fields recomputed on every read

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aqi::{compute_aqi, Pollutant, Pollutants};

// ---

fn default_state() -> String {
    "Telangana".to_string()
}

/// Ingest payload for `POST /api/ingest`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReading {
    // ---
    pub city: String,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub co2: Option<f64>,
    pub no2: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    /// Defaults to the time the payload was received.
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewReading {
    /// Reject payloads the core should never see.
    pub fn validate(&self) -> Result<(), String> {
        // ---
        if self.city.trim().is_empty() {
            return Err("city must not be empty".to_string());
        }

        let measurements = [
            ("latitude", Some(self.latitude)),
            ("longitude", Some(self.longitude)),
            ("pm25", self.pm25),
            ("pm10", self.pm10),
            ("co2", self.co2),
            ("no2", self.no2),
            ("temperature", self.temperature),
            ("humidity", self.humidity),
        ];
        for (name, value) in measurements {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(format!("{name} must be a finite number"));
            }
        }

        Ok(())
    }

    pub fn into_stored(self, id: Uuid, received_at: DateTime<Utc>) -> StoredReading {
        // ---
        StoredReading {
            id,
            city: self.city.trim().to_string(),
            state: self.state,
            latitude: self.latitude,
            longitude: self.longitude,
            pm25: self.pm25,
            pm10: self.pm10,
            co2: self.co2,
            no2: self.no2,
            temperature: self.temperature,
            humidity: self.humidity,
            timestamp: self.timestamp.unwrap_or(received_at),
        }
    }
}

/// Raw reading as persisted. Carries no AQI fields.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredReading {
    // ---
    pub id: Uuid,
    pub city: String,
    pub state: String,
    pub latitude: f64,
    pub longitude: f64,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub co2: Option<f64>,
    pub no2: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl StoredReading {
    // ---
    pub fn pollutants(&self) -> Pollutants {
        // ---
        Pollutants {
            pm25: self.pm25,
            pm10: self.pm10,
            no2: self.no2,
            co2: self.co2,
        }
    }

    /// Attach freshly computed AQI metadata.
    pub fn to_reading(&self) -> Reading {
        // ---
        let meta = compute_aqi(&self.pollutants());

        Reading {
            id: self.id,
            city: self.city.clone(),
            state: self.state.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            pm25: self.pm25,
            pm10: self.pm10,
            co2: self.co2,
            no2: self.no2,
            temperature: self.temperature,
            humidity: self.humidity,
            aqi: meta.aqi,
            category: meta.category,
            color: meta.color,
            health: meta.health,
            primary_pollutant: meta.primary_pollutant,
            timestamp: self.timestamp,
        }
    }
}

/// Reading served to API callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    // ---
    pub id: Uuid,
    pub city: String,
    pub state: String,
    pub latitude: f64,
    pub longitude: f64,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub co2: Option<f64>,
    pub no2: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub aqi: i32,
    pub category: &'static str,
    pub color: &'static str,
    pub health: &'static str,
    pub primary_pollutant: Option<Pollutant>,
    pub timestamp: DateTime<Utc>,
}

/// A threshold alert raised for one city during one refresh pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Alert {
    // ---
    pub id: Uuid,
    pub city: String,
    pub state: String,
    pub messages: Vec<String>,
    pub category: String,
    pub aqi: i32,
    pub color: String,
    pub timestamp: DateTime<Utc>,
}

/// Metrics of one model from one training run. Records of the same run
/// share a `run_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ModelMetricsRecord {
    // ---
    pub id: Uuid,
    pub run_id: Uuid,
    pub model: String,
    pub r2: f64,
    pub mae: f64,
    pub rmse: f64,
    pub weight: f64,
    pub training_records: i64,
    pub trained_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn create_test_stored_reading(pm25: Option<f64>, pm10: Option<f64>) -> StoredReading {
        // ---
        StoredReading {
            id: Uuid::new_v4(),
            city: "Hyderabad".to_string(),
            state: "Telangana".to_string(),
            latitude: 17.385,
            longitude: 78.4867,
            pm25,
            pm10,
            co2: None,
            no2: None,
            temperature: Some(31.0),
            humidity: Some(55.0),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap(),
        }
    }

    #[test]
    fn test_aqi_fields_are_derived_from_pollutants() {
        // ---
        let reading = create_test_stored_reading(Some(35.4), Some(20.0)).to_reading();

        assert_eq!(reading.aqi, 100);
        assert_eq!(reading.category, "Moderate");
        assert_eq!(reading.primary_pollutant, Some(Pollutant::Pm25));
    }

    #[test]
    fn test_missing_pollutants_give_unknown() {
        // ---
        let reading = create_test_stored_reading(None, None).to_reading();

        assert_eq!(reading.aqi, 0);
        assert_eq!(reading.category, "Unknown");
        assert_eq!(reading.health, "Insufficient data");
    }

    #[test]
    fn test_data_preservation() {
        // ---
        let stored = create_test_stored_reading(Some(12.5), None);
        let reading = stored.to_reading();

        assert_eq!(reading.id, stored.id);
        assert_eq!(reading.city, "Hyderabad");
        assert_eq!(reading.state, "Telangana");
        assert_eq!(reading.pm25, Some(12.5));
        assert_eq!(reading.pm10, None);
        assert_eq!(reading.temperature, Some(31.0));
        assert_eq!(reading.timestamp, stored.timestamp);
    }

    #[test]
    fn test_new_reading_defaults() {
        // ---
        let payload: NewReading =
            serde_json::from_str(r#"{"city": " Warangal ", "pm25": 40.0}"#).unwrap();
        assert!(payload.validate().is_ok());

        let received_at = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let stored = payload.into_stored(Uuid::nil(), received_at);

        assert_eq!(stored.city, "Warangal");
        assert_eq!(stored.state, "Telangana");
        assert_eq!(stored.latitude, 0.0);
        assert_eq!(stored.pm10, None);
        assert_eq!(stored.timestamp, received_at);
    }

    #[test]
    fn test_new_reading_validation() {
        // ---
        let blank: NewReading = serde_json::from_str(r#"{"city": "  "}"#).unwrap();
        assert!(blank.validate().is_err());

        let missing_city = serde_json::from_str::<NewReading>(r#"{"pm25": 10.0}"#);
        assert!(missing_city.is_err());
    }

    #[test]
    fn test_reading_serializes_primary_pollutant_lowercase() {
        // ---
        let reading = create_test_stored_reading(Some(40.0), None).to_reading();
        let json = serde_json::to_value(&reading).unwrap();

        assert_eq!(json["primary_pollutant"], "pm25");
        assert_eq!(json["pm10"], serde_json::Value::Null);
        assert_eq!(json["aqi"], 112);
    }
}
