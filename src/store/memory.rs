//! In-process store. Backs the test suite and local runs without Postgres.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AlertStore, MetricsStore, ReadingStore};
use crate::error::{StoreError, StoreResult};
use crate::models::{Alert, ModelMetricsRecord, StoredReading};

// ---

#[derive(Debug, Default)]
pub struct MemoryStore {
    // ---
    readings: RwLock<Vec<StoredReading>>,
    alerts: RwLock<Vec<Alert>>,
    model_metrics: RwLock<Vec<ModelMetricsRecord>>,
}

fn read<T>(lock: &RwLock<T>) -> StoreResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> StoreResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
}

/// Newest first; equal timestamps keep insertion order.
fn newest_first(mut rows: Vec<StoredReading>, limit: usize) -> Vec<StoredReading> {
    // ---
    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    rows.truncate(limit);
    rows
}

impl MemoryStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk load, used for demo seeding and test fixtures.
    pub fn extend(&self, readings: impl IntoIterator<Item = StoredReading>) -> StoreResult<()> {
        // ---
        write(&self.readings)?.extend(readings);
        Ok(())
    }

    pub fn reading_count(&self) -> usize {
        read(&self.readings).map(|rows| rows.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    // ---
    async fn insert(&self, reading: &StoredReading) -> StoreResult<Uuid> {
        // ---
        write(&self.readings)?.push(reading.clone());
        Ok(reading.id)
    }

    async fn find_latest_per_city(&self) -> StoreResult<Vec<StoredReading>> {
        // ---
        let rows = read(&self.readings)?;
        let mut latest: BTreeMap<&str, &StoredReading> = BTreeMap::new();

        for row in rows.iter() {
            let newer = latest
                .get(row.city.as_str())
                .map_or(true, |current| row.timestamp > current.timestamp);
            if newer {
                latest.insert(row.city.as_str(), row);
            }
        }

        Ok(latest.into_values().cloned().collect())
    }

    async fn find_by_city(&self, city: &str, limit: usize) -> StoreResult<Vec<StoredReading>> {
        // ---
        let rows = read(&self.readings)?;
        let matching = rows.iter().filter(|r| r.city == city).cloned().collect();
        Ok(newest_first(matching, limit))
    }

    async fn find_recent(&self, limit: usize) -> StoreResult<Vec<StoredReading>> {
        // ---
        let rows = read(&self.readings)?.clone();
        Ok(newest_first(rows, limit))
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    // ---
    async fn insert_alerts(&self, alerts: &[Alert]) -> StoreResult<()> {
        // ---
        write(&self.alerts)?.extend_from_slice(alerts);
        Ok(())
    }

    async fn delete_alerts_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        // ---
        let mut alerts = write(&self.alerts)?;
        let before = alerts.len();
        alerts.retain(|a| a.timestamp >= cutoff);
        Ok((before - alerts.len()) as u64)
    }

    async fn find_recent_alerts(&self, limit: usize) -> StoreResult<Vec<Alert>> {
        // ---
        let mut alerts = read(&self.alerts)?.clone();
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        alerts.truncate(limit);
        Ok(alerts)
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    // ---
    async fn insert_model_metrics(&self, records: &[ModelMetricsRecord]) -> StoreResult<()> {
        // ---
        write(&self.model_metrics)?.extend_from_slice(records);
        Ok(())
    }

    async fn find_recent_model_metrics(&self, limit: usize) -> StoreResult<Vec<ModelMetricsRecord>> {
        // ---
        let mut records = read(&self.model_metrics)?.clone();
        records.sort_by(|a, b| b.trained_at.cmp(&a.trained_at));
        records.truncate(limit);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{Duration, TimeZone};

    fn reading(city: &str, hours: i64, pm25: f64) -> StoredReading {
        // ---
        StoredReading {
            id: Uuid::new_v4(),
            city: city.to_string(),
            state: "Telangana".to_string(),
            latitude: 17.0,
            longitude: 78.0,
            pm25: Some(pm25),
            pm10: None,
            co2: None,
            no2: None,
            temperature: None,
            humidity: None,
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap() + Duration::hours(hours),
        }
    }

    #[tokio::test]
    async fn latest_per_city_takes_newest_row() {
        // ---
        let store = MemoryStore::new();
        store
            .extend([
                reading("Hyderabad", 1, 10.0),
                reading("Hyderabad", 3, 30.0),
                reading("Warangal", 2, 20.0),
                reading("Hyderabad", 2, 20.0),
            ])
            .unwrap();

        let latest = store.find_latest_per_city().await.unwrap();

        assert_eq!(latest.len(), 2);
        let hyd = latest.iter().find(|r| r.city == "Hyderabad").unwrap();
        assert_eq!(hyd.pm25, Some(30.0));
    }

    #[tokio::test]
    async fn history_is_newest_first_and_capped() {
        // ---
        let store = MemoryStore::new();
        for h in 0..5 {
            store.insert(&reading("Guntur", h, h as f64)).await.unwrap();
        }
        store.insert(&reading("Tirupati", 10, 1.0)).await.unwrap();

        let rows = store.find_by_city("Guntur", 3).await.unwrap();
        let values: Vec<_> = rows.iter().map(|r| r.pm25.unwrap()).collect();
        assert_eq!(values, vec![4.0, 3.0, 2.0]);

        let recent = store.find_recent(2).await.unwrap();
        assert_eq!(recent[0].city, "Tirupati");
        assert_eq!(recent.len(), 2);
    }

    #[tokio::test]
    async fn alert_retention_deletes_strictly_older() {
        // ---
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let alert = |age_minutes: i64| Alert {
            id: Uuid::new_v4(),
            city: "Hyderabad".into(),
            state: "Telangana".into(),
            messages: vec!["test".into()],
            category: "Unhealthy".into(),
            aqi: 160,
            color: "#FF0000".into(),
            timestamp: now - Duration::minutes(age_minutes),
        };
        store
            .insert_alerts(&[alert(10), alert(120), alert(180)])
            .await
            .unwrap();

        let removed = store
            .delete_alerts_older_than(now - Duration::hours(2))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        let left = store.find_recent_alerts(10).await.unwrap();
        assert_eq!(left.len(), 2);
        assert!(left[0].timestamp > left[1].timestamp);
    }

    #[tokio::test]
    async fn model_metrics_are_newest_first() {
        // ---
        let store = MemoryStore::new();
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let record = |hours: i64, model: &str| ModelMetricsRecord {
            id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            model: model.into(),
            r2: 0.8,
            mae: 4.0,
            rmse: 5.0,
            weight: 0.5,
            training_records: 120,
            trained_at: at + Duration::hours(hours),
        };
        store
            .insert_model_metrics(&[record(0, "linear_regression"), record(2, "random_forest")])
            .await
            .unwrap();

        let recent = store.find_recent_model_metrics(1).await.unwrap();

        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].model, "random_forest");
    }
}
