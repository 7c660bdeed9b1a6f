//! Persistence capabilities consumed by the cache, alert engine and
//! forecaster.
//!
//! Two implementations ship with the crate: [`PgStore`] backed by
//! PostgreSQL through `sqlx`, and [`MemoryStore`] used by tests and when no
//! `DATABASE_URL` is configured.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{Alert, ModelMetricsRecord, StoredReading};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ---

/// Reading persistence. Every optional pollutant field may be absent.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Persist one reading and return its id.
    async fn insert(&self, reading: &StoredReading) -> StoreResult<Uuid>;

    /// The most recent reading of every distinct city. Ties on timestamp
    /// within a city are resolved in store-defined order.
    async fn find_latest_per_city(&self) -> StoreResult<Vec<StoredReading>>;

    /// Readings of one city, newest first.
    async fn find_by_city(&self, city: &str, limit: usize) -> StoreResult<Vec<StoredReading>>;

    /// Readings of all cities, newest first.
    async fn find_recent(&self, limit: usize) -> StoreResult<Vec<StoredReading>>;
}

/// Alert persistence with time-based retention.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn insert_alerts(&self, alerts: &[Alert]) -> StoreResult<()>;

    /// Remove alerts strictly older than `cutoff`. Returns how many went.
    async fn delete_alerts_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    /// Alerts newest first.
    async fn find_recent_alerts(&self, limit: usize) -> StoreResult<Vec<Alert>>;
}

/// History of training runs, one record per trained model.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn insert_model_metrics(&self, records: &[ModelMetricsRecord]) -> StoreResult<()>;

    /// Records newest first.
    async fn find_recent_model_metrics(&self, limit: usize) -> StoreResult<Vec<ModelMetricsRecord>>;
}

/// Run a store call under `limit`, mapping an elapsed timer to
/// [`StoreError::Timeout`].
pub async fn bounded<T>(limit: Duration, call: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
    // ---
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
