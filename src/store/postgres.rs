//! PostgreSQL store built on a shared `sqlx` connection pool.
//!
//! Tables are created by [`crate::schema::create_schema`] on startup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AlertStore, MetricsStore, ReadingStore};
use crate::error::StoreResult;
use crate::models::{Alert, ModelMetricsRecord, StoredReading};

// ---

const READING_COLUMNS: &str = r#"
    id, city, state, latitude, longitude,
    pm25, pm10, co2, no2, temperature, humidity,
    timestamp_utc AS "timestamp"
"#;

#[derive(Debug, Clone)]
pub struct PgStore {
    // ---
    pool: PgPool,
}

impl PgStore {
    // ---
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl ReadingStore for PgStore {
    // ---
    async fn insert(&self, reading: &StoredReading) -> StoreResult<Uuid> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO readings (
                id, city, state, latitude, longitude,
                pm25, pm10, co2, no2, temperature, humidity,
                timestamp_utc
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(reading.id)
        .bind(&reading.city)
        .bind(&reading.state)
        .bind(reading.latitude)
        .bind(reading.longitude)
        .bind(reading.pm25)
        .bind(reading.pm10)
        .bind(reading.co2)
        .bind(reading.no2)
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(reading.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(reading.id)
    }

    async fn find_latest_per_city(&self) -> StoreResult<Vec<StoredReading>> {
        // ---
        // DISTINCT ON keeps the first row per city under the ORDER BY.
        let sql = format!(
            "SELECT DISTINCT ON (city) {READING_COLUMNS} FROM readings \
             ORDER BY city, timestamp_utc DESC"
        );
        let rows = sqlx::query_as::<_, StoredReading>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn find_by_city(&self, city: &str, limit: usize) -> StoreResult<Vec<StoredReading>> {
        // ---
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM readings WHERE city = $1 \
             ORDER BY timestamp_utc DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, StoredReading>(&sql)
            .bind(city)
            .bind(sql_limit(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn find_recent(&self, limit: usize) -> StoreResult<Vec<StoredReading>> {
        // ---
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM readings ORDER BY timestamp_utc DESC LIMIT $1"
        );
        let rows = sqlx::query_as::<_, StoredReading>(&sql)
            .bind(sql_limit(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl AlertStore for PgStore {
    // ---
    async fn insert_alerts(&self, alerts: &[Alert]) -> StoreResult<()> {
        // ---
        let mut tx = self.pool.begin().await?;

        for alert in alerts {
            sqlx::query(
                r#"
                INSERT INTO alerts (id, city, state, messages, category, aqi, color, timestamp_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(alert.id)
            .bind(&alert.city)
            .bind(&alert.state)
            .bind(&alert.messages)
            .bind(&alert.category)
            .bind(alert.aqi)
            .bind(&alert.color)
            .bind(alert.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_alerts_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        // ---
        let result = sqlx::query("DELETE FROM alerts WHERE timestamp_utc < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_recent_alerts(&self, limit: usize) -> StoreResult<Vec<Alert>> {
        // ---
        let rows = sqlx::query_as::<_, Alert>(
            r#"
            SELECT id, city, state, messages, category, aqi, color,
                   timestamp_utc AS "timestamp"
            FROM alerts
            ORDER BY timestamp_utc DESC
            LIMIT $1
            "#,
        )
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl MetricsStore for PgStore {
    // ---
    async fn insert_model_metrics(&self, records: &[ModelMetricsRecord]) -> StoreResult<()> {
        // ---
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO model_metrics (
                    id, run_id, model, r2, mae, rmse, weight, training_records, trained_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(record.id)
            .bind(record.run_id)
            .bind(&record.model)
            .bind(record.r2)
            .bind(record.mae)
            .bind(record.rmse)
            .bind(record.weight)
            .bind(record.training_records)
            .bind(record.trained_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_recent_model_metrics(&self, limit: usize) -> StoreResult<Vec<ModelMetricsRecord>> {
        // ---
        let rows = sqlx::query_as::<_, ModelMetricsRecord>(
            r#"
            SELECT id, run_id, model, r2, mae, rmse, weight, training_records, trained_at
            FROM model_metrics
            ORDER BY trained_at DESC, model
            LIMIT $1
            "#,
        )
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
