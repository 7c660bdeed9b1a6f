//! Database schema management for `aerosense`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` when a `DATABASE_URL` is set.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `readings` table for raw measurements, the `alerts` table
/// for threshold alerts and the `model_metrics` table holding the metrics of
/// every training run. AQI fields are not stored: they are recomputed from
/// the pollutant columns on every read. Safe to call on every startup.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS readings (
            id            UUID PRIMARY KEY,
            city          TEXT             NOT NULL,
            state         TEXT             NOT NULL,
            latitude      DOUBLE PRECISION NOT NULL,
            longitude     DOUBLE PRECISION NOT NULL,
            pm25          DOUBLE PRECISION,
            pm10          DOUBLE PRECISION,
            co2           DOUBLE PRECISION,
            no2           DOUBLE PRECISION,
            temperature   DOUBLE PRECISION,
            humidity      DOUBLE PRECISION,
            timestamp_utc TIMESTAMPTZ      NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id            UUID PRIMARY KEY,
            city          TEXT        NOT NULL,
            state         TEXT        NOT NULL,
            messages      TEXT[]      NOT NULL,
            category      TEXT        NOT NULL,
            aqi           INTEGER     NOT NULL,
            color         TEXT        NOT NULL,
            timestamp_utc TIMESTAMPTZ NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_metrics (
            id               UUID PRIMARY KEY,
            run_id           UUID             NOT NULL,
            model            TEXT             NOT NULL,
            r2               DOUBLE PRECISION NOT NULL,
            mae              DOUBLE PRECISION NOT NULL,
            rmse             DOUBLE PRECISION NOT NULL,
            weight           DOUBLE PRECISION NOT NULL,
            training_records BIGINT           NOT NULL,
            trained_at       TIMESTAMPTZ      NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Serves latest-per-city and per-city history.
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_readings_city_timestamp
            ON readings (city, timestamp_utc DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_readings_timestamp
            ON readings (timestamp_utc DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_alerts_timestamp
            ON alerts (timestamp_utc DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_model_metrics_trained_at
            ON model_metrics (trained_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
