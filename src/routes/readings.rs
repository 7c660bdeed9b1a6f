// src/routes/readings.rs
//! Reading endpoints: latest snapshot, per-city history, map overlay and
//! ingest.

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::error::ApiError;
use crate::alerts::DEFAULT_RECENT_LIMIT;
use crate::aqi::{get_category_palette, rolling_average, UNKNOWN_CATEGORY};
use crate::models::{Alert, NewReading, Reading};
use crate::state::AppState;

// ---

const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Readings averaged into the history summary.
const SUMMARY_WINDOW: usize = 6;

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/latest", get(latest))
        .route("/api/history", get(history))
        .route("/api/mapdata", get(mapdata))
        .route("/api/ingest", post(ingest))
}

#[derive(Serialize)]
struct LatestResponse {
    /// Timestamp of the most polluted city's reading.
    updated_at: Option<DateTime<Utc>>,
    readings: Vec<Reading>,
    alerts: Vec<Alert>,
    palette: &'static BTreeMap<&'static str, &'static str>,
}

async fn latest(State(state): State<AppState>) -> impl IntoResponse {
    // ---
    let readings = state.cache.get(true).await;
    let alerts = state.alerts.get_recent(DEFAULT_RECENT_LIMIT).await;
    debug!(cities = readings.len(), alerts = alerts.len(), "GET /api/latest");

    Json(LatestResponse {
        updated_at: readings.first().map(|r| r.timestamp),
        readings: readings.to_vec(),
        alerts,
        palette: get_category_palette(),
    })
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    city: Option<String>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct HistorySummary {
    window: usize,
    /// Mean AQI of the newest `window` scored readings; 0 when none.
    rolling_aqi: f64,
}

impl HistorySummary {
    fn over(readings: &[Reading]) -> Self {
        // ---
        // Newest first on input, oldest first for the average.
        let aqis: Vec<f64> = readings
            .iter()
            .rev()
            .filter(|r| r.category != UNKNOWN_CATEGORY)
            .map(|r| f64::from(r.aqi))
            .collect();
        let rolling_aqi = (rolling_average(&aqis, SUMMARY_WINDOW) * 100.0).round() / 100.0;
        Self {
            window: SUMMARY_WINDOW,
            rolling_aqi,
        }
    }
}

#[derive(Serialize)]
struct HistoryResponse {
    city: String,
    readings: Vec<Reading>,
    summary: HistorySummary,
}

async fn history(
    Query(params): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> Result<Json<HistoryResponse>, ApiError> {
    // ---
    let city = params
        .city
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("city parameter is required".into()))?;
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);

    let readings = state.cache.history(city.trim(), limit).await;
    debug!(city = %city, count = readings.len(), "GET /api/history");

    let summary = HistorySummary::over(&readings);
    Ok(Json(HistoryResponse { city, readings, summary }))
}

async fn mapdata(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.overlay.build().await)
}

#[derive(Serialize)]
struct IngestResponse {
    inserted_id: Uuid,
}

/// Parses the body as JSON whatever the declared content type.
async fn ingest(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse, ApiError> {
    // ---
    if body.is_empty() {
        return Err(ApiError::BadRequest("Invalid payload".into()));
    }
    let reading: NewReading =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("Invalid payload: {e}")))?;
    reading.validate().map_err(ApiError::BadRequest)?;

    let id = state.cache.ingest(reading).await?;
    info!(%id, "POST /api/ingest");

    Ok((StatusCode::CREATED, Json(IngestResponse { inserted_id: id })))
}
