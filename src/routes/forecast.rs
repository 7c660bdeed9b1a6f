// src/routes/forecast.rs
//! Forecast endpoints: 24-hour ensemble prediction, on-demand training and
//! the metrics history of past training runs.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::error::ApiError;
use crate::forecast::TrainOutcome;
use crate::state::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/predict", get(predict))
        .route("/api/train", post(train))
        .route("/api/metrics", get(metrics))
}

const DEFAULT_METRICS_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
struct PredictQuery {
    city: Option<String>,
}

async fn predict(Query(params): Query<PredictQuery>, State(state): State<AppState>) -> impl IntoResponse {
    // ---
    let city = params.city.as_deref().filter(|c| !c.trim().is_empty());
    Json(state.forecast.predict_next_24(city).await)
}

#[derive(Debug, Deserialize)]
struct TrainQuery {
    /// Retrain even when artifacts exist. Defaults to true.
    force: Option<bool>,
}

async fn train(Query(params): Query<TrainQuery>, State(state): State<AppState>) -> Result<Response, ApiError> {
    // ---
    let force = params.force.unwrap_or(true);
    let outcome = state.forecast.train_if_needed(force).await?;
    info!(force, ?outcome, "POST /api/train");

    let body = match outcome {
        TrainOutcome::Trained(report) => Json(report).into_response(),
        TrainOutcome::Cached => Json(json!({ "status": "cached" })).into_response(),
        TrainOutcome::InsufficientData { records } => {
            Json(json!({ "status": "no-data", "records": records })).into_response()
        }
    };
    Ok(body)
}

#[derive(Debug, Deserialize)]
struct MetricsQuery {
    limit: Option<usize>,
}

async fn metrics(Query(params): Query<MetricsQuery>, State(state): State<AppState>) -> impl IntoResponse {
    // ---
    let limit = params.limit.unwrap_or(DEFAULT_METRICS_LIMIT);
    let records = state.forecast.metrics_history(limit).await;
    Json(json!({ "metrics": records }))
}
