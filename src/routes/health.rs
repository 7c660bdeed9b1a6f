// src/routes/health.rs
//! Liveness endpoints for the AeroSense API.
//!
//! `/health` is used by container orchestrators and CI pipelines to verify
//! that the service is running; `/` answers with a short banner. Neither
//! touches the store. It follows the Explicit Module Boundary Pattern (EMBP):
//! - Internal to this file: endpoint handlers and their response types
//! - Exports to the gateway (`mod.rs`): a subrouter with both routes

use axum::{routing::get, Json, Router};
use serde::Serialize;

// ---

pub const SERVICE_NAME: &str = "AeroSense API";

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
}

/// Handle `GET /health`.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
    })
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse { message: SERVICE_NAME })
}

/// Create a subrouter containing the `/health` and `/` routes.
///
/// Generic over the application state so it merges cleanly with the
/// gateway router whatever its state type.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health)).route("/", get(root))
}
