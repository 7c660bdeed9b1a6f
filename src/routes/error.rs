//! JSON error responses for the API routes.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;

use crate::error::{ForecastError, StoreError};

// ---

#[derive(Debug)]
pub enum ApiError {
    /// Malformed or incomplete request (400).
    BadRequest(String),
    /// The store could not be reached (503).
    Unavailable(String),
    /// Anything else (500).
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

impl From<ForecastError> for ApiError {
    fn from(e: ForecastError) -> Self {
        ApiError::Internal(e.to_string())
    }
}
