//! Routes gateway (EMBP): merges every subrouter and applies CORS.

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::state::AppState;

mod error;
mod forecast;
mod health;
mod readings;

pub use error::ApiError;
pub use health::SERVICE_NAME;

// ---

pub fn router(state: AppState) -> Router {
    // ---
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .merge(readings::router())
        .merge(forecast::router())
        .merge(health::router())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    // ---
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
