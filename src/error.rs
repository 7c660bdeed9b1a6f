//! Error types for the store, training and model artifact layers.
//!
//! Startup and wiring code uses `anyhow::Result`; the components below
//! return these typed errors so callers can decide which failures degrade
//! to an empty result and which are reported.

use std::time::Duration;

/// Failures talking to the reading/alert store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An underlying database error.
    #[error("Store: database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store did not answer within the configured bound.
    #[error("Store: call timed out after {0:?}")]
    Timeout(Duration),

    /// The store is unusable for some other reason (e.g. a poisoned lock).
    #[error("Store: unavailable: {0}")]
    Unavailable(String),
}

/// Convenience `Result` alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures producing a model from historical readings.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("Training: {records} records available, at least {required} required")]
    InsufficientData { records: usize, required: usize },

    /// The data cannot be fitted (e.g. a singular system).
    #[error("Training: {0}")]
    Degenerate(String),
}

/// Failures reading or writing persisted model artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Artifact: I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures from the forecasting pipeline's training path.
#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Train(#[from] TrainError),

    /// The blocking training task panicked or was cancelled.
    #[error("Forecast: training task failed: {0}")]
    Task(String),
}
