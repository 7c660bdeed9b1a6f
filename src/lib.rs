//! AeroSense: air quality scoring, alerting and forecasting service.
//!
//! The crate is laid out following the Explicit Module Boundary Pattern
//! (EMBP): each module exposes a small surface and the binary in `main.rs`
//! only wires them together.
//!
//! - [`aqi`]: pollutant breakpoints and AQI scoring
//! - [`cache`]: latest reading per city on a staleness policy
//! - [`alerts`]: threshold alerts with a retention sweep
//! - [`forecast`]: model training and the 24-hour ensemble forecast
//! - [`overlay`]: map markers plus district boundaries
//! - [`store`]: reading and alert persistence (Postgres or in-memory)
//! - [`routes`]: the axum HTTP surface

pub mod alerts;
pub mod aqi;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod forecast;
pub mod models;
pub mod overlay;
pub mod routes;
pub mod scheduler;
pub mod schema;
pub mod seed;
pub mod state;
pub mod store;

pub use config::Config;
pub use state::AppState;
