//! Application entry point for the `aerosense` service.
//!
//! This binary orchestrates the full startup sequence, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Choosing the store: PostgreSQL when `DATABASE_URL` is set (schema
//!   created if missing), otherwise an in-memory store, optionally seeded
//!   with synthetic readings
//! - Starting the background scheduler
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! - `DATABASE_URL` (optional) – PostgreSQL connection string
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See [`aerosense::config`] for the full list.
use std::env;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use chrono::Utc;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use aerosense::clock::SystemClock;
use aerosense::store::{AlertStore, MemoryStore, MetricsStore, PgStore, ReadingStore};
use aerosense::{config, routes, schema, seed, AppState};

// ---

const DEMO_DAYS: u32 = 7;
const DEMO_INTERVAL_MINUTES: u32 = 60;
const DEMO_SEED: u64 = 42;

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    type Stores = (Arc<dyn ReadingStore>, Arc<dyn AlertStore>, Arc<dyn MetricsStore>);
    let (readings, alerts, metrics): Stores = match cfg.db_url.as_deref() {
        Some(db_url) => {
            tracing::info!("Attempting to connect to database: {}", config::mask_db_url(db_url));

            let pool = PgPoolOptions::new()
                .max_connections(cfg.db_pool_max)
                .connect(db_url)
                .await
                .map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to connect to database '{}': {}",
                        config::mask_db_url(db_url),
                        e
                    )
                })?;

            tracing::info!("Successfully connected to database");
            schema::create_schema(&pool).await?;

            let store = Arc::new(PgStore::new(pool));
            (
                store.clone() as Arc<dyn ReadingStore>,
                store.clone() as Arc<dyn AlertStore>,
                store as Arc<dyn MetricsStore>,
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            let store = Arc::new(MemoryStore::new());
            if cfg.seed_demo_data {
                let demo = seed::generate_readings(DEMO_DAYS, DEMO_INTERVAL_MINUTES, Utc::now(), DEMO_SEED);
                store.extend(demo)?;
                tracing::info!(count = store.reading_count(), "Seeded in-memory store with demo readings");
            }
            (
                store.clone() as Arc<dyn ReadingStore>,
                store.clone() as Arc<dyn AlertStore>,
                store as Arc<dyn MetricsStore>,
            )
        }
    };

    let bind_addr = cfg.bind_addr;
    let state = AppState::build(cfg, readings, alerts, metrics, Arc::new(SystemClock));
    let _jobs = state.scheduler().spawn();

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(state);

    tracing::info!("Listening on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AXUM_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, else the `AXUM_LOG_LEVEL` env var
///
/// Call once at startup before any logging macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to AXUM_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
