//! Configuration loader for the `aerosense` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Components never read the environment themselves;
//! they receive the values they need from [`Config`] at construction.
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use chrono::TimeDelta;

use crate::alerts::SweepPolicy;
use crate::cache::CacheSettings;
use crate::forecast::WeightPolicy;

/// Parse an optional variable with `FromStr`, falling back to a default.
macro_rules! parse_env {
    ($lookup:expr, $var_name:expr, $ty:ty, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string variable, falling back to a default.
macro_rules! env_or {
    ($lookup:expr, $var_name:expr, $default:expr) => {
        $lookup($var_name).unwrap_or_else(|| $default.to_string())
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string. Unset means the in-memory store.
    pub db_url: Option<String>,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    pub bind_addr: SocketAddr,

    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,

    /// Directory holding model artifacts and ensemble weights.
    pub models_dir: PathBuf,

    /// District boundary GeoJSON served with the map overlay.
    pub geojson_path: PathBuf,

    pub cache_staleness_secs: u32,
    pub store_timeout_ms: u64,
    pub history_limit: usize,
    pub train_history_limit: usize,

    pub refresh_latest_interval_secs: u64,
    pub alert_interval_minutes: u64,
    pub retrain_interval_minutes: u64,

    pub sweep_policy: SweepPolicy,
    pub weight_policy: WeightPolicy,

    /// Fill an empty in-memory store with synthetic readings on startup.
    pub seed_demo_data: bool,
}

fn parse_flag(value: &str) -> Result<bool> {
    // ---
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(anyhow!("expected a boolean, got '{other}'")),
    }
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `DATABASE_URL` – PostgreSQL connection string (default: in-memory store)
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `BIND_ADDR` – listen address (default: `0.0.0.0:8080`)
/// - `CORS_ORIGINS` – comma separated origins
/// - `MODELS_DIR`, `GEOJSON_PATH` – artifact and boundary locations
/// - `CACHE_STALENESS_SECS` (10), `STORE_TIMEOUT_MS` (2000)
/// - `HISTORY_LIMIT` (500), `TRAIN_HISTORY_LIMIT` (1000)
/// - `REFRESH_LATEST_INTERVAL_SECS` (5), `ALERT_INTERVAL_MINUTES` (5),
///   `RETRAIN_INTERVAL_MINUTES` (30)
/// - `ALERT_SWEEP_POLICY` (`always`), `ENSEMBLE_WEIGHT_POLICY` (`as_stored`)
/// - `SEED_DEMO_DATA` (false)
///
/// Returns an error if any variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    load_with(|name| env::var(name).ok())
}

/// Load configuration through `lookup` instead of the process environment.
pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
    // ---
    let db_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
    let db_pool_max = parse_env!(lookup, "DB_POOL_MAX", u32, 5);
    let bind_addr = parse_env!(lookup, "BIND_ADDR", SocketAddr, SocketAddr::from(([0, 0, 0, 0], 8080)));

    let cors_origins = env_or!(lookup, "CORS_ORIGINS", "http://localhost:5173,http://127.0.0.1:5173")
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect();

    let models_dir = PathBuf::from(env_or!(lookup, "MODELS_DIR", "./models"));
    let geojson_path = PathBuf::from(env_or!(lookup, "GEOJSON_PATH", "./data/geo/ts_ap_districts.geojson"));

    let cache_staleness_secs = parse_env!(lookup, "CACHE_STALENESS_SECS", u32, 10);
    let store_timeout_ms = parse_env!(lookup, "STORE_TIMEOUT_MS", u64, 2000);
    let history_limit = parse_env!(lookup, "HISTORY_LIMIT", usize, 500);
    let train_history_limit = parse_env!(lookup, "TRAIN_HISTORY_LIMIT", usize, 1000);

    let refresh_latest_interval_secs = parse_env!(lookup, "REFRESH_LATEST_INTERVAL_SECS", u64, 5);
    let alert_interval_minutes = parse_env!(lookup, "ALERT_INTERVAL_MINUTES", u64, 5);
    let retrain_interval_minutes = parse_env!(lookup, "RETRAIN_INTERVAL_MINUTES", u64, 30);

    let sweep_policy = parse_env!(lookup, "ALERT_SWEEP_POLICY", SweepPolicy, SweepPolicy::Always);
    let weight_policy = parse_env!(lookup, "ENSEMBLE_WEIGHT_POLICY", WeightPolicy, WeightPolicy::AsStored);

    let seed_demo_data = lookup("SEED_DEMO_DATA")
        .map(|v| parse_flag(&v))
        .transpose()
        .map_err(|e| anyhow!("Invalid SEED_DEMO_DATA: {}", e))?
        .unwrap_or(false);

    for (name, value) in [
        ("REFRESH_LATEST_INTERVAL_SECS", refresh_latest_interval_secs),
        ("ALERT_INTERVAL_MINUTES", alert_interval_minutes),
        ("RETRAIN_INTERVAL_MINUTES", retrain_interval_minutes),
        ("STORE_TIMEOUT_MS", store_timeout_ms),
    ] {
        if value == 0 {
            bail!("Invalid {}: must be greater than zero", name);
        }
    }

    Ok(Config {
        db_url,
        db_pool_max,
        bind_addr,
        cors_origins,
        models_dir,
        geojson_path,
        cache_staleness_secs,
        store_timeout_ms,
        history_limit,
        train_history_limit,
        refresh_latest_interval_secs,
        alert_interval_minutes,
        retrain_interval_minutes,
        sweep_policy,
        weight_policy,
        seed_demo_data,
    })
}

/// Replace the password in a connection string with `****`.
pub fn mask_db_url(url: &str) -> String {
    // ---
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // `scheme://host@...` has no password; only the scheme colon precedes `//`.
            if !url[colon_pos..].starts_with("://") {
                return format!("{}:****{}", &url[..colon_pos], &url[at_pos..]);
            }
        }
    }
    url.to_string()
}

impl Config {
    // ---
    pub fn cache_settings(&self) -> CacheSettings {
        // ---
        CacheSettings {
            staleness: TimeDelta::seconds(i64::from(self.cache_staleness_secs)),
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            history_limit: self.history_limit,
        }
    }

    pub fn refresh_latest_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_latest_interval_secs)
    }

    pub fn alert_interval(&self) -> Duration {
        Duration::from_secs(self.alert_interval_minutes * 60)
    }

    pub fn retrain_interval(&self) -> Duration {
        Duration::from_secs(self.retrain_interval_minutes * 60)
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the database password while showing all configuration values
    /// that were loaded.
    pub fn log_config(&self) {
        // ---
        let db = self
            .db_url
            .as_deref()
            .map(mask_db_url)
            .unwrap_or_else(|| "(unset, in-memory store)".to_string());

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL                 : {}", db);
        tracing::info!("  DB_POOL_MAX                  : {}", self.db_pool_max);
        tracing::info!("  BIND_ADDR                    : {}", self.bind_addr);
        tracing::info!("  CORS_ORIGINS                 : {}", self.cors_origins.join(","));
        tracing::info!("  MODELS_DIR                   : {}", self.models_dir.display());
        tracing::info!("  GEOJSON_PATH                 : {}", self.geojson_path.display());
        tracing::info!("  CACHE_STALENESS_SECS         : {}", self.cache_staleness_secs);
        tracing::info!("  STORE_TIMEOUT_MS             : {}", self.store_timeout_ms);
        tracing::info!("  HISTORY_LIMIT                : {}", self.history_limit);
        tracing::info!("  TRAIN_HISTORY_LIMIT          : {}", self.train_history_limit);
        tracing::info!("  REFRESH_LATEST_INTERVAL_SECS : {}", self.refresh_latest_interval_secs);
        tracing::info!("  ALERT_INTERVAL_MINUTES       : {}", self.alert_interval_minutes);
        tracing::info!("  RETRAIN_INTERVAL_MINUTES     : {}", self.retrain_interval_minutes);
        tracing::info!("  ALERT_SWEEP_POLICY           : {:?}", self.sweep_policy);
        tracing::info!("  ENSEMBLE_WEIGHT_POLICY       : {:?}", self.weight_policy);
        tracing::info!("  SEED_DEMO_DATA               : {}", self.seed_demo_data);
    }
}
