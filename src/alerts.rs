//! Threshold alerts derived from the latest-reading cache.
//!
//! Each refresh pass checks every city's latest reading against three fixed
//! thresholds and records one alert per city that tripped at least one of
//! them. Alerts older than the retention window are swept on the same pass.
//! Every alert store call is bounded by the cache's store timeout.

use std::str::FromStr;
use std::sync::Arc;

use chrono::TimeDelta;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::LatestReadingCache;
use crate::clock::Clock;
use crate::error::StoreResult;
use crate::models::{Alert, Reading};
use crate::store::{bounded, AlertStore};

// ---

/// Inclusive thresholds.
pub const AQI_THRESHOLD: i32 = 150;
pub const PM25_THRESHOLD: f64 = 90.0;
pub const PM10_THRESHOLD: f64 = 150.0;

/// Alerts older than this many hours are removed.
pub const ALERT_RETENTION_HOURS: i64 = 2;

pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// When the retention sweep runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SweepPolicy {
    /// Every refresh pass.
    #[default]
    Always,
    /// Only on passes that raise at least one alert. Stale alerts linger
    /// while nothing trips.
    OnNewAlerts,
}

impl FromStr for SweepPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(SweepPolicy::Always),
            "on_new_alerts" => Ok(SweepPolicy::OnNewAlerts),
            other => Err(format!("unknown sweep policy '{other}'")),
        }
    }
}

/// What one refresh pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertRefreshOutcome {
    // ---
    pub raised: usize,
    pub swept: u64,
    /// Another pass was already running; this one did nothing.
    pub coalesced: bool,
}

/// Messages for every threshold this reading trips, in a fixed order.
pub fn evaluate(reading: &Reading) -> Vec<String> {
    // ---
    let mut messages = Vec::new();

    if reading.aqi >= AQI_THRESHOLD {
        messages.push(format!(
            "AQI reached {} ({}) in {}.",
            reading.aqi, reading.category, reading.city
        ));
    }
    if let Some(pm25) = reading.pm25.filter(|v| *v >= PM25_THRESHOLD) {
        messages.push(format!("High PM2.5 concentration ({pm25:.1} µg/m³) detected."));
    }
    if let Some(pm10) = reading.pm10.filter(|v| *v >= PM10_THRESHOLD) {
        messages.push(format!("Elevated PM10 levels ({pm10:.1} µg/m³)."));
    }

    messages
}

pub struct AlertEngine {
    // ---
    cache: Arc<LatestReadingCache>,
    store: Arc<dyn AlertStore>,
    clock: Arc<dyn Clock>,
    policy: SweepPolicy,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl AlertEngine {
    // ---
    pub fn new(
        cache: Arc<LatestReadingCache>,
        store: Arc<dyn AlertStore>,
        clock: Arc<dyn Clock>,
        policy: SweepPolicy,
    ) -> Self {
        // ---
        Self {
            cache,
            store,
            clock,
            policy,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Scan the freshly refreshed cache and persist new alerts.
    ///
    /// An overlapping call returns immediately with `coalesced` set.
    pub async fn refresh(&self) -> StoreResult<AlertRefreshOutcome> {
        // ---
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            debug!("Alert refresh already running, skipping");
            return Ok(AlertRefreshOutcome {
                coalesced: true,
                ..AlertRefreshOutcome::default()
            });
        };

        let latest = self.cache.get(true).await;
        let now = self.clock.now();

        let alerts: Vec<Alert> = latest
            .iter()
            .filter_map(|reading| {
                let messages = evaluate(reading);
                if messages.is_empty() {
                    return None;
                }
                Some(Alert {
                    id: Uuid::new_v4(),
                    city: reading.city.clone(),
                    state: reading.state.clone(),
                    messages,
                    category: reading.category.to_string(),
                    aqi: reading.aqi,
                    color: reading.color.to_string(),
                    timestamp: now,
                })
            })
            .collect();

        let sweep = match self.policy {
            SweepPolicy::Always => true,
            SweepPolicy::OnNewAlerts => !alerts.is_empty(),
        };
        let limit = self.cache.store_timeout();
        let swept = if sweep {
            let cutoff = now - TimeDelta::hours(ALERT_RETENTION_HOURS);
            bounded(limit, self.store.delete_alerts_older_than(cutoff)).await?
        } else {
            0
        };

        if !alerts.is_empty() {
            bounded(limit, self.store.insert_alerts(&alerts)).await?;
        }

        info!(raised = alerts.len(), swept, "Alert refresh complete");
        Ok(AlertRefreshOutcome {
            raised: alerts.len(),
            swept,
            coalesced: false,
        })
    }

    /// Most recent alerts first. Store failures and timeouts yield an
    /// empty list.
    pub async fn get_recent(&self, limit: usize) -> Vec<Alert> {
        // ---
        match bounded(self.cache.store_timeout(), self.store.find_recent_alerts(limit)).await {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!(error = %e, "Recent alerts query failed");
                Vec::new()
            }
        }
    }
}
