//! Background jobs: latest-cache refresh, model training and alert refresh.
//!
//! Each job runs in its own task on a fixed interval with a short initial
//! delay so the server is accepting requests before the first pass. A failed
//! pass is logged and the loop carries on.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::alerts::AlertEngine;
use crate::cache::{LatestReadingCache, RefreshOutcome};
use crate::forecast::{ForecastEnsemble, TrainOutcome};

// ---

const CACHE_FIRST_RUN: Duration = Duration::from_secs(5);
const TRAIN_FIRST_RUN: Duration = Duration::from_secs(10);
const ALERTS_FIRST_RUN: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy)]
pub struct Intervals {
    // ---
    pub refresh_latest: Duration,
    pub retrain: Duration,
    pub alerts: Duration,
}

pub struct Scheduler {
    // ---
    cache: Arc<LatestReadingCache>,
    alerts: Arc<AlertEngine>,
    forecast: Arc<ForecastEnsemble>,
    intervals: Intervals,
}

impl Scheduler {
    // ---
    pub fn new(
        cache: Arc<LatestReadingCache>,
        alerts: Arc<AlertEngine>,
        forecast: Arc<ForecastEnsemble>,
        intervals: Intervals,
    ) -> Self {
        Self {
            cache,
            alerts,
            forecast,
            intervals,
        }
    }

    /// Spawn the three job loops. Dropping the handles leaves them running;
    /// abort them to stop.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        // ---
        tracing::info!(
            refresh_latest_secs = self.intervals.refresh_latest.as_secs(),
            retrain_secs = self.intervals.retrain.as_secs(),
            alerts_secs = self.intervals.alerts.as_secs(),
            "Scheduler started"
        );

        let cache = self.cache.clone();
        let refresh_latest = self.intervals.refresh_latest;
        let cache_job = tokio::spawn(async move {
            let mut tick = ticker(CACHE_FIRST_RUN, refresh_latest);
            loop {
                tick.tick().await;
                if let RefreshOutcome::DegradedEmpty { reason } = cache.refresh().await {
                    tracing::warn!(%reason, "Scheduled cache refresh degraded");
                }
            }
        });

        let forecast = self.forecast.clone();
        let retrain = self.intervals.retrain;
        let train_job = tokio::spawn(async move {
            let mut tick = ticker(TRAIN_FIRST_RUN, retrain);
            loop {
                tick.tick().await;
                match forecast.train_if_needed(false).await {
                    Ok(TrainOutcome::Trained(report)) => {
                        tracing::info!(records = report.training_records, "Scheduled training complete");
                    }
                    Ok(outcome) => tracing::debug!(?outcome, "Scheduled training skipped"),
                    Err(e) => tracing::error!(error = %e, "Scheduled training failed"),
                }
            }
        });

        let alerts = self.alerts.clone();
        let alert_interval = self.intervals.alerts;
        let alert_job = tokio::spawn(async move {
            let mut tick = ticker(ALERTS_FIRST_RUN, alert_interval);
            loop {
                tick.tick().await;
                if let Err(e) = alerts.refresh().await {
                    tracing::error!(error = %e, "Scheduled alert refresh failed");
                }
            }
        });

        vec![cache_job, train_job, alert_job]
    }
}

fn ticker(first_run: Duration, period: Duration) -> tokio::time::Interval {
    // ---
    let mut tick = interval_at(Instant::now() + first_run, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick
}
