//! Shared application state handed to every route.

use std::sync::Arc;

use crate::alerts::AlertEngine;
use crate::cache::LatestReadingCache;
use crate::clock::Clock;
use crate::config::Config;
use crate::forecast::{ArtifactDir, ForecastEnsemble, LinearRegressionTrainer, RandomForestTrainer, Trainer};
use crate::overlay::MapOverlayBuilder;
use crate::scheduler::{Intervals, Scheduler};
use crate::store::{AlertStore, MetricsStore, ReadingStore};

// ---

#[derive(Clone)]
pub struct AppState {
    // ---
    pub cache: Arc<LatestReadingCache>,
    pub alerts: Arc<AlertEngine>,
    pub forecast: Arc<ForecastEnsemble>,
    pub overlay: Arc<MapOverlayBuilder>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire every component over the given stores and clock.
    pub fn build(
        config: Config,
        readings: Arc<dyn ReadingStore>,
        alert_store: Arc<dyn AlertStore>,
        metrics: Arc<dyn MetricsStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        // ---
        let cache = Arc::new(LatestReadingCache::new(readings, clock.clone(), config.cache_settings()));
        let alerts = Arc::new(AlertEngine::new(
            cache.clone(),
            alert_store,
            clock.clone(),
            config.sweep_policy,
        ));

        let trainers: Vec<Arc<dyn Trainer>> = vec![
            Arc::new(LinearRegressionTrainer::default()),
            Arc::new(RandomForestTrainer::default()),
        ];
        let forecast = Arc::new(ForecastEnsemble::new(
            cache.clone(),
            metrics,
            trainers,
            ArtifactDir::new(&config.models_dir),
            clock.clone(),
            config.weight_policy,
            config.train_history_limit,
        ));

        let overlay = Arc::new(MapOverlayBuilder::new(cache.clone(), clock, &config.geojson_path));

        Self {
            cache,
            alerts,
            forecast,
            overlay,
            config: Arc::new(config),
        }
    }

    pub fn scheduler(&self) -> Scheduler {
        // ---
        Scheduler::new(
            self.cache.clone(),
            self.alerts.clone(),
            self.forecast.clone(),
            Intervals {
                refresh_latest: self.config.refresh_latest_interval(),
                retrain: self.config.retrain_interval(),
                alerts: self.config.alert_interval(),
            },
        )
    }
}
