//! Map overlay: per-city AQI markers plus district boundaries.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use geojson::GeoJson;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::cache::LatestReadingCache;
use crate::clock::Clock;

// ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityOverlay {
    // ---
    pub city: String,
    pub state: String,
    /// `[latitude, longitude]`
    pub location: [f64; 2],
    pub aqi: i32,
    pub category: &'static str,
    pub color: &'static str,
    pub health: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapOverlay {
    // ---
    pub updated_at: DateTime<Utc>,
    pub cities: Vec<CityOverlay>,
    pub geojson: Value,
}

fn empty_feature_collection() -> Value {
    json!({ "type": "FeatureCollection", "features": [] })
}

/// Accept only a well-formed GeoJSON `FeatureCollection`.
fn parse_boundaries(bytes: &[u8]) -> Result<Value, String> {
    // ---
    let value: Value = serde_json::from_slice(bytes).map_err(|e| format!("not valid JSON: {e}"))?;
    match GeoJson::from_json_value(value.clone()) {
        Ok(GeoJson::FeatureCollection(_)) => Ok(value),
        Ok(_) => Err("not a FeatureCollection".to_string()),
        Err(e) => Err(format!("not valid GeoJSON: {e}")),
    }
}

pub struct MapOverlayBuilder {
    // ---
    cache: Arc<LatestReadingCache>,
    clock: Arc<dyn Clock>,
    geojson_path: PathBuf,
    boundaries: tokio::sync::OnceCell<Value>,
}

impl MapOverlayBuilder {
    // ---
    pub fn new(cache: Arc<LatestReadingCache>, clock: Arc<dyn Clock>, geojson_path: impl Into<PathBuf>) -> Self {
        // ---
        Self {
            cache,
            clock,
            geojson_path: geojson_path.into(),
            boundaries: tokio::sync::OnceCell::new(),
        }
    }

    /// Boundary GeoJSON, read on first use and kept for the builder's
    /// lifetime. A missing file, or one that is not a GeoJSON
    /// `FeatureCollection`, yields an empty collection.
    pub async fn boundaries(&self) -> &Value {
        // ---
        self.boundaries
            .get_or_init(|| async {
                let path = &self.geojson_path;
                match tokio::fs::read(path).await {
                    Ok(bytes) => match parse_boundaries(&bytes) {
                        Ok(value) => {
                            info!(path = %path.display(), "Boundary GeoJSON loaded");
                            value
                        }
                        Err(reason) => {
                            warn!(path = %path.display(), %reason, "Ignoring boundary file");
                            empty_feature_collection()
                        }
                    },
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Boundary GeoJSON unavailable");
                        empty_feature_collection()
                    }
                }
            })
            .await
    }

    pub async fn build(&self) -> MapOverlay {
        // ---
        let latest = self.cache.get(false).await;
        let cities = latest
            .iter()
            .map(|r| CityOverlay {
                city: r.city.clone(),
                state: r.state.clone(),
                location: [r.latitude, r.longitude],
                aqi: r.aqi,
                category: r.category,
                color: r.color,
                health: r.health,
            })
            .collect();

        MapOverlay {
            updated_at: self.clock.now(),
            cities,
            geojson: self.boundaries().await.clone(),
        }
    }
}
