//! Latest reading per city, refreshed on a staleness policy.
//!
//! The cache is the single source of truth for alerts, the map overlay and
//! the forecaster. It is refreshed in two ways: the background scheduler
//! calls [`LatestReadingCache::refresh`] on its interval, and every read
//! through [`LatestReadingCache::get`] refreshes synchronously once the data
//! is older than the staleness threshold, so a stalled scheduler never
//! leaves callers with old data.
//!
//! A store failure or timeout is treated as "confirmed empty": the entries
//! are cleared and the refresh time is still stamped, so a failing store is
//! not hammered by every caller.

use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::StoreResult;
use crate::models::{NewReading, Reading};
use crate::store::{bounded, ReadingStore};

// ---

/// Which path a refresh took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The store answered; `cities` entries are now cached.
    Refreshed { cities: usize },
    /// The store failed or timed out; the cache is now empty.
    DegradedEmpty { reason: String },
}

#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    // ---
    /// Maximum age before a read triggers a synchronous refresh.
    pub staleness: TimeDelta,
    /// Upper bound on every store call made through the cache.
    pub store_timeout: Duration,
    /// Cap on history queries.
    pub history_limit: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            staleness: TimeDelta::seconds(10),
            store_timeout: Duration::from_secs(2),
            history_limit: 500,
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    // ---
    entries: Arc<Vec<Reading>>,
    last_refreshed_at: Option<DateTime<Utc>>,
    last_outcome: Option<RefreshOutcome>,
    /// Bumped on every completed refresh.
    generation: u64,
    /// Bumped when a refresh issues its store query.
    started: u64,
    /// `started` value of the query behind the current entries.
    completed_start: u64,
}

pub struct LatestReadingCache {
    // ---
    store: Arc<dyn ReadingStore>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    state: RwLock<CacheState>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl LatestReadingCache {
    // ---
    pub fn new(store: Arc<dyn ReadingStore>, clock: Arc<dyn Clock>, settings: CacheSettings) -> Self {
        // ---
        Self {
            store,
            clock,
            settings,
            state: RwLock::new(CacheState::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Upper bound on every store call, reused by the alert engine and the
    /// forecaster.
    pub fn store_timeout(&self) -> Duration {
        self.settings.store_timeout
    }

    async fn bounded<T>(&self, call: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        bounded(self.settings.store_timeout, call).await
    }

    /// Replace the cached entries with the store's latest reading per city.
    ///
    /// Refreshes never interleave. A caller that had to wait for another
    /// refresh to finish returns that refresh's outcome instead of querying
    /// the store again.
    pub async fn refresh(&self) -> RefreshOutcome {
        // ---
        let seen = self.read_state().generation;
        let _guard = self.refresh_lock.lock().await;

        {
            let state = self.read_state();
            if state.generation != seen {
                if let Some(outcome) = state.last_outcome.clone() {
                    debug!(generation = state.generation, "Latest cache refresh coalesced");
                    return outcome;
                }
            }
        }

        self.query_and_replace().await
    }

    /// Like [`refresh`](Self::refresh), but only reuses a refresh whose
    /// store query began after this call. Writes that completed before the
    /// call are always reflected in the entries afterwards.
    async fn refresh_after_request(&self) -> RefreshOutcome {
        // ---
        let requested = self.read_state().started;
        let _guard = self.refresh_lock.lock().await;

        {
            let state = self.read_state();
            if state.completed_start > requested {
                if let Some(outcome) = state.last_outcome.clone() {
                    debug!(generation = state.generation, "Latest cache refresh coalesced");
                    return outcome;
                }
            }
        }

        self.query_and_replace().await
    }

    /// Query the store and swap in the result. Callers hold `refresh_lock`.
    async fn query_and_replace(&self) -> RefreshOutcome {
        // ---
        let ticket = {
            let mut state = self.write_state();
            state.started += 1;
            state.started
        };

        let (entries, outcome) = match self.bounded(self.store.find_latest_per_city()).await {
            Ok(rows) => {
                let mut entries: Vec<Reading> = rows.iter().map(|row| row.to_reading()).collect();
                // Most polluted city first. Stable, so equal AQIs keep store order.
                entries.sort_by(|a, b| b.aqi.cmp(&a.aqi));
                let cities = entries.len();
                debug!(cities, "Latest cache refreshed");
                (entries, RefreshOutcome::Refreshed { cities })
            }
            Err(e) => {
                warn!(error = %e, "Latest cache refresh failed, serving empty cache");
                (
                    Vec::new(),
                    RefreshOutcome::DegradedEmpty {
                        reason: e.to_string(),
                    },
                )
            }
        };

        let mut state = self.write_state();
        state.entries = Arc::new(entries);
        state.last_refreshed_at = Some(self.clock.now());
        state.last_outcome = Some(outcome.clone());
        state.generation += 1;
        state.completed_start = ticket;

        outcome
    }

    fn is_stale(&self) -> bool {
        // ---
        match self.read_state().last_refreshed_at {
            None => true,
            Some(at) => self.clock.now() - at > self.settings.staleness,
        }
    }

    /// Current entries, refreshing first when forced or stale. A forced
    /// read never settles for a refresh that was already querying the store.
    pub async fn get(&self, force: bool) -> Arc<Vec<Reading>> {
        // ---
        if force {
            self.refresh_after_request().await;
        } else if self.is_stale() {
            self.refresh().await;
        }
        self.snapshot()
    }

    /// Current entries without any refresh.
    pub fn snapshot(&self) -> Arc<Vec<Reading>> {
        Arc::clone(&self.read_state().entries)
    }

    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.read_state().last_refreshed_at
    }

    pub fn last_outcome(&self) -> Option<RefreshOutcome> {
        self.read_state().last_outcome.clone()
    }

    /// Readings of one city, newest first. Store failures yield an empty list.
    pub async fn history(&self, city: &str, limit: usize) -> Vec<Reading> {
        // ---
        let limit = limit.min(self.settings.history_limit);
        match self.bounded(self.store.find_by_city(city, limit)).await {
            Ok(rows) => rows.iter().map(|row| row.to_reading()).collect(),
            Err(e) => {
                warn!(city, error = %e, "History query failed");
                Vec::new()
            }
        }
    }

    /// Readings across all cities, newest first. Not capped by the history
    /// limit so training can ask for a larger window.
    pub async fn recent(&self, limit: usize) -> Vec<Reading> {
        // ---
        match self.bounded(self.store.find_recent(limit)).await {
            Ok(rows) => rows.iter().map(|row| row.to_reading()).collect(),
            Err(e) => {
                warn!(error = %e, "Recent readings query failed");
                Vec::new()
            }
        }
    }

    /// Persist a new reading and refresh the cache so it is visible once
    /// this returns, even when a scheduled refresh was already in flight.
    pub async fn ingest(&self, reading: NewReading) -> StoreResult<Uuid> {
        // ---
        let stored = reading.into_stored(Uuid::new_v4(), self.clock.now());
        let id = self.bounded(self.store.insert(&stored)).await?;
        info!(%id, city = %stored.city, "Reading ingested");

        self.refresh_after_request().await;
        Ok(id)
    }
}
