// Catalog browsing: the filter view-model and the shared snapshot service

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast::error::RecvError, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::backend::{Backend, BackendError, VehicleQuery};
use crate::models::{FilterError, FilterKey, FilterState, FilterValue, Vehicle};
use crate::realtime::ChangeFeed;

// --- View-model ---

/// Filtered view over one immutable vehicle snapshot.
///
/// The snapshot is shared, never mutated; the visible list is a set of
/// indices into it, recomputed synchronously after every filter change or
/// source replacement.
#[derive(Debug, Clone)]
pub struct CatalogViewModel {
    source: Arc<[Vehicle]>,
    filters: FilterState,
    visible: Vec<usize>,
}

impl CatalogViewModel {
    pub fn new(source: Arc<[Vehicle]>) -> Self {
        let mut vm = CatalogViewModel { source, filters: FilterState::default(), visible: Vec::new() };
        vm.recompute();
        vm
    }

    pub fn with_filters(source: Arc<[Vehicle]>, filters: FilterState) -> Self {
        let mut vm = CatalogViewModel { source, filters, visible: Vec::new() };
        vm.recompute();
        vm
    }

    pub fn set_filter(&mut self, key: FilterKey, value: Option<FilterValue>) -> Result<(), FilterError> {
        self.filters.set(key, value)?;
        self.recompute();
        Ok(())
    }

    pub fn clear_filters(&mut self) {
        self.filters = FilterState::default();
        self.recompute();
    }

    pub fn replace_source(&mut self, source: Arc<[Vehicle]>) {
        self.source = source;
        self.recompute();
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn has_active_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    // Source order is kept; it is already featured-first, newest-first
    pub fn visible_vehicles(&self) -> Vec<&Vehicle> {
        self.visible.iter().map(|&i| &self.source[i]).collect()
    }

    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }

    pub fn total_count(&self) -> usize {
        self.source.len()
    }

    pub fn brands(&self) -> Vec<String> {
        crate::backend::distinct_brands(self.source.iter().map(|v| v.brand.as_str()))
    }

    fn recompute(&mut self) {
        self.visible = self
            .source
            .iter()
            .enumerate()
            .filter(|(_, vehicle)| self.filters.matches(vehicle))
            .map(|(i, _)| i)
            .collect();
        tracing::debug!(visible = self.visible.len(), total = self.source.len(), "Catalog filters applied");
    }
}

// --- Shared snapshot service ---

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    // Delay before retry number `attempt` (0-based): base * 2^attempt, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub vehicles: Arc<[Vehicle]>,
    pub error: Option<String>, // Set when the last fetch failed; vehicles is then empty
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Default for CatalogSnapshot {
    fn default() -> Self {
        CatalogSnapshot { vehicles: Arc::from(Vec::new()), error: None, fetched_at: None }
    }
}

pub struct CatalogService {
    backend: Arc<dyn Backend>,
    retry: RetryPolicy,
    snapshot: RwLock<CatalogSnapshot>,
}

impl CatalogService {
    pub fn new(backend: Arc<dyn Backend>, retry: RetryPolicy) -> Self {
        CatalogService { backend, retry, snapshot: RwLock::new(CatalogSnapshot::default()) }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub async fn snapshot(&self) -> CatalogSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Refetch the full list and swap the snapshot.
    ///
    /// Failures degrade to an empty snapshot carrying a message.
    pub async fn refresh(&self) -> CatalogSnapshot {
        let fresh = match self.fetch_with_retry().await {
            Ok(vehicles) => {
                tracing::info!("Catalog refreshed with {} vehicles", vehicles.len());
                CatalogSnapshot { vehicles: Arc::from(vehicles), error: None, fetched_at: Some(Utc::now()) }
            }
            Err(e) => {
                tracing::error!("Catalog refresh failed: {}", e);
                CatalogSnapshot {
                    vehicles: Arc::from(Vec::new()),
                    error: Some(format!("Failed to load vehicles: {}", e)),
                    fetched_at: Some(Utc::now()),
                }
            }
        };
        *self.snapshot.write().await = fresh.clone();
        fresh
    }

    async fn fetch_with_retry(&self) -> Result<Vec<Vehicle>, BackendError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            tracing::debug!(attempt, "Fetch attempt {}/{}", attempt + 1, attempts);
            match self.backend.list_vehicles(&VehicleQuery::catalog()).await {
                Ok(vehicles) => return Ok(vehicles),
                Err(e) if attempt + 1 < attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(attempt, error = %e, ?delay, "Vehicle fetch failed. Retrying...");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Refetch on every change notification. Bursts of notifications that
    /// arrive while a refetch is pending collapse into one refetch.
    pub fn spawn_change_listener(self: Arc<Self>, feed: &ChangeFeed) -> JoinHandle<()> {
        let mut rx = feed.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        while rx.try_recv().is_ok() {}
                        self.refresh().await;
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!("Change feed closed, stopping catalog listener");
                        break;
                    }
                }
            }
        })
    }
}
