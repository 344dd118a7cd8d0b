use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::formats::{NormalizedListing, SnapshotSource};

pub type Snapshot = Arc<[NormalizedListing]>;

/// The cached catalog handed to readers. Cloning shares the same snapshot.
#[derive(Debug, Clone)]
pub struct CachedCatalog {
    pub listings: Snapshot,
    pub source: SnapshotSource,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Entry {
    catalog: CachedCatalog,
    stored_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    entry: Option<Entry>,
    generation: u64,
}

/// Time-bounded single-snapshot cache with single-flight refresh.
#[derive(Debug)]
pub struct SnapshotCache {
    window: Duration,
    state: Mutex<State>,
    refresh: tokio::sync::Mutex<()>,
}

impl SnapshotCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(State::default()),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fresh(&self) -> Option<CachedCatalog> {
        let state = self.lock();
        let entry = state.entry.as_ref()?;
        (entry.stored_at.elapsed() < self.window).then(|| entry.catalog.clone())
    }

    /// Returns the cached catalog while it is inside the window, otherwise
    /// runs `fetch` and replaces the cache with its result. Concurrent misses
    /// share one fetch.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> CachedCatalog
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CachedCatalog>,
    {
        if let Some(catalog) = self.fresh() {
            return catalog;
        }

        let _refreshing = self.refresh.lock().await;
        if let Some(catalog) = self.fresh() {
            return catalog;
        }

        let (started, generation) = (Instant::now(), self.lock().generation);
        let catalog = fetch().await;

        let mut state = self.lock();
        if state.generation == generation {
            state.entry = Some(Entry {
                catalog: catalog.clone(),
                stored_at: started,
            });
        } else {
            tracing::debug!("cache invalidated during fetch; result not stored");
        }
        catalog
    }

    /// Drops the cached snapshot; the next read re-fetches.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.entry = None;
        state.generation = state.generation.wrapping_add(1);
    }
}
