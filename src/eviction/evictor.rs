//! Beacon Cache Evictor
//!
//! Background task that executes the eviction strategies every time the
//! cache signals new data. Notifications arriving while strategies run are
//! coalesced into one more run.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{EvictionStrategy, SpaceEvictionStrategy, TimeEvictionStrategy};
use crate::cache::BeaconCache;
use crate::config::BeaconCacheConfig;
use crate::domain::ports::{ObserverId, TimingProvider};
use crate::error::{Error, Result};

type Strategies = Arc<Mutex<Vec<Box<dyn EvictionStrategy>>>>;

/// State of a started evictor
struct Running {
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
    observer: ObserverId,
}

/// Runs eviction strategies against a cache in the background
pub struct BeaconCacheEvictor {
    cache: Arc<BeaconCache>,
    strategies: Strategies,
    notify: Arc<Notify>,
    running: Mutex<Option<Running>>,
}

impl BeaconCacheEvictor {
    /// Create an evictor with the time and space strategies from `config`
    pub fn new(
        cache: Arc<BeaconCache>,
        config: &BeaconCacheConfig,
        timing: Arc<dyn TimingProvider>,
    ) -> Self {
        let strategies: Vec<Box<dyn EvictionStrategy>> = vec![
            Box::new(TimeEvictionStrategy::new(config.max_record_age_ms, timing)),
            Box::new(SpaceEvictionStrategy::new(
                config.cache_size_lower_bound,
                config.cache_size_upper_bound,
            )),
        ];
        Self::with_strategies(cache, strategies)
    }

    /// Create an evictor running custom strategies in the given order
    pub fn with_strategies(
        cache: Arc<BeaconCache>,
        strategies: Vec<Box<dyn EvictionStrategy>>,
    ) -> Self {
        Self {
            cache,
            strategies: Arc::new(Mutex::new(strategies)),
            notify: Arc::new(Notify::new()),
            running: Mutex::new(None),
        }
    }

    /// Start the background task on the current Tokio runtime.
    ///
    /// Returns `Ok(false)` if the evictor is already running.
    pub fn start(&self) -> Result<bool> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Internal(format!("Evictor requires a Tokio runtime: {}", e)))?;

        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!("Beacon cache evictor already running");
            return Ok(false);
        }
        if let Some(stale) = running.take() {
            self.cache.remove_observer(stale.observer);
        }

        let notify = Arc::clone(&self.notify);
        let observer = self
            .cache
            .add_observer(Arc::new(move || notify.notify_one()));

        let shutdown = CancellationToken::new();
        let handle = runtime.spawn(run(
            Arc::clone(&self.cache),
            Arc::clone(&self.strategies),
            Arc::clone(&self.notify),
            shutdown.clone(),
        ));

        *running = Some(Running {
            handle,
            shutdown,
            observer,
        });
        info!("Beacon cache evictor started");
        Ok(true)
    }

    /// Stop the background task and wait up to `timeout` for it to finish.
    ///
    /// Returns true if the task has finished (or was never started).
    pub async fn stop(&self, timeout: Duration) -> bool {
        let running = self.running.lock().take();
        let Some(mut running) = running else {
            return true;
        };

        self.cache.remove_observer(running.observer);
        running.shutdown.cancel();

        match tokio::time::timeout(timeout, &mut running.handle).await {
            Ok(Ok(())) => {
                info!("Beacon cache evictor stopped");
                true
            }
            Ok(Err(e)) => {
                warn!("Beacon cache evictor task failed: {}", e);
                true
            }
            Err(_) => {
                warn!(?timeout, "Beacon cache evictor did not stop in time, aborting");
                running.handle.abort();
                false
            }
        }
    }

    /// Whether the background task is running
    pub fn is_alive(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl std::fmt::Debug for BeaconCacheEvictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeaconCacheEvictor")
            .field("strategies", &self.strategies.lock().len())
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[instrument(skip_all)]
async fn run(
    cache: Arc<BeaconCache>,
    strategies: Strategies,
    notify: Arc<Notify>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = notify.notified() => {
                // Eviction passes lock entries and can be long, keep them off the workers
                let cache = Arc::clone(&cache);
                let strategies = Arc::clone(&strategies);
                let token = shutdown.clone();
                let pass = tokio::task::spawn_blocking(move || {
                    run_strategies(&cache, &strategies, &token)
                });
                if let Err(e) = pass.await {
                    warn!("Eviction pass failed: {}", e);
                }
            }
        }
    }
    debug!("Beacon cache evictor loop exited");
}

fn run_strategies(cache: &BeaconCache, strategies: &Strategies, shutdown: &CancellationToken) {
    let mut strategies = strategies.lock();
    for strategy in strategies.iter_mut() {
        if shutdown.is_cancelled() {
            break;
        }
        debug!(strategy = strategy.name(), "Running eviction strategy");
        strategy.execute(cache, shutdown);
    }
}

// =============================================================================
// Tests
// =============================================================================
