//! Bounded pool of reusable rendering engines, plus a secondary bounded
//! pool of rendering contexts.
//!
//! A pre-warmed `VecDeque` behind a `tokio::sync::Mutex`, a `Drop`-based
//! guard returning engines, and a background keepalive health-check loop
//! make up the lifecycle machinery. Pool sizing is fixed at
//! `min(max_concurrent_requests, 3)` with a hard ceiling of 5, rather
//! than scaling dynamically with `target = in_use + 2`. The pooled unit
//! is split two ways: an engine (this module) holds the actual browser
//! process, while a context (`context.rs`) is the short-lived per-page
//! session borrowed from it.

pub mod context;
pub mod request_filter;

use anyhow::{Context as _, Result};
use chromiumoxide::browser::Browser;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::PoolError;
pub use context::RenderingContext;
use request_filter::RequestFilter;

const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(50);
const WAIT_SAMPLE_CAPACITY: usize = 100;

/// Configuration for the browser pool. `pool_size` is fixed for the
/// pool's lifetime; its default is computed as
/// `min(max_concurrent_requests, 3)` with a hard ceiling of 5.
#[derive(Debug, Clone)]
pub struct BrowserPoolConfig {
    pub pool_size: usize,
    pub max_contexts_per_engine: usize,
    pub keepalive_interval: Duration,
    pub acquire_timeout: Duration,
    pub headless: bool,
}

impl BrowserPoolConfig {
    #[must_use]
    pub fn for_concurrency(max_concurrent_requests: usize) -> Self {
        Self {
            pool_size: max_concurrent_requests.min(3).max(1).min(5),
            ..Self::default()
        }
    }
}

impl Default for BrowserPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 3,
            max_contexts_per_engine: 4,
            keepalive_interval: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(30),
            headless: true,
        }
    }
}

#[derive(Debug)]
pub struct PooledBrowserWrapper {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl PooledBrowserWrapper {
    pub(crate) fn new(browser: Browser, handler: JoinHandle<()>, user_data_dir: PathBuf) -> Self {
        Self {
            browser: Arc::new(browser),
            handler,
            user_data_dir: Some(user_data_dir),
        }
    }

    #[must_use]
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    #[must_use]
    pub fn browser_arc(&self) -> Arc<Browser> {
        Arc::clone(&self.browser)
    }

    pub fn browser_mut(&mut self) -> Option<&mut Browser> {
        Arc::get_mut(&mut self.browser)
    }

    fn cleanup_temp_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!("failed to clean up engine temp directory {}: {e}", path.display());
            }
        }
    }
}

impl Drop for PooledBrowserWrapper {
    fn drop(&mut self) {
        self.handler.abort();
        self.cleanup_temp_dir();
    }
}

#[derive(Debug)]
struct PooledEngine {
    id: u64,
    wrapper: PooledBrowserWrapper,
    last_health_check: Instant,
}

/// Rolling stats describing the pool's current state, surfaced for
/// diagnostics.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct BrowserPoolStats {
    pub total_engines: usize,
    pub active: usize,
    pub available: usize,
    pub total_acquisitions: u64,
    pub average_wait_ms: f64,
    pub peak_concurrent_use: usize,
}

/// Bounded ring of the last `WAIT_SAMPLE_CAPACITY` acquisition wait times,
/// for `average_wait_ms`.
#[derive(Debug, Default)]
struct WaitSamples {
    samples: VecDeque<f64>,
}

impl WaitSamples {
    fn push(&mut self, ms: f64) {
        if self.samples.len() >= WAIT_SAMPLE_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(ms);
    }

    fn average(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().sum::<f64>() / self.samples.len() as f64
        }
    }
}

pub struct BrowserPool {
    config: BrowserPoolConfig,
    available: Mutex<VecDeque<PooledEngine>>,
    in_use_count: AtomicUsize,
    next_id: AtomicU64,
    total_acquisitions: AtomicU64,
    peak_concurrent_use: AtomicUsize,
    wait_samples: Mutex<WaitSamples>,
    context_permits: Semaphore,
    request_filter: Arc<RequestFilter>,
    keepalive_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

impl BrowserPool {
    #[must_use]
    pub fn new(config: BrowserPoolConfig) -> Arc<Self> {
        let context_capacity = config.pool_size * config.max_contexts_per_engine;
        Arc::new(Self {
            config,
            available: Mutex::new(VecDeque::new()),
            in_use_count: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            total_acquisitions: AtomicU64::new(0),
            peak_concurrent_use: AtomicUsize::new(0),
            wait_samples: Mutex::new(WaitSamples::default()),
            context_permits: Semaphore::new(context_capacity),
            request_filter: Arc::new(RequestFilter::new()),
            keepalive_handle: Mutex::new(None),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Pre-warm to `pool_size` and start the keepalive health-check loop.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        info!("starting browser pool: {} engines", self.config.pool_size);

        let futs: Vec<_> = (0..self.config.pool_size)
            .map(|_| self.launch_engine())
            .collect();
        let results = futures::future::join_all(futs).await;

        let mut available = self.available.lock().await;
        for result in results {
            match result {
                Ok(engine) => available.push_back(engine),
                Err(e) => warn!("failed to launch engine during pool warm-up: {e}"),
            }
        }
        drop(available);

        let pool = Arc::clone(self);
        let handle = tokio::spawn(async move { keepalive_loop(pool).await });
        *self.keepalive_handle.lock().await = Some(handle);

        Ok(())
    }

    /// Acquire an engine. Blocks until one is available or
    /// `config.acquire_timeout` elapses (30s default), at which point it
    /// fails with pool-exhausted.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledBrowserGuard, PoolError> {
        let start = Instant::now();
        loop {
            if start.elapsed() >= self.config.acquire_timeout {
                return Err(PoolError::AcquireTimeout(self.config.acquire_timeout));
            }

            let mut available = self.available.lock().await;
            if let Some(mut engine) = available.pop_front() {
                drop(available);
                match engine.wrapper.browser().version().await {
                    Ok(_) => {
                        engine.last_health_check = Instant::now();
                        self.record_acquisition(start.elapsed()).await;
                        return Ok(PooledBrowserGuard {
                            engine: Some(engine),
                            pool: Arc::clone(self),
                        });
                    }
                    Err(e) => {
                        warn!("engine {} failed health check on acquire, replacing: {e}", engine.id);
                        self.replace_engine_in_background(engine.id);
                        continue;
                    }
                }
            }
            drop(available);

            tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
        }
    }

    /// Acquire an engine and open a rendering context on it, applying the
    /// per-page optimizations.
    pub async fn with_context(
        self: &Arc<Self>,
        request_timeout: Duration,
    ) -> Result<ContextGuard, PoolError> {
        let permit = self
            .context_permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| PoolError::AcquireTimeout(self.config.acquire_timeout))?;

        // The engine is only needed long enough to open a page; it returns
        // to the pool immediately rather than being held for the context's
        // lifetime, so `max_contexts_per_engine` contexts can share one
        // engine concurrently, bounded instead by `context_permits`.
        let browser_arc = {
            let engine_guard = self.acquire().await?;
            engine_guard.browser_arc()
        };
        let page = browser_arc
            .new_page("about:blank")
            .await
            .map_err(|e| PoolError::LaunchFailed(e.to_string()))?;

        let context = RenderingContext::new(page, request_timeout, Arc::clone(&self.request_filter))
            .await
            .map_err(|e| PoolError::LaunchFailed(e.to_string()))?;

        Ok(ContextGuard {
            context: Some(context),
            _permit: permit,
        })
    }

    async fn record_acquisition(&self, wait: Duration) {
        self.total_acquisitions.fetch_add(1, Ordering::Relaxed);
        let in_use = self.in_use_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_concurrent_use.fetch_max(in_use, Ordering::Relaxed);

        let wait_ms = wait.as_secs_f64() * 1000.0;
        self.wait_samples.lock().await.push(wait_ms);
    }

    fn release(self: &Arc<Self>, mut engine: PooledEngine) {
        self.in_use_count.fetch_sub(1, Ordering::Relaxed);

        let pool = Arc::clone(self);
        tokio::spawn(async move {
            match engine.wrapper.browser().version().await {
                Ok(_) => {
                    pool.available.lock().await.push_back(engine);
                }
                Err(e) => {
                    warn!("engine {} disconnected on release, replacing: {e}", engine.id);
                    pool.replace_engine_in_background(engine.id);
                }
            }
        });
    }

    /// Launch a fresh engine with the same startup flags and push it to
    /// `available`, preserving `total_engines`: a dead engine is replaced
    /// transparently rather than shrinking the pool.
    fn replace_engine_in_background(self: &Arc<Self>, dead_id: u64) {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            match pool.launch_engine().await {
                Ok(fresh) => {
                    debug!("replaced dead engine {dead_id} with {}", fresh.id);
                    pool.available.lock().await.push_back(fresh);
                }
                Err(e) => {
                    warn!("failed to launch replacement for dead engine {dead_id}: {e}");
                }
            }
        });
    }

    async fn launch_engine(&self) -> Result<PooledEngine> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let profile = crate::browser_profile::create_unique_profile_with_prefix("kodegen_scrape_pool")
            .context("failed to create unique pool engine profile")?;
        let user_data_dir = profile.into_path();

        let (browser, handler, _dir) =
            crate::browser_setup::launch_browser(self.config.headless, Some(user_data_dir.clone()))
                .await
                .context("failed to launch rendering engine")?;

        let wrapper = PooledBrowserWrapper::new(browser, handler, user_data_dir);
        Ok(PooledEngine {
            id,
            wrapper,
            last_health_check: Instant::now(),
        })
    }

    #[must_use]
    pub fn stats(&self) -> BrowserPoolStatsSnapshot {
        BrowserPoolStatsSnapshot { pool: self }
    }

    pub async fn shutdown(&self) -> Result<()> {
        info!("shutting down browser pool");
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(handle) = self.keepalive_handle.lock().await.take() {
            handle.abort();
        }

        let mut available = self.available.lock().await;
        while let Some(mut engine) = available.pop_front() {
            if let Some(b) = engine.wrapper.browser_mut() {
                if let Err(e) = b.close().await {
                    warn!("failed to close engine {}: {e}", engine.id);
                }
                let _ = b.wait().await;
            }
            engine.wrapper.cleanup_temp_dir();
        }

        Ok(())
    }
}

/// Snapshot accessor kept separate from `BrowserPool` so `stats()` can be
/// `&self` without awaiting the async mutex for the synchronous counters.
pub struct BrowserPoolStatsSnapshot<'a> {
    pool: &'a BrowserPool,
}

impl BrowserPoolStatsSnapshot<'_> {
    pub async fn snapshot(&self) -> BrowserPoolStats {
        let available = self.pool.available.lock().await.len();
        let active = self.pool.in_use_count.load(Ordering::Relaxed);
        let average_wait_ms = self.pool.wait_samples.lock().await.average();
        BrowserPoolStats {
            total_engines: available + active,
            active,
            available,
            total_acquisitions: self.pool.total_acquisitions.load(Ordering::Relaxed),
            average_wait_ms,
            peak_concurrent_use: self.pool.peak_concurrent_use.load(Ordering::Relaxed),
        }
    }
}

/// RAII guard returning the engine to the pool when dropped.
pub struct PooledBrowserGuard {
    engine: Option<PooledEngine>,
    pool: Arc<BrowserPool>,
}

impl PooledBrowserGuard {
    #[must_use]
    pub fn browser(&self) -> &Browser {
        self.engine.as_ref().expect("engine present").wrapper.browser()
    }

    #[must_use]
    pub fn browser_arc(&self) -> Arc<Browser> {
        self.engine.as_ref().expect("engine present").wrapper.browser_arc()
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.engine.as_ref().expect("engine present").id
    }
}

impl Drop for PooledBrowserGuard {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            self.pool.release(engine);
        }
    }
}

/// RAII guard for a rendering context. Dropping it ends the context and
/// releases the underlying engine and context-pool permit.
pub struct ContextGuard {
    context: Option<RenderingContext>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl ContextGuard {
    #[must_use]
    pub fn context(&self) -> &RenderingContext {
        self.context.as_ref().expect("context present")
    }
}

async fn keepalive_loop(pool: Arc<BrowserPool>) {
    let mut interval = tokio::time::interval(pool.config.keepalive_interval);

    while !pool.shutdown.load(Ordering::Relaxed) {
        interval.tick().await;

        let mut available = pool.available.lock().await;
        let mut healthy = VecDeque::new();
        let mut dead_ids = Vec::new();

        while let Some(mut engine) = available.pop_front() {
            match engine.wrapper.browser().version().await {
                Ok(_) => {
                    engine.last_health_check = Instant::now();
                    healthy.push_back(engine);
                }
                Err(e) => {
                    warn!("engine {} failed keepalive health check: {e}", engine.id);
                    dead_ids.push(engine.id);
                }
            }
        }
        *available = healthy;
        drop(available);

        for id in dead_ids {
            pool.replace_engine_in_background(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_concurrency_caps_between_one_and_five() {
        assert_eq!(BrowserPoolConfig::for_concurrency(1).pool_size, 1);
        assert_eq!(BrowserPoolConfig::for_concurrency(2).pool_size, 2);
        assert_eq!(BrowserPoolConfig::for_concurrency(3).pool_size, 3);
        assert_eq!(BrowserPoolConfig::for_concurrency(10).pool_size, 3);
        assert_eq!(BrowserPoolConfig::for_concurrency(0).pool_size, 1);
    }

    #[test]
    fn wait_samples_average_and_bounded_capacity() {
        let mut samples = WaitSamples::default();
        assert_eq!(samples.average(), 0.0);
        for i in 0..150 {
            samples.push(i as f64);
        }
        assert_eq!(samples.samples.len(), WAIT_SAMPLE_CAPACITY);
        // oldest 50 samples (0..50) were evicted; average is over 50..150
        let expected: f64 = (50..150).sum::<i32>() as f64 / 100.0;
        assert!((samples.average() - expected).abs() < 1e-9);
    }
}
