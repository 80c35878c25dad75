//! Composition root: the shared handles every handler closes over.

use std::sync::Arc;

use crate::batch_service::BatchService;
use crate::browser_pool::BrowserPool;
use crate::cache::Cache;
use crate::config::ServiceConfig;
use crate::rate_limiter::RateLimiter;
use crate::scraping_service::{ScrapingService, Transform};
use crate::task_manager::TaskManager;

pub struct AppState {
    pub config: ServiceConfig,
    pub tasks: Arc<TaskManager>,
    pub scraping: Arc<ScrapingService>,
    pub batches: Arc<BatchService>,
    pub cache: Arc<Cache>,
    pub pool: Arc<BrowserPool>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Wires the composition root: browser pool, cache, rate limiter,
    /// task manager, scraping service, and batch service, each
    /// constructed once at startup and injected everywhere it's needed,
    /// rather than reached via global singletons.
    pub async fn build(config: ServiceConfig, transform: Option<Arc<dyn Transform>>) -> anyhow::Result<Arc<Self>> {
        let pool_cfg = crate::browser_pool::BrowserPoolConfig {
            pool_size: config.pool().max_pool_size.clamp(1, 5),
            max_contexts_per_engine: config.pool().max_contexts_per_engine,
            keepalive_interval: std::time::Duration::from_secs(config.pool().keepalive_interval_secs),
            acquire_timeout: std::time::Duration::from_secs(config.pool().acquire_timeout_secs),
            headless: config.pool().headless,
        };
        let pool = BrowserPool::new(pool_cfg);
        pool.start().await?;

        let cache = Arc::new(
            Cache::with_remote(
                config.cache().memory_capacity_entries,
                config.cache().memory_capacity_bytes as usize,
                config.cache().compression_threshold_bytes,
                config.cache().remote_url.as_deref(),
            )
            .await,
        );

        let rate_limiter = Arc::new(RateLimiter::new(
            config.admission().max_request_size_bytes,
            config.admission().max_url_length,
            config.admission().max_header_size_bytes,
        ));

        let tasks = Arc::new(TaskManager::default());
        let scraping = Arc::new(ScrapingService::new(
            Arc::clone(&pool),
            Arc::clone(&cache),
            transform,
            Arc::clone(&tasks),
        ));
        let batches = Arc::new(BatchService::new(Arc::clone(&scraping), Arc::clone(&tasks)));

        Ok(Arc::new(Self {
            config,
            tasks,
            scraping,
            batches,
            cache,
            pool,
            rate_limiter,
        }))
    }
}
