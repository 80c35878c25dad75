pub mod browser_setup;
pub mod browser_pool;
pub mod browser_profile;
pub mod config;
pub mod utils;

pub mod batch_service;
pub mod cache;
pub mod content_extractor;
pub mod errors;
pub mod http;
pub mod rate_limiter;
pub mod scraping_service;
pub mod task_manager;

pub use browser_setup::{
    apply_stealth_measures, download_managed_browser, find_browser_executable, launch_browser,
};
pub use browser_pool::{BrowserPool, BrowserPoolConfig, PooledBrowserGuard};
pub use browser_profile::{
    BrowserProfile,
    create_unique_profile,
    create_unique_profile_with_prefix,
    is_singleton_lock_stale,
    cleanup_stale_lock,
    cleanup_stale_profiles,
};
