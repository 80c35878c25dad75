//! Core configuration types for the scrape orchestrator.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Rendering engine pool sizing and lifecycle knobs.
///
/// **INVARIANT:** `min_pool_size <= max_pool_size` (enforced in the builder).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub(crate) min_pool_size: usize,
    pub(crate) max_pool_size: usize,
    pub(crate) max_contexts_per_engine: usize,
    pub(crate) keepalive_interval_secs: u64,
    pub(crate) idle_timeout_secs: u64,
    pub(crate) headless: bool,
    /// Bound on `acquire()`. Defaults to 30s.
    pub(crate) acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: 2,
            max_pool_size: 5,
            max_contexts_per_engine: 4,
            keepalive_interval_secs: 30,
            idle_timeout_secs: 300,
            headless: true,
            acquire_timeout_secs: 30,
        }
    }
}

/// Cache layer tuning. Remote tier is opt-in via `remote_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub(crate) memory_capacity_entries: usize,
    pub(crate) memory_capacity_bytes: u64,
    pub(crate) default_ttl_secs: u64,
    pub(crate) compression_threshold_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) remote_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity_entries: 1_000,
            memory_capacity_bytes: 256 * 1024 * 1024,
            default_ttl_secs: 3_600,
            compression_threshold_bytes: 1_024,
            remote_url: None,
        }
    }
}

/// Request-admission limits checked before rate-window accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    pub(crate) max_request_size_bytes: usize,
    pub(crate) max_url_length: usize,
    pub(crate) max_header_size_bytes: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_request_size_bytes: 10 * 1024 * 1024,
            max_url_length: 2_048,
            max_header_size_bytes: 8_192,
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub(crate) bind_addr: SocketAddr,
    pub(crate) pool: PoolConfig,
    pub(crate) cache: CacheConfig,
    pub(crate) admission: AdmissionConfig,
    pub(crate) request_timeout_secs: u64,
    pub(crate) max_content_size_bytes: usize,
    pub(crate) max_concurrent_requests: usize,
    pub(crate) debug_mode: bool,
}

impl ServiceConfig {
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    #[must_use]
    pub fn pool(&self) -> &PoolConfig {
        &self.pool
    }

    #[must_use]
    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    #[must_use]
    pub fn admission(&self) -> &AdmissionConfig {
        &self.admission
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn max_content_size_bytes(&self) -> usize {
        self.max_content_size_bytes
    }

    #[must_use]
    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }
}
