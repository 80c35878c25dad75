//! Typestate builder for `ServiceConfig`: an `Incomplete`/`Complete`
//! phantom state tracks whether the single required field, the bind
//! address, has been set, so a caller can't construct a config without it.

use anyhow::{anyhow, Result};
use std::marker::PhantomData;
use std::net::SocketAddr;

use super::types::{AdmissionConfig, CacheConfig, PoolConfig, ServiceConfig};

pub struct Incomplete;
pub struct Complete;

pub struct ServiceConfigBuilder<State = Incomplete> {
    bind_addr: Option<SocketAddr>,
    pool: PoolConfig,
    cache: CacheConfig,
    admission: AdmissionConfig,
    request_timeout_secs: u64,
    max_content_size_bytes: usize,
    max_concurrent_requests: usize,
    debug_mode: bool,
    _phantom: PhantomData<State>,
}

impl Default for ServiceConfigBuilder<Incomplete> {
    fn default() -> Self {
        Self {
            bind_addr: None,
            pool: PoolConfig::default(),
            cache: CacheConfig::default(),
            admission: AdmissionConfig::default(),
            request_timeout_secs: 30,
            max_content_size_bytes: 10 * 1024 * 1024,
            max_concurrent_requests: 10,
            debug_mode: false,
            _phantom: PhantomData,
        }
    }
}

impl ServiceConfig {
    #[must_use]
    pub fn builder() -> ServiceConfigBuilder<Incomplete> {
        ServiceConfigBuilder::default()
    }
}

impl ServiceConfigBuilder<Incomplete> {
    #[must_use]
    pub fn bind_addr(self, addr: SocketAddr) -> ServiceConfigBuilder<Complete> {
        ServiceConfigBuilder {
            bind_addr: Some(addr),
            pool: self.pool,
            cache: self.cache,
            admission: self.admission,
            request_timeout_secs: self.request_timeout_secs,
            max_content_size_bytes: self.max_content_size_bytes,
            max_concurrent_requests: self.max_concurrent_requests,
            debug_mode: self.debug_mode,
            _phantom: PhantomData,
        }
    }
}

// Shared setters, available in any state.
impl<State> ServiceConfigBuilder<State> {
    #[must_use]
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn admission(mut self, admission: AdmissionConfig) -> Self {
        self.admission = admission;
        self
    }

    #[must_use]
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn max_content_size_bytes(mut self, bytes: usize) -> Self {
        self.max_content_size_bytes = bytes;
        self
    }

    #[must_use]
    pub fn max_concurrent_requests(mut self, n: usize) -> Self {
        self.max_concurrent_requests = n;
        self
    }

    #[must_use]
    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }
}

impl ServiceConfigBuilder<Complete> {
    pub fn build(self) -> Result<ServiceConfig> {
        if self.pool.min_pool_size > self.pool.max_pool_size {
            return Err(anyhow!(
                "pool.min_pool_size ({}) must not exceed pool.max_pool_size ({})",
                self.pool.min_pool_size,
                self.pool.max_pool_size
            ));
        }
        Ok(ServiceConfig {
            bind_addr: self
                .bind_addr
                .ok_or_else(|| anyhow!("bind_addr is required"))?,
            pool: self.pool,
            cache: self.cache,
            admission: self.admission,
            request_timeout_secs: self.request_timeout_secs,
            max_content_size_bytes: self.max_content_size_bytes,
            max_concurrent_requests: self.max_concurrent_requests,
            debug_mode: self.debug_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_defaults() {
        let cfg = ServiceConfig::builder()
            .bind_addr("127.0.0.1:8080".parse().unwrap())
            .build()
            .expect("valid config");
        assert_eq!(cfg.pool().min_pool_size, 2);
        assert_eq!(cfg.request_timeout().as_secs(), 30);
    }

    #[test]
    fn rejects_inverted_pool_bounds() {
        let mut pool = PoolConfig::default();
        pool.min_pool_size = 10;
        pool.max_pool_size = 2;
        let err = ServiceConfig::builder()
            .bind_addr("127.0.0.1:8080".parse().unwrap())
            .pool(pool)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("min_pool_size"));
    }
}
