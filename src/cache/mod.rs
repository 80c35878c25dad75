//! Fingerprint-keyed artifact cache: memory tier first, optional
//! distributed tier on miss with promotion back into memory. Writes are
//! synchronous to memory, best-effort to the remote tier.

pub mod compression;
pub mod fingerprint;
pub mod memory;
pub mod remote;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::errors::CacheError;
pub use compression::CompressionIntent;
pub use fingerprint::fingerprint;
pub use memory::CacheEntry;
use memory::MemoryTier;
use remote::{NoopRemoteTier, RemoteTier};

#[cfg(feature = "remote-cache")]
use remote::RedisTier;

/// Dispatches to whichever remote backend is configured. A plain enum
/// rather than `Box<dyn RemoteTier>` since `RemoteTier`'s async methods
/// aren't object-safe.
enum RemoteHandle {
    None(NoopRemoteTier),
    #[cfg(feature = "remote-cache")]
    Redis(RedisTier),
}

impl RemoteHandle {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match self {
            RemoteHandle::None(t) => t.get(key).await,
            #[cfg(feature = "remote-cache")]
            RemoteHandle::Redis(t) => t.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl_seconds: u64) -> Result<(), CacheError> {
        match self {
            RemoteHandle::None(t) => t.set(key, value, ttl_seconds).await,
            #[cfg(feature = "remote-cache")]
            RemoteHandle::Redis(t) => t.set(key, value, ttl_seconds).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match self {
            RemoteHandle::None(t) => t.delete(key).await,
            #[cfg(feature = "remote-cache")]
            RemoteHandle::Redis(t) => t.delete(key).await,
        }
    }

    async fn clear_all(&self) -> Result<usize, CacheError> {
        match self {
            RemoteHandle::None(t) => t.clear_all().await,
            #[cfg(feature = "remote-cache")]
            RemoteHandle::Redis(t) => t.clear_all().await,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub remote_configured: bool,
    pub hit_rate: f64,
    pub total_requests: u64,
}

/// Two-tier artifact cache. `ttl_seconds` defaults come from
/// [`crate::config::CacheConfig`]; callers may override per `set`.
pub struct Cache {
    memory: MemoryTier,
    remote: RemoteHandle,
    compression_threshold: usize,
    total_requests: AtomicU64,
}

impl Cache {
    #[must_use]
    pub fn new(memory_capacity_entries: usize, memory_capacity_bytes: usize, compression_threshold: usize) -> Self {
        Self {
            memory: MemoryTier::new(memory_capacity_entries, memory_capacity_bytes),
            remote: RemoteHandle::None(NoopRemoteTier),
            compression_threshold,
            total_requests: AtomicU64::new(0),
        }
    }

    /// Build a cache with a configured remote tier. Falls back to
    /// [`NoopRemoteTier`] if `remote_url` is `None` or the `remote-cache`
    /// feature is disabled.
    pub async fn with_remote(
        memory_capacity_entries: usize,
        memory_capacity_bytes: usize,
        compression_threshold: usize,
        #[allow(unused_variables)] remote_url: Option<&str>,
    ) -> Self {
        #[cfg(feature = "remote-cache")]
        let remote = match remote_url {
            Some(url) => match RedisTier::connect(url).await {
                Ok(tier) => RemoteHandle::Redis(tier),
                Err(e) => {
                    warn!("remote cache tier unavailable, continuing memory-only: {e}");
                    RemoteHandle::None(NoopRemoteTier)
                }
            },
            None => RemoteHandle::None(NoopRemoteTier),
        };
        #[cfg(not(feature = "remote-cache"))]
        let remote = RemoteHandle::None(NoopRemoteTier);

        Self {
            memory: MemoryTier::new(memory_capacity_entries, memory_capacity_bytes),
            remote,
            compression_threshold,
            total_requests: AtomicU64::new(0),
        }
    }

    /// Look up `key`, trying memory then the remote tier. A remote hit is
    /// promoted back into memory with a one-hour TTL (the original
    /// artifact TTL isn't recoverable from the remote tier alone).
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        if let Some(entry) = self.memory.get(key) {
            let bytes = compression::decompress(&entry.artifact_bytes, entry.compression_algorithm.as_deref())?;
            return Ok(Some(bytes));
        }

        if let Some(raw) = self.remote.get(key).await? {
            self.memory.set(key.to_string(), raw.clone(), 3_600, None);
            return Ok(Some(raw));
        }

        Ok(None)
    }

    /// Store `artifact` under `key` with the given TTL, compressing above
    /// the configured threshold and mirroring to the remote tier
    /// best-effort (a remote write failure never fails the call).
    pub async fn set(&self, key: &str, artifact: &[u8], ttl_seconds: u64) -> Result<(), CacheError> {
        let (compressed, algorithm) = compression::compress(artifact, CompressionIntent::Balanced, self.compression_threshold)?;

        self.memory.set(
            key.to_string(),
            compressed,
            ttl_seconds,
            algorithm.map(str::to_string),
        );

        if let Err(e) = self.remote.set(key, artifact, ttl_seconds).await {
            warn!("remote cache write failed for {key}: {e}");
        }

        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.memory.delete(key);
        if let Err(e) = self.remote.delete(key).await {
            warn!("remote cache delete failed for {key}: {e}");
        }
        Ok(())
    }

    /// Clear both tiers, returning the memory tier's `(cleared_entries,
    /// freed_bytes)` — the remote tier's removal count isn't surfaced.
    pub async fn clear_all(&self) -> Result<(usize, usize), CacheError> {
        let (cleared, freed) = self.memory.clear_all();
        if let Err(e) = self.remote.clear_all().await {
            warn!("remote cache clear failed: {e}");
        }
        Ok((cleared, freed))
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let hits = self.memory.hits();
        let misses = self.memory.misses();
        let total = hits + misses;
        let hit_rate = if total == 0 { 0.0 } else { hits as f64 / total as f64 };

        CacheStats {
            memory_entries: self.memory.len(),
            remote_configured: !matches!(self.remote, RemoteHandle::None(_)),
            hit_rate,
            total_requests: self.total_requests.load(Ordering::Relaxed),
        }
    }
}

/// Shared handle, matching how [`crate::task_manager::TaskManager`] is
/// wired through the service layer.
pub type SharedCache = Arc<Cache>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips_through_compression() {
        let cache = Cache::new(10, 10_000_000, 1_024);
        let payload = "x".repeat(5_000);
        cache.set("k", payload.as_bytes(), 60).await.unwrap();
        let got = cache.get("k").await.unwrap().unwrap();
        assert_eq!(got, payload.as_bytes());
    }

    #[tokio::test]
    async fn small_payload_round_trips_without_compression() {
        let cache = Cache::new(10, 10_000_000, 1_024);
        cache.set("k", b"tiny", 60).await.unwrap();
        let got = cache.get("k").await.unwrap().unwrap();
        assert_eq!(got, b"tiny");
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache = Cache::new(10, 10_000_000, 1_024);
        assert!(cache.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = Cache::new(10, 10_000_000, 1_024);
        cache.set("k", b"v", 60).await.unwrap();
        cache.delete("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_all_empties_memory_tier() {
        let cache = Cache::new(10, 10_000_000, 1_024);
        cache.set("a", b"1", 60).await.unwrap();
        cache.set("b", b"2", 60).await.unwrap();
        let (cleared, _freed) = cache.clear_all().await.unwrap();
        assert_eq!(cleared, 2);
        assert_eq!(cache.stats().memory_entries, 0);
    }

    #[tokio::test]
    async fn stats_reflect_hits_and_misses() {
        let cache = Cache::new(10, 10_000_000, 1_024);
        cache.set("k", b"v", 60).await.unwrap();
        cache.get("k").await.unwrap();
        cache.get("missing").await.unwrap();
        let stats = cache.stats();
        assert_eq!(stats.total_requests, 2);
        assert!(stats.hit_rate > 0.0 && stats.hit_rate < 1.0);
    }
}
