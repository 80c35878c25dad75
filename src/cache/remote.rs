//! Optional distributed cache tier: `redis` (async, `tokio-comp`) as a
//! shared artifact store fronted by a local memory tier. Gated behind
//! the `remote-cache` feature; with the feature disabled,
//! [`NoopRemoteTier`] keeps the call sites uniform while always missing.

use crate::errors::CacheError;

/// The distributed-tier contract: byte-for-byte artifact storage with a
/// server-side TTL. The memory tier owns scoring/eviction; this trait only
/// needs get/set/delete/clear semantics.
#[allow(async_fn_in_trait)]
pub trait RemoteTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: &[u8], ttl_seconds: u64) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    /// Best-effort full wipe; returns the number of keys removed if the
    /// backend can report it.
    async fn clear_all(&self) -> Result<usize, CacheError>;
}

/// Stand-in used when the `remote-cache` feature is off, or when no
/// `remote_url` is configured. Always misses, accepts writes silently.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRemoteTier;

impl RemoteTier for NoopRemoteTier {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl_seconds: u64) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn clear_all(&self) -> Result<usize, CacheError> {
        Ok(0)
    }
}

#[cfg(feature = "remote-cache")]
mod redis_tier {
    use super::RemoteTier;
    use crate::errors::CacheError;
    use redis::aio::ConnectionManager;
    use redis::AsyncCommands;

    /// Redis-backed remote tier. One shared [`ConnectionManager`], which
    /// reconnects transparently, held for the process lifetime rather than
    /// opened per call.
    #[derive(Clone)]
    pub struct RedisTier {
        conn: ConnectionManager,
        key_prefix: String,
    }

    impl RedisTier {
        pub async fn connect(url: &str) -> Result<Self, CacheError> {
            let client = redis::Client::open(url).map_err(|e| CacheError::Remote(e.to_string()))?;
            let conn = client
                .get_connection_manager()
                .await
                .map_err(|e| CacheError::Remote(e.to_string()))?;
            Ok(Self {
                conn,
                key_prefix: "kodegen_scrape:".to_string(),
            })
        }

        fn namespaced(&self, key: &str) -> String {
            format!("{}{}", self.key_prefix, key)
        }
    }

    impl RemoteTier for RedisTier {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            let mut conn = self.conn.clone();
            conn.get(self.namespaced(key))
                .await
                .map_err(|e| CacheError::Remote(e.to_string()))
        }

        async fn set(&self, key: &str, value: &[u8], ttl_seconds: u64) -> Result<(), CacheError> {
            let mut conn = self.conn.clone();
            let ttl = ttl_seconds.max(1);
            conn.set_ex::<_, _, ()>(self.namespaced(key), value, ttl)
                .await
                .map_err(|e| CacheError::Remote(e.to_string()))
        }

        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            let mut conn = self.conn.clone();
            conn.del::<_, ()>(self.namespaced(key))
                .await
                .map_err(|e| CacheError::Remote(e.to_string()))
        }

        async fn clear_all(&self) -> Result<usize, CacheError> {
            // A production deployment would SCAN by prefix rather than
            // FLUSHDB; left for a dedicated Redis keyspace per deployment.
            let mut conn = self.conn.clone();
            let keys: Vec<String> = redis::cmd("KEYS")
                .arg(format!("{}*", self.key_prefix))
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::Remote(e.to_string()))?;
            let count = keys.len();
            if !keys.is_empty() {
                conn.del::<_, ()>(keys)
                    .await
                    .map_err(|e| CacheError::Remote(e.to_string()))?;
            }
            Ok(count)
        }
    }
}

#[cfg(feature = "remote-cache")]
pub use redis_tier::RedisTier;
