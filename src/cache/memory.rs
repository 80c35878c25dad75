//! In-process cache tier: a bounded map with per-entry TTL and a
//! score-weighted eviction scan, built on xxhash-keyed lookups over a
//! concurrent map. When full, evicts the least valuable entry rather
//! than the oldest or largest one.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A stored artifact plus the bookkeeping needed to score and expire it.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub artifact_bytes: Vec<u8>,
    pub created_at: u64,
    pub ttl_seconds: u64,
    pub hit_count: u64,
    pub last_accessed_at: u64,
    pub size_bytes: usize,
    pub compression_algorithm: Option<String>,
}

impl CacheEntry {
    fn is_expired(&self, now: u64) -> bool {
        self.created_at + self.ttl_seconds <= now
    }

    /// `score = hit_count * recency_weight / size_bytes`; `recency_weight`
    /// decays linearly with age in hours, floored at a small epsilon so a
    /// very old, never-evicted entry doesn't divide by zero.
    fn score(&self, now: u64) -> f64 {
        let age_hours = (now.saturating_sub(self.created_at)) as f64 / 3600.0;
        let recency_weight = (1.0 - age_hours / 24.0).max(0.01);
        let size = self.size_bytes.max(1) as f64;
        (self.hit_count.max(1) as f64) * recency_weight / size
    }
}

pub struct MemoryTier {
    entries: DashMap<String, CacheEntry>,
    /// Guards the eviction scan: scoring and evicting multiple entries
    /// atomically is something per-key `DashMap` locking alone can't provide.
    eviction_lock: Mutex<()>,
    max_entries: usize,
    max_bytes: usize,
    hits: Arc<std::sync::atomic::AtomicU64>,
    misses: Arc<std::sync::atomic::AtomicU64>,
}

impl MemoryTier {
    #[must_use]
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            eviction_lock: Mutex::new(()),
            max_entries,
            max_bytes,
            hits: Arc::new(std::sync::atomic::AtomicU64::new(0)),
            misses: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = now_secs();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.is_expired(now) {
                drop(entry);
                self.entries.remove(key);
                self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return None;
            }
            entry.hit_count += 1;
            entry.last_accessed_at = now;
            self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            Some(entry.clone())
        } else {
            self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            None
        }
    }

    pub fn set(&self, key: String, artifact_bytes: Vec<u8>, ttl_seconds: u64, compression_algorithm: Option<String>) {
        let now = now_secs();
        let size_bytes = artifact_bytes.len();
        let entry = CacheEntry {
            key: key.clone(),
            artifact_bytes,
            created_at: now,
            ttl_seconds,
            hit_count: 0,
            last_accessed_at: now,
            size_bytes,
            compression_algorithm,
        };

        self.make_room_for(size_bytes, &key);
        self.entries.insert(key, entry);
    }

    pub fn delete(&self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    /// Drop every entry, returning `(cleared_entries, freed_bytes)`.
    pub fn clear_all(&self) -> (usize, usize) {
        let _guard = self.eviction_lock.lock();
        let cleared = self.entries.len();
        let freed: usize = self.entries.iter().map(|e| e.size_bytes).sum();
        self.entries.clear();
        (cleared, freed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(std::sync::atomic::Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Remove expired entries, then evict lowest-scoring live entries until
    /// `incoming_size` fits within `max_entries`/`max_bytes`.
    fn make_room_for(&self, incoming_size: usize, incoming_key: &str) {
        let _guard = self.eviction_lock.lock();
        let now = now_secs();

        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.is_expired(now))
            .map(|e| e.key.clone())
            .collect();
        for k in expired {
            self.entries.remove(&k);
        }

        loop {
            let count = self.entries.len();
            let bytes: usize = self.entries.iter().map(|e| e.size_bytes).sum();
            let over_count = count >= self.max_entries;
            let over_bytes = bytes + incoming_size > self.max_bytes;
            if !over_count && !over_bytes {
                break;
            }

            let lowest = self
                .entries
                .iter()
                .filter(|e| e.key.as_str() != incoming_key)
                .min_by(|a, b| a.score(now).partial_cmp(&b.score(now)).unwrap_or(std::cmp::Ordering::Equal))
                .map(|e| e.key.clone());

            match lowest {
                Some(k) => {
                    self.entries.remove(&k);
                }
                None => break,
            }
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let tier = MemoryTier::new(10, 1_000_000);
        tier.set("k".into(), b"value".to_vec(), 60, None);
        let entry = tier.get("k").unwrap();
        assert_eq!(entry.artifact_bytes, b"value");
        assert_eq!(entry.hit_count, 1);
    }

    #[test]
    fn expired_entry_reads_as_absent() {
        let tier = MemoryTier::new(10, 1_000_000);
        tier.set("k".into(), b"value".to_vec(), 0, None);
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert!(tier.get("k").is_none());
        assert_eq!(tier.len(), 0);
    }

    #[test]
    fn eviction_respects_max_entries() {
        let tier = MemoryTier::new(2, 1_000_000);
        tier.set("a".into(), b"1".to_vec(), 60, None);
        tier.set("b".into(), b"1".to_vec(), 60, None);
        // give "a" a couple of hits so its score beats a fresh "c" without any hits
        tier.get("a");
        tier.get("a");
        tier.set("c".into(), b"1".to_vec(), 60, None);
        assert!(tier.len() <= 2);
    }

    #[test]
    fn clear_all_reports_freed_bytes() {
        let tier = MemoryTier::new(10, 1_000_000);
        tier.set("a".into(), b"hello".to_vec(), 60, None);
        tier.set("b".into(), b"world!".to_vec(), 60, None);
        let (cleared, freed) = tier.clear_all();
        assert_eq!(cleared, 2);
        assert_eq!(freed, 11);
        assert_eq!(tier.len(), 0);
    }

    #[test]
    fn delete_removes_single_key() {
        let tier = MemoryTier::new(10, 1_000_000);
        tier.set("a".into(), b"1".to_vec(), 60, None);
        tier.set("b".into(), b"2".to_vec(), 60, None);
        tier.delete("a");
        assert!(tier.get("a").is_none());
        assert!(tier.get("b").is_some());
    }
}
