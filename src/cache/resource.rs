//! Byte-budgeted TTL cache for fetched resources
//!
//! Entries are JSON payloads keyed by request path. Each entry carries its
//! serialized size and an expiry instant; the cache keeps the sum of live
//! entry sizes under `max_bytes` by purging expired entries and then evicting
//! in insertion order (oldest first).
//!
//! Time is `tokio::time::Instant` so paused-clock tests can drive expiry.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

struct CacheEntry {
    payload: Value,
    expires_at: Instant,
    size_bytes: u64,
    /// Insertion sequence; key into the `order` index
    seq: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Counters since creation (or the last `clear`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub max_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    /// Removed to make room for a write
    pub evictions: u64,
    /// Removed because their TTL ran out
    pub expirations: u64,
}

impl CacheStats {
    /// Hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

pub struct ResourceCache {
    entries: HashMap<String, CacheEntry>,
    /// seq -> key, oldest first
    order: BTreeMap<u64, String>,
    next_seq: u64,
    total_bytes: u64,
    max_bytes: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl ResourceCache {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            total_bytes: 0,
            max_bytes,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Value> {
        self.get_at(key, Instant::now())
    }

    /// Look up a payload, dropping it if expired
    pub fn get_at(&mut self, key: &str, now: Instant) -> Option<Value> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.hits += 1;
                debug!(key = key, size = entry.size_bytes, "Resource cache hit");
                return Some(entry.payload.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.remove_entry(key);
            self.expirations += 1;
        }

        self.misses += 1;
        debug!(key = key, expired = expired, "Resource cache miss");
        None
    }

    pub fn put<T: Serialize>(&mut self, key: &str, payload: &T, ttl: Duration) -> bool {
        self.put_at(key, payload, ttl, Instant::now())
    }

    /// Store a payload under `key` for `ttl`.
    ///
    /// Returns false only when the payload cannot be serialized, in which
    /// case the cache is left untouched. A payload larger than the whole
    /// budget is still stored; it becomes the first eviction candidate.
    pub fn put_at<T: Serialize>(
        &mut self,
        key: &str,
        payload: &T,
        ttl: Duration,
        now: Instant,
    ) -> bool {
        let (payload, size) = match encode(payload) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = key, error = %e, "Payload not serializable, skipping cache");
                return false;
            }
        };

        // Re-put replaces the old entry and resets its position
        self.remove_entry(key);

        self.purge_expired(now);
        self.evict_until_fits(size);

        if size > self.max_bytes {
            warn!(
                key = key,
                size = size,
                max = self.max_bytes,
                "Entry exceeds cache budget"
            );
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.to_string());
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                payload,
                expires_at: now + ttl,
                size_bytes: size,
                seq,
            },
        );
        self.total_bytes += size;

        debug!(key = key, size = size, ttl_secs = ttl.as_secs(), "Resource cached");
        true
    }

    pub fn sweep(&mut self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Remove every expired entry, returning how many went
    pub fn sweep_at(&mut self, now: Instant) -> usize {
        self.purge_expired(now)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.remove_entry(key).is_some()
    }

    /// Presence check that does not touch hit/miss counters
    pub fn contains(&self, key: &str) -> bool {
        self.contains_at(key, Instant::now())
    }

    pub fn contains_at(&self, key: &str, now: Instant) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.total_bytes = 0;
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
        self.expirations = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            total_bytes: self.total_bytes,
            max_bytes: self.max_bytes,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            expirations: self.expirations,
        }
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        self.total_bytes -= entry.size_bytes;
        Some(entry)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove_entry(key);
        }
        self.expirations += expired.len() as u64;

        if !expired.is_empty() {
            debug!(count = expired.len(), "Purged expired resources");
        }
        expired.len()
    }

    fn evict_until_fits(&mut self, new_size: u64) {
        let mut freed = 0u64;

        while self.total_bytes + new_size > self.max_bytes {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.total_bytes -= entry.size_bytes;
                freed += entry.size_bytes;
                self.evictions += 1;
            }
        }

        if freed > 0 {
            debug!(freed = freed, "Evicted resources to make space");
        }
    }
}

/// JSON value plus its serialized byte length
fn encode<T: Serialize>(payload: &T) -> crate::error::Result<(Value, u64)> {
    let value = serde_json::to_value(payload)?;
    let size = serde_json::to_vec(&value)?.len() as u64;
    Ok((value, size))
}
