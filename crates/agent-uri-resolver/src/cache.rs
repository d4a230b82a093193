// crates/agent-uri-resolver/src/cache.rs
// ============================================================================
// Module: Resolver Cache
// Description: Cache provider contract and bounded in-memory implementation.
// Purpose: Store descriptor bytes with validators and expiry metadata.
// Dependencies: async-trait, serde, tokio
// ============================================================================

//! ## Overview
//! The resolver persists fetched documents through a [`CacheProvider`]. Keys
//! are absolute request URLs; values carry the body bytes plus the HTTP
//! validators (`ETag`, `Last-Modified`) and epoch expiry used for
//! revalidation. [`MemoryCache`] is the default provider: a bounded map with
//! least-recently-used eviction driven by an access counter, so eviction
//! order is deterministic under test clocks.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;

// ============================================================================
// SECTION: Cache Entry
// ============================================================================

/// Cached response record for one absolute URL.
///
/// # Invariants
/// - `stored_at_epoch <= expires_at_epoch` when an expiry is present.
/// - `body` holds the bytes exactly as fetched; revalidation never rewrites
///   them on a 304.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEntry {
    /// Response body bytes.
    pub body: Vec<u8>,
    /// Entity tag returned by the server.
    pub etag: Option<String>,
    /// Last-Modified value, kept verbatim for conditional requests.
    pub last_modified: Option<String>,
    /// Epoch seconds when the entry was stored.
    pub stored_at_epoch: u64,
    /// Epoch seconds when the entry goes stale.
    pub expires_at_epoch: Option<u64>,
}

impl CachedEntry {
    /// Returns true when the entry is still fresh at `now` (epoch seconds).
    #[must_use]
    pub fn is_fresh(&self, now: u64) -> bool {
        self.expires_at_epoch.is_some_and(|expires| now < expires)
    }
}

// ============================================================================
// SECTION: Provider Contract
// ============================================================================

/// Pluggable key-value store for resolver caching.
///
/// Implementations must be internally synchronized; the resolver calls them
/// from concurrent tasks.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Returns the entry for `url`, if present.
    async fn get(&self, url: &str) -> Option<CachedEntry>;

    /// Stores or replaces the entry for `url`.
    async fn put(&self, url: &str, entry: CachedEntry);

    /// Removes the entry for `url`.
    async fn remove(&self, url: &str);

    /// Removes every entry.
    async fn clear(&self);
}

// ============================================================================
// SECTION: In-Memory Cache
// ============================================================================

/// Internal slot pairing an entry with its recency stamp.
#[derive(Debug, Clone)]
struct Slot {
    /// Stored entry.
    entry: CachedEntry,
    /// Monotonic access stamp for LRU ordering.
    last_access: u64,
}

/// Shared state behind the cache lock.
#[derive(Debug, Default)]
struct MemoryCacheState {
    /// Entries keyed by absolute URL.
    slots: HashMap<String, Slot>,
    /// Monotonic counter driving recency stamps.
    ticks: u64,
}

/// Bounded in-memory cache with LRU eviction.
///
/// # Invariants
/// - Never holds more than `max_entries` entries.
/// - Reads refresh recency; eviction removes the least recently used slot.
#[derive(Debug)]
pub struct MemoryCache {
    /// Slot map and access counter behind one lock.
    state: Mutex<MemoryCacheState>,
    /// Maximum number of entries retained.
    max_entries: usize,
}

impl MemoryCache {
    /// Creates a cache bounded to `max_entries` entries.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Mutex::new(MemoryCacheState::default()),
            max_entries: max_entries.max(1),
        }
    }

    /// Returns the number of cached entries.
    pub async fn len(&self) -> usize {
        self.state.lock().await.slots.len()
    }

    /// Returns true when the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.slots.is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(1_000)
    }
}

#[async_trait]
impl CacheProvider for MemoryCache {
    async fn get(&self, url: &str) -> Option<CachedEntry> {
        let mut state = self.state.lock().await;
        state.ticks += 1;
        let ticks = state.ticks;
        let slot = state.slots.get_mut(url)?;
        slot.last_access = ticks;
        Some(slot.entry.clone())
    }

    async fn put(&self, url: &str, entry: CachedEntry) {
        let mut state = self.state.lock().await;
        state.ticks += 1;
        let ticks = state.ticks;
        state.slots.insert(
            url.to_string(),
            Slot {
                entry,
                last_access: ticks,
            },
        );
        if state.slots.len() > self.max_entries {
            let victim = state
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_access)
                .map(|(key, _)| key.clone());
            if let Some(victim) = victim {
                state.slots.remove(&victim);
            }
        }
    }

    async fn remove(&self, url: &str) {
        self.state.lock().await.slots.remove(url);
    }

    async fn clear(&self) {
        self.state.lock().await.slots.clear();
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions use unwraps for clarity.")]

    use super::CacheProvider;
    use super::CachedEntry;
    use super::MemoryCache;

    fn entry(body: &str) -> CachedEntry {
        CachedEntry {
            body: body.as_bytes().to_vec(),
            etag: None,
            last_modified: None,
            stored_at_epoch: 100,
            expires_at_epoch: Some(400),
        }
    }

    #[tokio::test]
    async fn put_get_round_trips() {
        let cache = MemoryCache::new(4);
        cache.put("https://a.example/agent.json", entry("a")).await;
        let got = cache.get("https://a.example/agent.json").await.unwrap();
        assert_eq!(got.body, b"a");
    }

    #[tokio::test]
    async fn freshness_uses_expiry_epoch() {
        let record = entry("a");
        assert!(record.is_fresh(399));
        assert!(!record.is_fresh(400));
    }

    #[tokio::test]
    async fn eviction_removes_least_recently_used() {
        let cache = MemoryCache::new(2);
        cache.put("u1", entry("1")).await;
        cache.put("u2", entry("2")).await;
        // Touch u1 so u2 becomes the LRU victim.
        let _ = cache.get("u1").await;
        cache.put("u3", entry("3")).await;
        assert!(cache.get("u2").await.is_none());
        assert!(cache.get("u1").await.is_some());
        assert!(cache.get("u3").await.is_some());
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let cache = MemoryCache::new(4);
        cache.put("u1", entry("1")).await;
        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
