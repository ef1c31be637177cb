//! In-memory response cache with tag-indexed invalidation.
//!
//! Entries are keyed by request identity (see [`super::key`]) and carry their
//! own freshness budget. Tags index keys for bulk invalidation but never own
//! an entry's lifetime: removing a key from the primary map always scrubs it
//! from every tag it was registered under.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Per-entry storage options supplied at insertion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryOptions {
    /// Hard freshness budget measured from insertion.
    pub max_age: Duration,
    /// Stale-while-revalidate window ending at `max_age`.
    pub stale_after: Option<Duration>,
    /// Opaque validator (e.g. an ETag) for conditional refetches.
    pub revision: Option<String>,
    /// Labels used for bulk invalidation.
    pub tags: Vec<String>,
}

impl EntryOptions {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age, stale_after: None, revision: None, tags: Vec::new() }
    }

    pub fn with_stale_after(mut self, stale_after: Option<Duration>) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_revision(mut self, revision: Option<String>) -> Self {
        self.revision = revision;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// A cached response body with its freshness metadata.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    data: V,
    stored_at: Instant,
    /// Insertion order; breaks ties between equal `stored_at` values.
    seq: u64,
    max_age: Duration,
    stale_after: Option<Duration>,
    revision: Option<String>,
    tags: Vec<String>,
}

impl<V> CacheEntry<V> {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }

    fn is_stale(&self, now: Instant) -> bool {
        let age = self.age(now);
        match self.stale_after {
            Some(window) => age > self.max_age.saturating_sub(window),
            None => age > self.max_age,
        }
    }

    /// Past `max_age` with no stale window to fall back on.
    fn is_expired(&self, now: Instant) -> bool {
        self.stale_after.is_none() && self.age(now) > self.max_age
    }
}

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup<V> {
    pub data: V,
    pub is_stale: bool,
}

/// Read-only cache introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub tag_count: usize,
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    tags: HashMap<String, HashSet<String>>,
    next_seq: u64,
}

impl<V> CacheState<V> {
    fn new() -> Self {
        Self { entries: HashMap::new(), tags: HashMap::new(), next_seq: 0 }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.unlink_tags(key, &entry.tags);
        Some(entry)
    }

    fn unlink_tags(&mut self, key: &str, tags: &[String]) {
        for tag in tags {
            if let Some(keys) = self.tags.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.seq)
            .map(|(key, _)| key.clone())?;
        self.remove(&oldest);
        Some(oldest)
    }
}

/// Size-bounded, tag-indexed response cache.
///
/// Every method takes the internal lock once, so each operation is a single
/// uninterrupted unit even when called from concurrent tasks.
pub struct CacheStore<V> {
    state: Mutex<CacheState<V>>,
    capacity: usize,
}

impl<V: Clone> CacheStore<V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self { state: Mutex::new(CacheState::new()), capacity: capacity.max(1) }
    }

    /// Insert or replace the entry for `key`.
    ///
    /// A new key inserted at capacity first evicts the single oldest entry.
    pub async fn set(&self, key: &str, data: V, options: EntryOptions) {
        let mut state = self.state.lock().await;

        if let Some(previous) = state.entries.remove(key) {
            state.unlink_tags(key, &previous.tags);
        } else if state.entries.len() >= self.capacity
            && let Some(evicted) = state.evict_oldest()
        {
            tracing::debug!(key = %evicted, "evicted oldest cache entry");
        }

        let seq = state.next_seq;
        state.next_seq += 1;

        for tag in &options.tags {
            state.tags.entry(tag.clone()).or_default().insert(key.to_string());
        }

        state.entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                stored_at: Instant::now(),
                seq,
                max_age: options.max_age,
                stale_after: options.stale_after,
                revision: options.revision,
                tags: options.tags,
            },
        );
    }

    /// Look up `key`.
    ///
    /// Entries without a stale window are removed once older than `max_age`.
    /// Entries with one are returned even past `max_age`, flagged stale.
    pub async fn get(&self, key: &str) -> Option<CacheLookup<V>> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        let entry = state.entries.get(key)?;
        if entry.is_expired(now) {
            state.remove(key);
            tracing::debug!(key = %key, "cache entry expired");
            return None;
        }

        Some(CacheLookup { data: entry.data.clone(), is_stale: entry.is_stale(now) })
    }

    /// Revision token stored alongside `key`, if any.
    pub async fn revision(&self, key: &str) -> Option<String> {
        let state = self.state.lock().await;
        state.entries.get(key).and_then(|entry| entry.revision.clone())
    }

    /// Remove `key` and scrub it from every tag index.
    pub async fn invalidate(&self, key: &str) -> bool {
        self.state.lock().await.remove(key).is_some()
    }

    /// Remove every key registered under `tag`, then drop the tag.
    ///
    /// Returns the number of entries removed.
    pub async fn invalidate_tag(&self, tag: &str) -> usize {
        let mut state = self.state.lock().await;
        let Some(keys) = state.tags.remove(tag) else {
            return 0;
        };

        keys.iter().filter(|key| state.remove(key).is_some()).count()
    }

    /// Remove every entry and tag.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.tags.clear();
    }

    /// Remove entries past their hard expiry.
    ///
    /// Entries with a stale window are kept; their staleness is the caller's call.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats { size: state.entries.len(), capacity: self.capacity, tag_count: state.tags.len() }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
