//! In-memory response cache.
//!
//! This module provides the payload-agnostic cache used by the request
//! orchestrator. It supports:
//!
//! - Deterministic SHA-256 keys over path + query parameters
//! - Per-entry max age with an optional stale-while-revalidate window
//! - Revision tokens for conditional refetches
//! - Tag-indexed bulk invalidation
//! - Oldest-first eviction at a fixed capacity

pub mod key;
pub mod store;

pub use key::{QueryParams, compute_cache_key, request_key};
pub use store::{CacheLookup, CacheStats, CacheStore, EntryOptions};
