//! Deterministic cache and request keys.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Query parameters attached to a read request.
///
/// A `BTreeMap` keeps serialization order canonical, so the same parameters
/// always produce the same key regardless of insertion order.
pub type QueryParams = BTreeMap<String, String>;

/// Compute the cache key for a resource path and its query parameters.
pub fn compute_cache_key(url: &str, params: &QueryParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    // Length prefixes keep `a=b=c` splits from colliding.
    for (name, value) in params {
        hasher.update((name.len() as u64).to_le_bytes());
        hasher.update(name.as_bytes());
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Compute the in-flight deduplication key for a request.
///
/// Unlike the cache key this ignores caller-supplied key overrides: two
/// requests are identical when method, url and parameters match.
pub fn request_key(method: &str, url: &str, params: &QueryParams) -> String {
    format!("{} {}", method.to_ascii_uppercase(), compute_cache_key(url, params))
}
