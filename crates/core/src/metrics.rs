//! Request-serving statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Point-in-time copy of the performance counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub request_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_response_time: Duration,
    pub average_response_time: Duration,
    /// Percentage in `0.0..=100.0`.
    pub cache_hit_rate: f64,
}

/// Monotonic request counters, safe to update from concurrent completions.
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    request_count: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    total_response_micros: AtomicU64,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one served request.
    pub fn record_request(&self, elapsed: Duration, from_cache: bool) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_response_micros.fetch_add(micros, Ordering::Relaxed);
        if from_cache {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Hit percentage, `0.0` before any hit or miss is recorded.
    pub fn cache_hit_rate(&self) -> f64 {
        hit_rate(self.cache_hits.load(Ordering::Relaxed), self.cache_misses.load(Ordering::Relaxed))
    }

    pub fn average_response_time(&self) -> Duration {
        average(self.total_response_micros.load(Ordering::Relaxed), self.request_count.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> PerformanceSnapshot {
        let request_count = self.request_count.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let total_micros = self.total_response_micros.load(Ordering::Relaxed);

        PerformanceSnapshot {
            request_count,
            cache_hits,
            cache_misses,
            total_response_time: Duration::from_micros(total_micros),
            average_response_time: average(total_micros, request_count),
            cache_hit_rate: hit_rate(cache_hits, cache_misses),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.request_count.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.total_response_micros.store(0, Ordering::Relaxed);
    }
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 { 0.0 } else { 100.0 * hits as f64 / total as f64 }
}

fn average(total_micros: u64, count: u64) -> Duration {
    if count == 0 { Duration::ZERO } else { Duration::from_micros(total_micros / count) }
}
