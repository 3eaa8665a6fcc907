use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Observability hook notified by every named cache.
///
/// Implementations must be cheap and must never fail: they are called while a
/// store operation is in flight.
pub trait CacheMetrics: Send + Sync {
    fn increment_hit(&self, cache: &str);
    fn increment_miss(&self, cache: &str);
    fn increment_invalidation(&self, cache: &str);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl CacheMetrics for NoopMetrics {
    fn increment_hit(&self, _cache: &str) {}
    fn increment_miss(&self, _cache: &str) {}
    fn increment_invalidation(&self, _cache: &str) {}
}

/// Point-in-time counters for one cache.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

/// In-process counters keyed by cache name.
#[derive(Default)]
pub struct CounterMetrics {
    counters: DashMap<String, Counters>,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, cache: &str) -> CacheStats {
        self.counters
            .get(cache)
            .map(|c| CacheStats {
                hits: c.hits.load(Ordering::Relaxed),
                misses: c.misses.load(Ordering::Relaxed),
                invalidations: c.invalidations.load(Ordering::Relaxed),
            })
            .unwrap_or_default()
    }

    fn bump(&self, cache: &str, pick: impl Fn(&Counters) -> &AtomicU64) {
        if let Some(c) = self.counters.get(cache) {
            pick(c.value()).fetch_add(1, Ordering::Relaxed);
            return;
        }
        let entry = self.counters.entry(cache.to_string()).or_default();
        pick(entry.value()).fetch_add(1, Ordering::Relaxed);
    }
}

impl CacheMetrics for CounterMetrics {
    fn increment_hit(&self, cache: &str) {
        self.bump(cache, |c| &c.hits);
    }

    fn increment_miss(&self, cache: &str) {
        self.bump(cache, |c| &c.misses);
    }

    fn increment_invalidation(&self, cache: &str) {
        self.bump(cache, |c| &c.invalidations);
    }
}
