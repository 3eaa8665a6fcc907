use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use super::metrics::CacheMetrics;

struct Entry<V> {
    value: V,
    /// `None` never expires.
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// A fixed-capacity LRU cache with optional per-entry expiry.
///
/// Expiry is checked lazily: an expired entry is evicted the next time it is
/// read and reported as a miss. Values are cloned out, so callers never hold
/// the lock.
///
/// Lookups report hits and misses to the metrics hook, removals and purges
/// report invalidations. Plain inserts are not counted.
///
/// Cache-aside readers load outside the lock, so a write that commits and
/// invalidates while a load is in flight could be overwritten by the older
/// value. Readers take [`LocalCache::generation`] before loading and store
/// with [`LocalCache::put_if_unchanged`], which drops the value if any
/// invalidation happened in between.
pub struct LocalCache<V> {
    name: &'static str,
    default_ttl: Duration,
    inner: Mutex<LruCache<String, Entry<V>>>,
    /// Bumped under the lock by every `remove` and `purge`.
    generation: AtomicU64,
    metrics: Arc<dyn CacheMetrics>,
}

impl<V: Clone> LocalCache<V> {
    /// A zero `capacity` is raised to one; a zero `default_ttl` never expires.
    pub fn new(
        name: &'static str,
        capacity: usize,
        default_ttl: Duration,
        metrics: Arc<dyn CacheMetrics>,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            default_ttl,
            inner: Mutex::new(LruCache::new(capacity)),
            generation: AtomicU64::new(0),
            metrics,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let found = self.lookup(key);
        match found {
            Some(_) => self.metrics.increment_hit(self.name),
            None => self.metrics.increment_miss(self.name),
        }
        found
    }

    /// Insert with the cache's default lifetime.
    pub fn put(&self, key: impl Into<String>, value: V) {
        self.put_with_ttl(key, value, self.default_ttl);
    }

    pub fn put_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: expiry(ttl),
        };
        self.inner.lock().put(key.into(), entry);
    }

    /// Invalidation counter to pass to [`LocalCache::put_if_unchanged`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Insert with the default lifetime unless a `remove` or `purge` ran
    /// since `generation` was read. Returns whether the value was stored.
    pub fn put_if_unchanged(&self, key: impl Into<String>, value: V, generation: u64) -> bool {
        let mut cache = self.inner.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::trace!(cache = self.name, "stale load discarded");
            return false;
        }
        cache.put(
            key.into(),
            Entry {
                value,
                expires_at: expiry(self.default_ttl),
            },
        );
        true
    }

    /// Return the live value under `key` if there is one, otherwise insert
    /// `value`. The flag is `true` when an existing value was returned.
    pub fn get_or_add(&self, key: impl Into<String>, value: V, ttl: Duration) -> (V, bool) {
        let key = key.into();
        let now = Instant::now();
        let mut cache = self.inner.lock();

        let existing = cache
            .get(&key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone());
        if let Some(existing) = existing {
            self.metrics.increment_hit(self.name);
            return (existing, true);
        }
        self.metrics.increment_miss(self.name);

        cache.put(
            key,
            Entry {
                value: value.clone(),
                expires_at: expiry(ttl),
            },
        );
        (value, false)
    }

    pub fn remove(&self, key: &str) {
        {
            let mut cache = self.inner.lock();
            cache.pop(key);
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        self.metrics.increment_invalidation(self.name);
    }

    pub fn purge(&self) {
        {
            let mut cache = self.inner.lock();
            cache.clear();
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        self.metrics.increment_invalidation(self.name);
        tracing::debug!(cache = self.name, "cache purged");
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().iter().rev().map(|(k, _)| k.clone()).collect()
    }

    fn lookup(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut cache = self.inner.lock();

        let state = cache.get(key).map(|entry| {
            if entry.is_live(now) {
                Some(entry.value.clone())
            } else {
                None
            }
        });

        match state {
            Some(Some(value)) => Some(value),
            Some(None) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }
}

fn expiry(ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() {
        None
    } else {
        Instant::now().checked_add(ttl)
    }
}
