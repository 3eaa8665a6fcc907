//! In-memory caches sitting in front of the database.
//!
//! [`LocalCache`] is a single named LRU with lazy expiry; [`CacheRegistry`]
//! owns one of them per concern and is shared by the channel store and the
//! local cache supplier.

mod local;
mod metrics;
mod registry;

pub use local::LocalCache;
pub use metrics::{CacheMetrics, CacheStats, CounterMetrics, NoopMetrics};
pub use registry::CacheRegistry;
