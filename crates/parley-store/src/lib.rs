//! # parley-store
//!
//! Persistence layer for Parley, backed by SQLite.
//!
//! Reads go through in-memory caches that are invalidated after every
//! successful write. The channel store keeps the `public_channels` projection
//! in step with `channels` inside the same transaction. Role, scheme and
//! reaction access runs through a chain of suppliers (cache first, SQL last)
//! and can be dispatched onto worker threads.

pub mod cache;
pub mod channels;
pub mod config;
pub mod database;
pub mod dispatch;
pub mod layered;
pub mod migrations;
pub mod models;
pub mod supplier;

mod error;
mod reactions;
mod roles;
mod schemes;
mod teams;
mod users;

pub use cache::{CacheMetrics, CacheRegistry, CacheStats, CounterMetrics, LocalCache, NoopMetrics};
pub use channels::{
    resolve_member_roles, ChannelStore, ResolvedRoles, SaveChannelError, SchemeDefaults,
};
pub use config::{CacheSettings, StoreConfig, UpsertStrategy};
pub use database::Database;
pub use dispatch::{dispatch, StoreChannel};
pub use error::StoreError;
pub use layered::LayeredStore;
pub use models::*;
pub use supplier::{LocalCacheSupplier, SqlSupplier, StoreContext, StoreHint, Supplier};

/// Install a test subscriber once; later calls are no-ops.
#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
