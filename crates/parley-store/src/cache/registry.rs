use std::collections::HashMap;
use std::sync::Arc;

use parley_shared::constants::{
    CACHE_ALL_CHANNEL_MEMBERS_FOR_USER, CACHE_ALL_CHANNEL_MEMBERS_NOTIFY_PROPS, CACHE_CHANNEL,
    CACHE_CHANNEL_BY_NAME, CACHE_CHANNEL_MEMBER_COUNTS, CACHE_REACTION, CACHE_ROLE, CACHE_SCHEME,
};

use super::local::LocalCache;
use super::metrics::{CacheMetrics, NoopMetrics};
use crate::config::CacheSettings;
use crate::models::{Channel, NotifyProps, Reaction, Role, Scheme};

/// Every named cache used by the store.
///
/// One registry is created per [`crate::LayeredStore`] and shared through an
/// `Arc` with the components that read or invalidate it.
pub struct CacheRegistry {
    /// Keyed by channel id.
    pub channel_by_id: LocalCache<Channel>,
    /// Keyed by `team_id + name`.
    pub channel_by_name: LocalCache<Channel>,
    /// Keyed by channel id.
    pub channel_member_counts: LocalCache<i64>,
    /// Keyed by user id, or `user_id + "_deleted"` when archived channels are
    /// included. Maps channel id to the member's full role string.
    pub all_channel_members_for_user: LocalCache<HashMap<String, String>>,
    /// Keyed by channel id. Maps user id to notify props.
    pub all_channel_members_notify_props: LocalCache<HashMap<String, NotifyProps>>,
    pub role_by_name: LocalCache<Role>,
    pub scheme_by_id: LocalCache<Scheme>,
    /// Keyed by post id.
    pub reactions_by_post: LocalCache<Vec<Reaction>>,
    metrics: Arc<dyn CacheMetrics>,
}

impl CacheRegistry {
    pub fn new(settings: &CacheSettings, metrics: Arc<dyn CacheMetrics>) -> Self {
        let m = || metrics.clone();
        Self {
            channel_by_id: LocalCache::new(
                CACHE_CHANNEL,
                settings.channel_cache_size,
                settings.channel_ttl,
                m(),
            ),
            channel_by_name: LocalCache::new(
                CACHE_CHANNEL_BY_NAME,
                settings.channel_cache_size,
                settings.channel_ttl,
                m(),
            ),
            channel_member_counts: LocalCache::new(
                CACHE_CHANNEL_MEMBER_COUNTS,
                settings.channel_cache_size,
                settings.member_counts_ttl,
                m(),
            ),
            all_channel_members_for_user: LocalCache::new(
                CACHE_ALL_CHANNEL_MEMBERS_FOR_USER,
                settings.session_cache_size,
                settings.all_members_for_user_ttl,
                m(),
            ),
            all_channel_members_notify_props: LocalCache::new(
                CACHE_ALL_CHANNEL_MEMBERS_NOTIFY_PROPS,
                settings.session_cache_size,
                settings.notify_props_ttl,
                m(),
            ),
            role_by_name: LocalCache::new(
                CACHE_ROLE,
                settings.role_cache_size,
                settings.role_ttl,
                m(),
            ),
            scheme_by_id: LocalCache::new(
                CACHE_SCHEME,
                settings.scheme_cache_size,
                settings.scheme_ttl,
                m(),
            ),
            reactions_by_post: LocalCache::new(
                CACHE_REACTION,
                settings.reaction_cache_size,
                settings.reaction_ttl,
                m(),
            ),
            metrics,
        }
    }

    /// Registry with default sizes and no metrics.
    pub fn with_defaults() -> Self {
        Self::new(&CacheSettings::default(), Arc::new(NoopMetrics))
    }

    pub fn metrics(&self) -> &Arc<dyn CacheMetrics> {
        &self.metrics
    }

    /// Purge the cache called `name`. Returns `false` for an unknown name.
    pub fn purge(&self, name: &str) -> bool {
        match name {
            CACHE_CHANNEL => self.channel_by_id.purge(),
            CACHE_CHANNEL_BY_NAME => self.channel_by_name.purge(),
            CACHE_CHANNEL_MEMBER_COUNTS => self.channel_member_counts.purge(),
            CACHE_ALL_CHANNEL_MEMBERS_FOR_USER => self.all_channel_members_for_user.purge(),
            CACHE_ALL_CHANNEL_MEMBERS_NOTIFY_PROPS => self.all_channel_members_notify_props.purge(),
            CACHE_ROLE => self.role_by_name.purge(),
            CACHE_SCHEME => self.scheme_by_id.purge(),
            CACHE_REACTION => self.reactions_by_post.purge(),
            _ => {
                tracing::warn!(cache = name, "purge requested for unknown cache");
                return false;
            }
        }
        true
    }

    /// The five channel caches, purged together.
    pub fn purge_channel_caches(&self) {
        self.channel_member_counts.purge();
        self.all_channel_members_for_user.purge();
        self.all_channel_members_notify_props.purge();
        self.channel_by_id.purge();
        self.channel_by_name.purge();
    }

    pub fn purge_all(&self) {
        self.purge_channel_caches();
        self.role_by_name.purge();
        self.scheme_by_id.purge();
        self.reactions_by_post.purge();
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
