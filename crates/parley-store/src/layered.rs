//! Entry point of the store.
//!
//! A [`LayeredStore`] owns the database pool, the cache registry and the
//! supplier chain (`LocalCacheSupplier -> SqlSupplier`). Role, scheme and
//! reaction operations are dispatched through the chain on a worker thread
//! and answer with a [`StoreChannel`]; channel operations are served by the
//! [`ChannelStore`], synchronously or through [`LayeredStore::run_channel_op`].

use std::sync::Arc;

use parley_shared::{AppResult, SchemeScope};

use crate::cache::{CacheMetrics, CacheRegistry, NoopMetrics};
use crate::channels::ChannelStore;
use crate::config::StoreConfig;
use crate::database::Database;
use crate::dispatch::{dispatch, StoreChannel};
use crate::error::Result;
use crate::models::{Reaction, Role, Scheme};
use crate::supplier::{LocalCacheSupplier, SqlSupplier, StoreContext, StoreHint, Supplier};

pub struct LayeredStore {
    db: Arc<Database>,
    caches: Arc<CacheRegistry>,
    chain: Arc<dyn Supplier>,
    channels: ChannelStore,
}

impl LayeredStore {
    /// Open the database described by `config` and wire the layers, without
    /// cache metrics.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        Self::with_metrics(config, Arc::new(NoopMetrics))
    }

    pub fn with_metrics(config: &StoreConfig, metrics: Arc<dyn CacheMetrics>) -> Result<Self> {
        let db = Arc::new(Database::new(config)?);
        let caches = Arc::new(CacheRegistry::new(&config.cache, metrics));

        let sql: Arc<dyn Supplier> = Arc::new(SqlSupplier::new(db.clone()));
        let local = LocalCacheSupplier::new(caches.clone());
        local.set_chain_next(sql);
        let chain: Arc<dyn Supplier> = Arc::new(local);

        let channels = ChannelStore::new(db.clone(), caches.clone(), config);

        tracing::info!(
            path = %config.db_path.display(),
            upsert = ?config.public_channel_upsert,
            max_channels_per_team = config.max_channels_per_team,
            "layered store ready"
        );

        Ok(Self {
            db,
            caches,
            chain,
            channels,
        })
    }

    pub fn channel(&self) -> &ChannelStore {
        &self.channels
    }

    /// Head of the supplier chain.
    pub fn supplier(&self) -> &Arc<dyn Supplier> {
        &self.chain
    }

    pub fn caches(&self) -> &Arc<CacheRegistry> {
        &self.caches
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Drop every cached entry of every kind.
    pub fn clear_caches(&self) {
        self.caches.purge_all();
    }

    /// Run `op` against the channel store on a worker thread.
    pub fn run_channel_op<T, F>(&self, location: &'static str, op: F) -> StoreChannel<T>
    where
        T: Send + 'static,
        F: FnOnce(&ChannelStore) -> AppResult<T> + Send + 'static,
    {
        let channels = self.channels.clone();
        dispatch(location, move || op(&channels))
    }

    fn through_chain<T, F>(
        &self,
        location: &'static str,
        ctx: &StoreContext,
        hints: &[StoreHint],
        op: F,
    ) -> StoreChannel<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Supplier, &StoreContext, &[StoreHint]) -> AppResult<T> + Send + 'static,
    {
        let chain = self.chain.clone();
        let ctx = ctx.clone();
        let hints = hints.to_vec();
        dispatch(location, move || op(chain.as_ref(), &ctx, &hints))
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    pub fn role_save(&self, ctx: &StoreContext, role: Role, hints: &[StoreHint]) -> StoreChannel<Role> {
        self.through_chain("LayeredRoleStore.Save", ctx, hints, move |s, ctx, hints| {
            s.role_save(ctx, role, hints)
        })
    }

    pub fn role_get(&self, ctx: &StoreContext, role_id: &str, hints: &[StoreHint]) -> StoreChannel<Role> {
        let role_id = role_id.to_string();
        self.through_chain("LayeredRoleStore.Get", ctx, hints, move |s, ctx, hints| {
            s.role_get(ctx, &role_id, hints)
        })
    }

    pub fn role_get_all(&self, ctx: &StoreContext, hints: &[StoreHint]) -> StoreChannel<Vec<Role>> {
        self.through_chain("LayeredRoleStore.GetAll", ctx, hints, |s, ctx, hints| {
            s.role_get_all(ctx, hints)
        })
    }

    pub fn role_get_by_name(
        &self,
        ctx: &StoreContext,
        name: &str,
        hints: &[StoreHint],
    ) -> StoreChannel<Role> {
        let name = name.to_string();
        self.through_chain("LayeredRoleStore.GetByName", ctx, hints, move |s, ctx, hints| {
            s.role_get_by_name(ctx, &name, hints)
        })
    }

    pub fn role_get_by_names(
        &self,
        ctx: &StoreContext,
        names: &[String],
        hints: &[StoreHint],
    ) -> StoreChannel<Vec<Role>> {
        let names = names.to_vec();
        self.through_chain("LayeredRoleStore.GetByNames", ctx, hints, move |s, ctx, hints| {
            s.role_get_by_names(ctx, &names, hints)
        })
    }

    pub fn role_delete(&self, ctx: &StoreContext, role_id: &str, hints: &[StoreHint]) -> StoreChannel<Role> {
        let role_id = role_id.to_string();
        self.through_chain("LayeredRoleStore.Delete", ctx, hints, move |s, ctx, hints| {
            s.role_delete(ctx, &role_id, hints)
        })
    }

    pub fn role_permanent_delete_all(&self, ctx: &StoreContext, hints: &[StoreHint]) -> StoreChannel<()> {
        self.through_chain("LayeredRoleStore.PermanentDeleteAll", ctx, hints, |s, ctx, hints| {
            s.role_permanent_delete_all(ctx, hints)
        })
    }

    // ------------------------------------------------------------------
    // Schemes
    // ------------------------------------------------------------------

    pub fn scheme_save(&self, ctx: &StoreContext, scheme: Scheme, hints: &[StoreHint]) -> StoreChannel<Scheme> {
        self.through_chain("LayeredSchemeStore.Save", ctx, hints, move |s, ctx, hints| {
            s.scheme_save(ctx, scheme, hints)
        })
    }

    pub fn scheme_get(&self, ctx: &StoreContext, scheme_id: &str, hints: &[StoreHint]) -> StoreChannel<Scheme> {
        let scheme_id = scheme_id.to_string();
        self.through_chain("LayeredSchemeStore.Get", ctx, hints, move |s, ctx, hints| {
            s.scheme_get(ctx, &scheme_id, hints)
        })
    }

    pub fn scheme_get_by_name(
        &self,
        ctx: &StoreContext,
        name: &str,
        hints: &[StoreHint],
    ) -> StoreChannel<Scheme> {
        let name = name.to_string();
        self.through_chain("LayeredSchemeStore.GetByName", ctx, hints, move |s, ctx, hints| {
            s.scheme_get_by_name(ctx, &name, hints)
        })
    }

    pub fn scheme_delete(
        &self,
        ctx: &StoreContext,
        scheme_id: &str,
        hints: &[StoreHint],
    ) -> StoreChannel<Scheme> {
        let scheme_id = scheme_id.to_string();
        self.through_chain("LayeredSchemeStore.Delete", ctx, hints, move |s, ctx, hints| {
            s.scheme_delete(ctx, &scheme_id, hints)
        })
    }

    pub fn scheme_get_all_page(
        &self,
        ctx: &StoreContext,
        scope: Option<SchemeScope>,
        offset: i64,
        limit: i64,
        hints: &[StoreHint],
    ) -> StoreChannel<Vec<Scheme>> {
        self.through_chain("LayeredSchemeStore.GetAllPage", ctx, hints, move |s, ctx, hints| {
            s.scheme_get_all_page(ctx, scope, offset, limit, hints)
        })
    }

    pub fn scheme_permanent_delete_all(&self, ctx: &StoreContext, hints: &[StoreHint]) -> StoreChannel<()> {
        self.through_chain("LayeredSchemeStore.PermanentDeleteAll", ctx, hints, |s, ctx, hints| {
            s.scheme_permanent_delete_all(ctx, hints)
        })
    }

    // ------------------------------------------------------------------
    // Reactions
    // ------------------------------------------------------------------

    pub fn reaction_save(
        &self,
        ctx: &StoreContext,
        reaction: Reaction,
        hints: &[StoreHint],
    ) -> StoreChannel<Reaction> {
        self.through_chain("LayeredReactionStore.Save", ctx, hints, move |s, ctx, hints| {
            s.reaction_save(ctx, reaction, hints)
        })
    }

    pub fn reaction_delete(
        &self,
        ctx: &StoreContext,
        reaction: Reaction,
        hints: &[StoreHint],
    ) -> StoreChannel<Reaction> {
        self.through_chain("LayeredReactionStore.Delete", ctx, hints, move |s, ctx, hints| {
            s.reaction_delete(ctx, reaction, hints)
        })
    }

    pub fn reaction_get_for_post(
        &self,
        ctx: &StoreContext,
        post_id: &str,
        hints: &[StoreHint],
    ) -> StoreChannel<Vec<Reaction>> {
        let post_id = post_id.to_string();
        self.through_chain("LayeredReactionStore.GetForPost", ctx, hints, move |s, ctx, hints| {
            s.reaction_get_for_post(ctx, &post_id, hints)
        })
    }

    pub fn reactions_bulk_get_for_posts(
        &self,
        ctx: &StoreContext,
        post_ids: &[String],
        hints: &[StoreHint],
    ) -> StoreChannel<Vec<Reaction>> {
        let post_ids = post_ids.to_vec();
        self.through_chain("LayeredReactionStore.BulkGetForPosts", ctx, hints, move |s, ctx, hints| {
            s.reactions_bulk_get_for_posts(ctx, &post_ids, hints)
        })
    }

    pub fn reaction_delete_all_with_emoji_name(
        &self,
        ctx: &StoreContext,
        emoji_name: &str,
        hints: &[StoreHint],
    ) -> StoreChannel<()> {
        let emoji_name = emoji_name.to_string();
        self.through_chain(
            "LayeredReactionStore.DeleteAllWithEmojiName",
            ctx,
            hints,
            move |s, ctx, hints| s.reaction_delete_all_with_emoji_name(ctx, &emoji_name, hints),
        )
    }

    pub fn reaction_permanent_delete_batch(
        &self,
        ctx: &StoreContext,
        end_time: i64,
        limit: i64,
        hints: &[StoreHint],
    ) -> StoreChannel<i64> {
        self.through_chain(
            "LayeredReactionStore.PermanentDeleteBatch",
            ctx,
            hints,
            move |s, ctx, hints| s.reaction_permanent_delete_batch(ctx, end_time, limit, hints),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CounterMetrics;
    use crate::models::Channel;
    use parley_shared::constants::{CACHE_CHANNEL, CACHE_ROLE};
    use parley_shared::{new_id, ChannelType};

    fn setup() -> (tempfile::TempDir, Arc<CounterMetrics>, LayeredStore) {
        crate::init_test_tracing();
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::at_path(dir.path().join("layered.db"));
        let metrics = Arc::new(CounterMetrics::new());
        let store = LayeredStore::with_metrics(&config, metrics.clone()).unwrap();
        (dir, metrics, store)
    }

    #[test]
    fn chain_is_wired_cache_first() {
        let (_dir, _metrics, store) = setup();
        let next = store.supplier().next().expect("cache link has a successor");
        assert!(next.next().is_none());
    }

    #[test]
    fn role_reads_are_served_from_cache() {
        let (_dir, metrics, store) = setup();
        let ctx = StoreContext::with_request_id("req-1");

        let saved = store
            .role_save(&ctx, Role::new("reviewer", "Reviewer"), &[])
            .recv()
            .unwrap();

        let first = store.role_get_by_name(&ctx, "reviewer", &[]).recv().unwrap();
        let second = store.role_get_by_name(&ctx, "reviewer", &[]).recv().unwrap();
        assert_eq!(first, saved);
        assert_eq!(second, saved);

        let stats = metrics.snapshot(CACHE_ROLE);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn master_hint_reads_bypass_cache() {
        let (_dir, metrics, store) = setup();
        let ctx = StoreContext::background();
        store
            .role_save(&ctx, Role::new("auditor", "Auditor"), &[])
            .recv()
            .unwrap();

        store
            .role_get_by_name(&ctx, "auditor", &[StoreHint::Master])
            .recv()
            .unwrap();
        let stats = metrics.snapshot(CACHE_ROLE);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        // Inspecting keys leaves the counters alone.
        assert!(!store.caches().role_by_name.keys().contains(&"auditor".to_string()));
    }

    #[tokio::test]
    async fn scheme_operations_can_be_awaited() {
        let (_dir, _metrics, store) = setup();
        let ctx = StoreContext::background();

        let scheme = store
            .scheme_save(&ctx, Scheme::new("strict", "Strict", SchemeScope::Channel), &[])
            .await
            .unwrap();
        assert!(!scheme.default_channel_user_role.is_empty());

        let fetched = store.scheme_get(&ctx, &scheme.id, &[]).await.unwrap();
        assert_eq!(fetched.name, "strict");
        assert!(store.caches().scheme_by_id.get(&scheme.id).is_some());

        let err = store.scheme_get(&ctx, &new_id(), &[]).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn scheme_delete_clears_cached_channels() {
        let (_dir, metrics, store) = setup();
        let ctx = StoreContext::background();
        let scheme = store
            .scheme_save(&ctx, Scheme::new("temp", "Temp", SchemeScope::Channel), &[])
            .recv()
            .unwrap();

        let channel = store
            .channel()
            .save(Channel::new(new_id(), "lobby", "Lobby", ChannelType::Open))
            .unwrap();
        store.channel().get(&channel.id, true).unwrap();
        assert!(store.caches().channel_by_id.get(&channel.id).is_some());

        store.scheme_delete(&ctx, &scheme.id, &[]).recv().unwrap();
        assert!(store.caches().channel_by_id.is_empty());
        assert!(metrics.snapshot(CACHE_CHANNEL).invalidations >= 1);
    }

    #[test]
    fn reactions_round_trip_through_the_chain() {
        let (_dir, _metrics, store) = setup();
        let ctx = StoreContext::background();
        let post_id = new_id();

        store
            .reaction_save(&ctx, Reaction::new(new_id(), &post_id, "tada"), &[])
            .recv()
            .unwrap();
        assert_eq!(store.reaction_get_for_post(&ctx, &post_id, &[]).recv().unwrap().len(), 1);
        assert!(store.caches().reactions_by_post.get(&post_id).is_some());

        store
            .reaction_delete_all_with_emoji_name(&ctx, "tada", &[])
            .recv()
            .unwrap();
        assert!(store.caches().reactions_by_post.is_empty());
        assert!(store.reaction_get_for_post(&ctx, &post_id, &[]).recv().unwrap().is_empty());
    }

    #[tokio::test]
    async fn channel_ops_run_on_a_worker() {
        let (_dir, _metrics, store) = setup();
        let team_id = new_id();

        let saved = store
            .run_channel_op("Test.SaveChannel", move |channels| {
                channels
                    .save(Channel::new(team_id, "general", "General", ChannelType::Open))
                    .map_err(Into::into)
            })
            .await
            .unwrap();

        let id = saved.id.clone();
        let fetched = store
            .run_channel_op("Test.GetChannel", move |channels| channels.get(&id, false))
            .await
            .unwrap();
        assert_eq!(fetched, saved);
    }

    #[test]
    fn clear_caches_empties_every_cache() {
        let (_dir, _metrics, store) = setup();
        let channel = store
            .channel()
            .save(Channel::new(new_id(), "cached", "Cached", ChannelType::Open))
            .unwrap();
        store.channel().get(&channel.id, true).unwrap();
        store.clear_caches();
        assert!(store.caches().channel_by_id.is_empty());
    }
}
