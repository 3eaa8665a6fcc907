use std::sync::Arc;

use parking_lot::RwLock;

use parley_shared::{AppError, AppResult, SchemeScope};

use super::{has_hint, StoreContext, StoreHint, Supplier};
use crate::cache::{CacheRegistry, LocalCache};
use crate::models::{Reaction, Role, Scheme};

/// Caching link: serves roles by name, schemes by id and reactions by post
/// from the registry, and invalidates them after every successful write.
pub struct LocalCacheSupplier {
    caches: Arc<CacheRegistry>,
    next: RwLock<Option<Arc<dyn Supplier>>>,
}

impl LocalCacheSupplier {
    pub fn new(caches: Arc<CacheRegistry>) -> Self {
        Self {
            caches,
            next: RwLock::new(None),
        }
    }

    fn downstream(&self, location: &'static str) -> AppResult<Arc<dyn Supplier>> {
        self.next.read().clone().ok_or_else(|| {
            tracing::error!(location, "supplier chain has no next link");
            AppError::internal(
                location,
                "store.local_cache_supplier.no_next.app_error",
                "The store is not fully configured",
            )
        })
    }
}

/// Cache-aside read shared by the single-key lookups.
fn cached_read<V: Clone>(
    cache: &LocalCache<V>,
    key: &str,
    hints: &[StoreHint],
    load: impl FnOnce() -> AppResult<V>,
) -> AppResult<V> {
    if has_hint(hints, StoreHint::Master) {
        return load();
    }
    if !has_hint(hints, StoreHint::NoCache) {
        if let Some(hit) = cache.get(key) {
            return Ok(hit);
        }
    }
    let generation = cache.generation();
    let value = load()?;
    cache.put_if_unchanged(key, value.clone(), generation);
    Ok(value)
}

impl Supplier for LocalCacheSupplier {
    fn set_chain_next(&self, next: Arc<dyn Supplier>) {
        *self.next.write() = Some(next);
    }

    fn next(&self) -> Option<Arc<dyn Supplier>> {
        self.next.read().clone()
    }

    // Reactions

    fn reaction_save(
        &self,
        ctx: &StoreContext,
        reaction: Reaction,
        hints: &[StoreHint],
    ) -> AppResult<Reaction> {
        let saved = self.downstream("LocalCacheReactionStore.Save")?.reaction_save(ctx, reaction, hints)?;
        self.caches.reactions_by_post.remove(&saved.post_id);
        Ok(saved)
    }

    fn reaction_delete(
        &self,
        ctx: &StoreContext,
        reaction: Reaction,
        hints: &[StoreHint],
    ) -> AppResult<Reaction> {
        let deleted = self
            .downstream("LocalCacheReactionStore.Delete")?
            .reaction_delete(ctx, reaction, hints)?;
        self.caches.reactions_by_post.remove(&deleted.post_id);
        Ok(deleted)
    }

    fn reaction_get_for_post(
        &self,
        ctx: &StoreContext,
        post_id: &str,
        hints: &[StoreHint],
    ) -> AppResult<Vec<Reaction>> {
        cached_read(&self.caches.reactions_by_post, post_id, hints, || {
            self.downstream("LocalCacheReactionStore.GetForPost")?
                .reaction_get_for_post(ctx, post_id, hints)
        })
    }

    fn reactions_bulk_get_for_posts(
        &self,
        ctx: &StoreContext,
        post_ids: &[String],
        hints: &[StoreHint],
    ) -> AppResult<Vec<Reaction>> {
        self.downstream("LocalCacheReactionStore.BulkGetForPosts")?
            .reactions_bulk_get_for_posts(ctx, post_ids, hints)
    }

    fn reaction_delete_all_with_emoji_name(
        &self,
        ctx: &StoreContext,
        emoji_name: &str,
        hints: &[StoreHint],
    ) -> AppResult<()> {
        self.downstream("LocalCacheReactionStore.DeleteAllWithEmojiName")?
            .reaction_delete_all_with_emoji_name(ctx, emoji_name, hints)?;
        self.caches.reactions_by_post.purge();
        Ok(())
    }

    fn reaction_permanent_delete_batch(
        &self,
        ctx: &StoreContext,
        end_time: i64,
        limit: i64,
        hints: &[StoreHint],
    ) -> AppResult<i64> {
        let removed = self
            .downstream("LocalCacheReactionStore.PermanentDeleteBatch")?
            .reaction_permanent_delete_batch(ctx, end_time, limit, hints)?;
        self.caches.reactions_by_post.purge();
        Ok(removed)
    }

    // Roles

    fn role_save(&self, ctx: &StoreContext, role: Role, hints: &[StoreHint]) -> AppResult<Role> {
        let requested_name = role.name.clone();
        let saved = self.downstream("LocalCacheRoleStore.Save")?.role_save(ctx, role, hints)?;
        self.caches.role_by_name.remove(&requested_name);
        if saved.name != requested_name {
            self.caches.role_by_name.remove(&saved.name);
        }
        Ok(saved)
    }

    fn role_get(&self, ctx: &StoreContext, role_id: &str, hints: &[StoreHint]) -> AppResult<Role> {
        self.downstream("LocalCacheRoleStore.Get")?.role_get(ctx, role_id, hints)
    }

    fn role_get_all(&self, ctx: &StoreContext, hints: &[StoreHint]) -> AppResult<Vec<Role>> {
        self.downstream("LocalCacheRoleStore.GetAll")?.role_get_all(ctx, hints)
    }

    fn role_get_by_name(
        &self,
        ctx: &StoreContext,
        name: &str,
        hints: &[StoreHint],
    ) -> AppResult<Role> {
        cached_read(&self.caches.role_by_name, name, hints, || {
            self.downstream("LocalCacheRoleStore.GetByName")?
                .role_get_by_name(ctx, name, hints)
        })
    }

    fn role_get_by_names(
        &self,
        ctx: &StoreContext,
        names: &[String],
        hints: &[StoreHint],
    ) -> AppResult<Vec<Role>> {
        let next = self.downstream("LocalCacheRoleStore.GetByNames")?;
        if has_hint(hints, StoreHint::Master) {
            return next.role_get_by_names(ctx, names, hints);
        }

        let mut found = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            let hit = if has_hint(hints, StoreHint::NoCache) {
                None
            } else {
                self.caches.role_by_name.get(name)
            };
            match hit {
                Some(role) => found.push(role),
                None => missing.push(name.clone()),
            }
        }

        if !missing.is_empty() {
            let generation = self.caches.role_by_name.generation();
            let loaded = next.role_get_by_names(ctx, &missing, hints)?;
            for role in &loaded {
                self.caches
                    .role_by_name
                    .put_if_unchanged(role.name.clone(), role.clone(), generation);
            }
            found.extend(loaded);
        }
        Ok(found)
    }

    fn role_delete(&self, ctx: &StoreContext, role_id: &str, hints: &[StoreHint]) -> AppResult<Role> {
        let deleted = self
            .downstream("LocalCacheRoleStore.Delete")?
            .role_delete(ctx, role_id, hints)?;
        self.caches.role_by_name.remove(&deleted.name);
        Ok(deleted)
    }

    fn role_permanent_delete_all(&self, ctx: &StoreContext, hints: &[StoreHint]) -> AppResult<()> {
        self.downstream("LocalCacheRoleStore.PermanentDeleteAll")?
            .role_permanent_delete_all(ctx, hints)?;
        self.caches.role_by_name.purge();
        Ok(())
    }

    // Schemes

    fn scheme_save(
        &self,
        ctx: &StoreContext,
        scheme: Scheme,
        hints: &[StoreHint],
    ) -> AppResult<Scheme> {
        let saved = self.downstream("LocalCacheSchemeStore.Save")?.scheme_save(ctx, scheme, hints)?;
        self.caches.scheme_by_id.remove(&saved.id);
        Ok(saved)
    }

    fn scheme_get(
        &self,
        ctx: &StoreContext,
        scheme_id: &str,
        hints: &[StoreHint],
    ) -> AppResult<Scheme> {
        cached_read(&self.caches.scheme_by_id, scheme_id, hints, || {
            self.downstream("LocalCacheSchemeStore.Get")?
                .scheme_get(ctx, scheme_id, hints)
        })
    }

    fn scheme_get_by_name(
        &self,
        ctx: &StoreContext,
        name: &str,
        hints: &[StoreHint],
    ) -> AppResult<Scheme> {
        self.downstream("LocalCacheSchemeStore.GetByName")?
            .scheme_get_by_name(ctx, name, hints)
    }

    fn scheme_delete(
        &self,
        ctx: &StoreContext,
        scheme_id: &str,
        hints: &[StoreHint],
    ) -> AppResult<Scheme> {
        let deleted = self
            .downstream("LocalCacheSchemeStore.Delete")?
            .scheme_delete(ctx, scheme_id, hints)?;
        self.caches.scheme_by_id.remove(scheme_id);
        // The scheme's roles are gone and its channels were reset.
        self.caches.role_by_name.purge();
        self.caches.purge_channel_caches();
        Ok(deleted)
    }

    fn scheme_get_all_page(
        &self,
        ctx: &StoreContext,
        scope: Option<SchemeScope>,
        offset: i64,
        limit: i64,
        hints: &[StoreHint],
    ) -> AppResult<Vec<Scheme>> {
        self.downstream("LocalCacheSchemeStore.GetAllPage")?
            .scheme_get_all_page(ctx, scope, offset, limit, hints)
    }

    fn scheme_permanent_delete_all(&self, ctx: &StoreContext, hints: &[StoreHint]) -> AppResult<()> {
        self.downstream("LocalCacheSchemeStore.PermanentDeleteAll")?
            .scheme_permanent_delete_all(ctx, hints)?;
        self.caches.scheme_by_id.purge();
        Ok(())
    }
}
