//! Chain-of-responsibility over the cached entity kinds (roles, schemes,
//! reactions).
//!
//! Every link implements the full [`Supplier`] operation set. A caching link
//! answers reads it can serve and forwards everything else, with the same
//! context and hints, to [`Supplier::next`]. The chain ends at
//! [`SqlSupplier`], which talks to the database and has no successor.

mod local_cache;
mod sql;

use std::sync::Arc;

use parley_shared::{AppResult, SchemeScope};

use crate::models::{Reaction, Role, Scheme};

pub use local_cache::LocalCacheSupplier;
pub use sql::SqlSupplier;

/// Per-call directive for the links of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreHint {
    /// Skip cache lookups; the fresh result still populates the cache.
    NoCache,
    /// Read from the primary database. Bypasses caches entirely, in both
    /// directions.
    Master,
}

pub(crate) fn has_hint(hints: &[StoreHint], hint: StoreHint) -> bool {
    hints.contains(&hint)
}

/// Request-scoped data carried through the chain.
#[derive(Debug, Clone, Default)]
pub struct StoreContext {
    request_id: Option<String>,
}

impl StoreContext {
    /// Context for work not tied to an incoming request.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
        }
    }

    pub fn request_id(&self) -> &str {
        self.request_id.as_deref().unwrap_or("")
    }
}

/// One link of the supplier chain.
pub trait Supplier: Send + Sync {
    /// Wire the downstream link.
    fn set_chain_next(&self, next: Arc<dyn Supplier>);

    /// Downstream link, `None` for the terminal one.
    fn next(&self) -> Option<Arc<dyn Supplier>>;

    // Reactions

    fn reaction_save(
        &self,
        ctx: &StoreContext,
        reaction: Reaction,
        hints: &[StoreHint],
    ) -> AppResult<Reaction>;

    fn reaction_delete(
        &self,
        ctx: &StoreContext,
        reaction: Reaction,
        hints: &[StoreHint],
    ) -> AppResult<Reaction>;

    fn reaction_get_for_post(
        &self,
        ctx: &StoreContext,
        post_id: &str,
        hints: &[StoreHint],
    ) -> AppResult<Vec<Reaction>>;

    fn reactions_bulk_get_for_posts(
        &self,
        ctx: &StoreContext,
        post_ids: &[String],
        hints: &[StoreHint],
    ) -> AppResult<Vec<Reaction>>;

    fn reaction_delete_all_with_emoji_name(
        &self,
        ctx: &StoreContext,
        emoji_name: &str,
        hints: &[StoreHint],
    ) -> AppResult<()>;

    /// Returns the number of reactions removed.
    fn reaction_permanent_delete_batch(
        &self,
        ctx: &StoreContext,
        end_time: i64,
        limit: i64,
        hints: &[StoreHint],
    ) -> AppResult<i64>;

    // Roles

    fn role_save(&self, ctx: &StoreContext, role: Role, hints: &[StoreHint]) -> AppResult<Role>;

    fn role_get(&self, ctx: &StoreContext, role_id: &str, hints: &[StoreHint]) -> AppResult<Role>;

    fn role_get_all(&self, ctx: &StoreContext, hints: &[StoreHint]) -> AppResult<Vec<Role>>;

    fn role_get_by_name(
        &self,
        ctx: &StoreContext,
        name: &str,
        hints: &[StoreHint],
    ) -> AppResult<Role>;

    fn role_get_by_names(
        &self,
        ctx: &StoreContext,
        names: &[String],
        hints: &[StoreHint],
    ) -> AppResult<Vec<Role>>;

    fn role_delete(&self, ctx: &StoreContext, role_id: &str, hints: &[StoreHint])
        -> AppResult<Role>;

    fn role_permanent_delete_all(&self, ctx: &StoreContext, hints: &[StoreHint]) -> AppResult<()>;

    // Schemes

    fn scheme_save(
        &self,
        ctx: &StoreContext,
        scheme: Scheme,
        hints: &[StoreHint],
    ) -> AppResult<Scheme>;

    fn scheme_get(
        &self,
        ctx: &StoreContext,
        scheme_id: &str,
        hints: &[StoreHint],
    ) -> AppResult<Scheme>;

    fn scheme_get_by_name(
        &self,
        ctx: &StoreContext,
        name: &str,
        hints: &[StoreHint],
    ) -> AppResult<Scheme>;

    fn scheme_delete(
        &self,
        ctx: &StoreContext,
        scheme_id: &str,
        hints: &[StoreHint],
    ) -> AppResult<Scheme>;

    /// `scope = None` lists every scope.
    fn scheme_get_all_page(
        &self,
        ctx: &StoreContext,
        scope: Option<SchemeScope>,
        offset: i64,
        limit: i64,
        hints: &[StoreHint],
    ) -> AppResult<Vec<Scheme>>;

    fn scheme_permanent_delete_all(&self, ctx: &StoreContext, hints: &[StoreHint])
        -> AppResult<()>;
}
