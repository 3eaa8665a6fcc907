use std::sync::Arc;

use parley_shared::{get_millis, AppError, AppResult, SchemeScope};

use super::{StoreContext, StoreHint, Supplier};
use crate::database::Database;
use crate::error::StoreError;
use crate::models::{Reaction, Role, Scheme};

/// Terminal link: executes every operation against the database.
pub struct SqlSupplier {
    db: Arc<Database>,
}

impl SqlSupplier {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}

/// Log an infrastructure failure and convert it into the caller-facing error.
fn db_error<'a>(
    ctx: &'a StoreContext,
    location: &'static str,
    id: &'static str,
) -> impl FnOnce(StoreError) -> AppError + 'a {
    move |err| {
        tracing::warn!(
            request_id = ctx.request_id(),
            location,
            error = %err,
            "database operation failed"
        );
        err.into_app_error(location, id)
    }
}

impl Supplier for SqlSupplier {
    fn set_chain_next(&self, _next: Arc<dyn Supplier>) {
        tracing::warn!("SqlSupplier is the last link of the chain, ignoring set_chain_next");
    }

    fn next(&self) -> Option<Arc<dyn Supplier>> {
        None
    }

    // Reactions

    fn reaction_save(
        &self,
        ctx: &StoreContext,
        mut reaction: Reaction,
        _hints: &[StoreHint],
    ) -> AppResult<Reaction> {
        reaction.pre_save();
        reaction.is_valid()?;
        self.db
            .save_reaction(&reaction)
            .map_err(db_error(ctx, "SqlReactionStore.Save", "store.sql_reaction.save.save.app_error"))?;
        Ok(reaction)
    }

    fn reaction_delete(
        &self,
        ctx: &StoreContext,
        reaction: Reaction,
        _hints: &[StoreHint],
    ) -> AppResult<Reaction> {
        self.db.delete_reaction(&reaction).map_err(db_error(
            ctx,
            "SqlReactionStore.Delete",
            "store.sql_reaction.delete.app_error",
        ))?;
        Ok(reaction)
    }

    fn reaction_get_for_post(
        &self,
        ctx: &StoreContext,
        post_id: &str,
        _hints: &[StoreHint],
    ) -> AppResult<Vec<Reaction>> {
        self.db.get_reactions_for_post(post_id).map_err(db_error(
            ctx,
            "SqlReactionStore.GetForPost",
            "store.sql_reaction.get_for_post.app_error",
        ))
    }

    fn reactions_bulk_get_for_posts(
        &self,
        ctx: &StoreContext,
        post_ids: &[String],
        _hints: &[StoreHint],
    ) -> AppResult<Vec<Reaction>> {
        self.db.get_reactions_for_posts(post_ids).map_err(db_error(
            ctx,
            "SqlReactionStore.BulkGetForPosts",
            "store.sql_reaction.bulk_get_for_post_ids.app_error",
        ))
    }

    fn reaction_delete_all_with_emoji_name(
        &self,
        ctx: &StoreContext,
        emoji_name: &str,
        _hints: &[StoreHint],
    ) -> AppResult<()> {
        let removed = self.db.delete_reactions_with_emoji(emoji_name).map_err(db_error(
            ctx,
            "SqlReactionStore.DeleteAllWithEmojiName",
            "store.sql_reaction.delete_all_with_emoji_name.delete_reactions.app_error",
        ))?;
        tracing::info!(emoji_name, removed, "deleted reactions by emoji");
        Ok(())
    }

    fn reaction_permanent_delete_batch(
        &self,
        ctx: &StoreContext,
        end_time: i64,
        limit: i64,
        _hints: &[StoreHint],
    ) -> AppResult<i64> {
        let removed = self.db.delete_reactions_batch(end_time, limit).map_err(db_error(
            ctx,
            "SqlReactionStore.PermanentDeleteBatch",
            "store.sql_reaction.permanent_delete_batch.app_error",
        ))?;
        Ok(removed as i64)
    }

    // Roles

    fn role_save(&self, ctx: &StoreContext, mut role: Role, _hints: &[StoreHint]) -> AppResult<Role> {
        const LOC: &str = "SqlRoleStore.Save";

        role.pre_save();
        if let Err(err) = role.is_valid() {
            return Err(AppError::bad_request(LOC, "store.sql_role.save.invalid_role.app_error", "Invalid role")
                .with_details(err.detailed_error));
        }

        match self.db.upsert_role(&role) {
            Ok(()) => Ok(role),
            Err(err) if err.is_unique_violation() => Err(AppError::bad_request(
                LOC,
                "store.sql_role.save.insert.exists.app_error",
                "A role with that name already exists",
            )
            .with_details(format!("name={}", role.name))),
            Err(err) => Err(db_error(ctx, LOC, "store.sql_role.save.insert.app_error")(err)),
        }
    }

    fn role_get(&self, ctx: &StoreContext, role_id: &str, _hints: &[StoreHint]) -> AppResult<Role> {
        const LOC: &str = "SqlRoleStore.Get";
        self.db
            .get_role(role_id)
            .map_err(db_error(ctx, LOC, "store.sql_role.get.app_error"))?
            .ok_or_else(|| {
                AppError::not_found(LOC, "store.sql_role.get.app_error", "Role not found")
                    .with_details(format!("id={role_id}"))
            })
    }

    fn role_get_all(&self, ctx: &StoreContext, _hints: &[StoreHint]) -> AppResult<Vec<Role>> {
        self.db.get_all_roles().map_err(db_error(
            ctx,
            "SqlRoleStore.GetAll",
            "store.sql_role.get_all.app_error",
        ))
    }

    fn role_get_by_name(
        &self,
        ctx: &StoreContext,
        name: &str,
        _hints: &[StoreHint],
    ) -> AppResult<Role> {
        const LOC: &str = "SqlRoleStore.GetByName";
        self.db
            .get_role_by_name(name)
            .map_err(db_error(ctx, LOC, "store.sql_role.get_by_name.app_error"))?
            .ok_or_else(|| {
                AppError::not_found(LOC, "store.sql_role.get_by_name.app_error", "Role not found")
                    .with_details(format!("name={name}"))
            })
    }

    fn role_get_by_names(
        &self,
        ctx: &StoreContext,
        names: &[String],
        _hints: &[StoreHint],
    ) -> AppResult<Vec<Role>> {
        self.db.get_roles_by_names(names).map_err(db_error(
            ctx,
            "SqlRoleStore.GetByNames",
            "store.sql_role.get_by_names.app_error",
        ))
    }

    fn role_delete(&self, ctx: &StoreContext, role_id: &str, _hints: &[StoreHint]) -> AppResult<Role> {
        const LOC: &str = "SqlRoleStore.Delete";
        self.db
            .soft_delete_role(role_id, get_millis())
            .map_err(db_error(ctx, LOC, "store.sql_role.delete.update.app_error"))?
            .ok_or_else(|| {
                AppError::not_found(LOC, "store.sql_role.get.app_error", "Role not found")
                    .with_details(format!("id={role_id}"))
            })
    }

    fn role_permanent_delete_all(&self, ctx: &StoreContext, _hints: &[StoreHint]) -> AppResult<()> {
        let removed = self.db.delete_all_roles().map_err(db_error(
            ctx,
            "SqlRoleStore.PermanentDeleteAll",
            "store.sql_role.permanent_delete_all.app_error",
        ))?;
        tracing::info!(removed, "deleted all roles");
        Ok(())
    }

    // Schemes

    fn scheme_save(
        &self,
        ctx: &StoreContext,
        mut scheme: Scheme,
        _hints: &[StoreHint],
    ) -> AppResult<Scheme> {
        const LOC: &str = "SqlSchemeStore.Save";

        let is_new = scheme.id.is_empty();
        scheme.pre_save();
        scheme.is_valid()?;

        if is_new {
            return match self.db.create_scheme(&mut scheme) {
                Ok(()) => Ok(scheme),
                Err(err) if err.is_unique_violation() => Err(AppError::bad_request(
                    LOC,
                    "store.sql_scheme.save.exists.app_error",
                    "A scheme with that name already exists",
                )
                .with_details(format!("name={}", scheme.name))),
                Err(err) => Err(db_error(ctx, LOC, "store.sql_scheme.save.insert.app_error")(err)),
            };
        }

        let updated = self
            .db
            .update_scheme(&scheme)
            .map_err(db_error(ctx, LOC, "store.sql_scheme.save.update.app_error"))?;
        if !updated {
            return Err(AppError::not_found(LOC, "store.sql_scheme.save.update.app_error", "Scheme not found")
                .with_details(format!("id={}", scheme.id)));
        }
        Ok(scheme)
    }

    fn scheme_get(
        &self,
        ctx: &StoreContext,
        scheme_id: &str,
        _hints: &[StoreHint],
    ) -> AppResult<Scheme> {
        const LOC: &str = "SqlSchemeStore.Get";
        self.db
            .get_scheme(scheme_id)
            .map_err(db_error(ctx, LOC, "store.sql_scheme.get.app_error"))?
            .ok_or_else(|| {
                AppError::not_found(LOC, "store.sql_scheme.get.app_error", "Scheme not found")
                    .with_details(format!("id={scheme_id}"))
            })
    }

    fn scheme_get_by_name(
        &self,
        ctx: &StoreContext,
        name: &str,
        _hints: &[StoreHint],
    ) -> AppResult<Scheme> {
        const LOC: &str = "SqlSchemeStore.GetByName";
        self.db
            .get_scheme_by_name(name)
            .map_err(db_error(ctx, LOC, "store.sql_scheme.get_by_name.app_error"))?
            .ok_or_else(|| {
                AppError::not_found(LOC, "store.sql_scheme.get_by_name.app_error", "Scheme not found")
                    .with_details(format!("name={name}"))
            })
    }

    fn scheme_delete(
        &self,
        ctx: &StoreContext,
        scheme_id: &str,
        _hints: &[StoreHint],
    ) -> AppResult<Scheme> {
        const LOC: &str = "SqlSchemeStore.Delete";
        self.db
            .delete_scheme(scheme_id, get_millis())
            .map_err(db_error(ctx, LOC, "store.sql_scheme.delete.update.app_error"))?
            .ok_or_else(|| {
                AppError::not_found(LOC, "store.sql_scheme.get.app_error", "Scheme not found")
                    .with_details(format!("id={scheme_id}"))
            })
    }

    fn scheme_get_all_page(
        &self,
        ctx: &StoreContext,
        scope: Option<SchemeScope>,
        offset: i64,
        limit: i64,
        _hints: &[StoreHint],
    ) -> AppResult<Vec<Scheme>> {
        self.db.get_schemes_page(scope, offset, limit).map_err(db_error(
            ctx,
            "SqlSchemeStore.GetAllPage",
            "store.sql_scheme.get_all_page.app_error",
        ))
    }

    fn scheme_permanent_delete_all(&self, ctx: &StoreContext, _hints: &[StoreHint]) -> AppResult<()> {
        self.db.delete_all_schemes().map_err(db_error(
            ctx,
            "SqlSchemeStore.PermanentDeleteAll",
            "store.sql_scheme.permanent_delete_all.app_error",
        ))?;
        Ok(())
    }
}
