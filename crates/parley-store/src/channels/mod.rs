//! Channel entity store.
//!
//! Every mutation runs in one IMMEDIATE transaction that also re-derives the
//! channel's row in `public_channels` from the channel as it stands after the
//! write, so the projection can never be observed out of step with
//! `channels`. Rule checks that need no I/O run before the transaction is
//! opened. Cache entries are invalidated only once the transaction has
//! committed; a failed write leaves the caches untouched.
//!
//! Reads are cache-aside: `allow_from_cache` consults the registry first and
//! every non-master database read refreshes it.

mod member_roles;
mod members;
mod public_index;
mod queries;

use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;

use parley_shared::constants::CHANNEL_EXISTS_ERROR;
use parley_shared::{AppError, AppResult, ChannelType};

use crate::cache::CacheRegistry;
use crate::config::{StoreConfig, UpsertStrategy};
use crate::database::Database;
use crate::error::{is_unique_violation, StoreError};
use crate::models::{direct_channel_name, Channel, ChannelMember};

pub use member_roles::{resolve_member_roles, ResolvedRoles, SchemeDefaults};

pub(crate) const CHANNEL_COLUMNS: &str = "c.id, c.create_at, c.update_at, c.delete_at, c.team_id, \
     c.type, c.display_name, c.name, c.header, c.purpose, c.last_post_at, c.total_msg_count, \
     c.extra_update_at, c.creator_id, c.scheme_id";

/// Failure of a channel save.
///
/// When the name is already taken by a live channel of the same team,
/// `existing` carries that channel so the caller can reconcile with it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error}")]
pub struct SaveChannelError {
    pub error: AppError,
    pub existing: Option<Box<Channel>>,
}

impl SaveChannelError {
    fn exists(error: AppError, existing: Channel) -> Self {
        Self {
            error,
            existing: Some(Box::new(existing)),
        }
    }
}

impl From<AppError> for SaveChannelError {
    fn from(error: AppError) -> Self {
        Self {
            error,
            existing: None,
        }
    }
}

impl From<SaveChannelError> for AppError {
    fn from(err: SaveChannelError) -> Self {
        err.error
    }
}

/// Channels, their memberships and the public channel projection.
#[derive(Clone)]
pub struct ChannelStore {
    db: Arc<Database>,
    caches: Arc<CacheRegistry>,
    max_channels_per_team: i64,
    upsert: UpsertStrategy,
}

impl ChannelStore {
    pub fn new(db: Arc<Database>, caches: Arc<CacheRegistry>, config: &StoreConfig) -> Self {
        Self {
            db,
            caches,
            max_channels_per_team: config.max_channels_per_team,
            upsert: config.public_channel_upsert,
        }
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Save a new open, private or group channel.
    ///
    /// Archived channels and direct channels are rejected before any I/O;
    /// direct channels go through [`ChannelStore::save_direct_channel`].
    pub fn save(&self, channel: Channel) -> Result<Channel, SaveChannelError> {
        const LOC: &str = "SqlChannelStore.Save";

        if channel.delete_at != 0 {
            return Err(AppError::bad_request(
                LOC,
                "store.sql_channel.save.archived_channel.app_error",
                "An archived channel cannot be saved",
            )
            .into());
        }
        if channel.channel_type == ChannelType::Direct {
            return Err(AppError::bad_request(
                LOC,
                "store.sql_channel.save.direct_channel.app_error",
                "Direct channels must be saved with save_direct_channel",
            )
            .into());
        }
        check_unsaved(LOC, &channel)?;

        let mut conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.save.open_transaction.app_error"))?;
        let tx = conn
            .begin()
            .map_err(store_err(LOC, "store.sql_channel.save.open_transaction.app_error"))?;

        let saved = save_channel_on(&tx, channel, self.max_channels_per_team)?;
        public_index::sync_public_channel(&tx, &saved, self.upsert).map_err(store_err(
            LOC,
            "store.sql_channel.save.upsert_public_channel.app_error",
        ))?;

        tx.commit()
            .map_err(store_err(LOC, "store.sql_channel.save.commit_transaction.app_error"))?;

        tracing::debug!(channel_id = %saved.id, team_id = %saved.team_id, "channel saved");
        self.invalidate_channel(&saved.id);
        self.invalidate_channel_by_name(&saved.team_id, &saved.name);
        Ok(saved)
    }

    /// Create the direct channel between two users, with both memberships.
    pub fn create_direct_channel(
        &self,
        user_id: &str,
        other_user_id: &str,
    ) -> Result<Channel, SaveChannelError> {
        let name = direct_channel_name(user_id, other_user_id);
        let channel = Channel::new("", name, "", ChannelType::Direct);

        let member = ChannelMember::new("", user_id);
        let other = (user_id != other_user_id).then(|| ChannelMember::new("", other_user_id));

        self.save_direct_channel(channel, member, other)
    }

    /// Save a direct channel and its memberships in one transaction.
    ///
    /// `other` is skipped when it names the same user as `member`.
    pub fn save_direct_channel(
        &self,
        mut channel: Channel,
        member: ChannelMember,
        other: Option<ChannelMember>,
    ) -> Result<Channel, SaveChannelError> {
        const LOC: &str = "SqlChannelStore.SaveDirectChannel";

        if channel.delete_at != 0 {
            return Err(AppError::bad_request(
                LOC,
                "store.sql_channel.save.archived_channel.app_error",
                "An archived channel cannot be saved",
            )
            .into());
        }
        if channel.channel_type != ChannelType::Direct {
            return Err(AppError::bad_request(
                LOC,
                "store.sql_channel.save_direct_channel.not_direct.app_error",
                "Not a direct channel",
            )
            .into());
        }
        check_unsaved(LOC, &channel)?;
        channel.team_id.clear();

        let other = other.filter(|o| o.user_id != member.user_id);

        let mut conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.save_direct_channel.open_transaction.app_error"))?;
        let tx = conn
            .begin()
            .map_err(store_err(LOC, "store.sql_channel.save_direct_channel.open_transaction.app_error"))?;

        // Direct channels do not count against the team ceiling.
        let saved = save_channel_on(&tx, channel, 0)?;

        let mut user_ids = Vec::with_capacity(2);
        for mut m in std::iter::once(member).chain(other) {
            m.channel_id = saved.id.clone();
            members::insert_member_on(&tx, &mut m, LOC).map_err(|err| {
                AppError::internal(
                    LOC,
                    "store.sql_channel.save_direct_channel.add_members.app_error",
                    "Unable to add direct channel members",
                )
                .with_details(err.detailed_error)
            })?;
            user_ids.push(m.user_id);
        }

        public_index::sync_public_channel(&tx, &saved, self.upsert).map_err(store_err(
            LOC,
            "store.sql_channel.save_direct_channel.upsert_public_channel.app_error",
        ))?;
        tx.commit().map_err(store_err(
            LOC,
            "store.sql_channel.save_direct_channel.commit.app_error",
        ))?;

        tracing::debug!(channel_id = %saved.id, "direct channel saved");
        self.invalidate_channel(&saved.id);
        self.invalidate_member_count(&saved.id);
        self.invalidate_cache_for_channel_members_notify_props(&saved.id);
        for user_id in &user_ids {
            self.invalidate_all_channel_members_for_user(user_id);
        }
        Ok(saved)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Overwrite a live channel. `create_at` is kept from the stored row.
    pub fn update(&self, mut channel: Channel) -> AppResult<Channel> {
        const LOC: &str = "SqlChannelStore.Update";

        channel.pre_update();
        if channel.delete_at != 0 {
            return Err(AppError::bad_request(
                LOC,
                "store.sql_channel.update.archived_channel.app_error",
                "An archived channel cannot be updated",
            ));
        }
        channel.is_valid()?;

        let mut conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.update.open_transaction.app_error"))?;
        let tx = conn
            .begin()
            .map_err(store_err(LOC, "store.sql_channel.update.open_transaction.app_error"))?;

        let previous = find_channel(&tx, &channel.id)
            .map_err(store_err(LOC, "store.sql_channel.update.find.app_error"))?
            .ok_or_else(|| {
                AppError::not_found(LOC, "store.sql_channel.update.find.app_error", "Channel not found")
                    .with_details(format!("id={}", channel.id))
            })?;
        channel.create_at = previous.create_at;

        match update_channel_row(&tx, &channel) {
            Ok(1) => {}
            Ok(rows) => {
                return Err(AppError::internal(
                    LOC,
                    "store.sql_channel.update.app_error",
                    "Unexpected number of channels updated",
                )
                .with_details(format!("id={}, rows={rows}", channel.id)));
            }
            Err(err) if is_unique_violation(&err) => {
                let duplicate = find_by_team_and_name(&tx, &channel.team_id, &channel.name)
                    .map_err(store_err(LOC, "store.sql_channel.update.updating.app_error"))?;
                let details = format!("id={}, name={}", channel.id, channel.name);
                return Err(match duplicate {
                    Some(dup) if dup.delete_at > 0 => AppError::bad_request(
                        LOC,
                        "store.sql_channel.update.previously.app_error",
                        "A channel with that name was previously created",
                    ),
                    _ => AppError::bad_request(
                        LOC,
                        "store.sql_channel.update.exists.app_error",
                        "A channel with that name already exists on the same team",
                    ),
                }
                .with_details(details));
            }
            Err(err) => {
                return Err(store_err(LOC, "store.sql_channel.update.updating.app_error")(err));
            }
        }

        public_index::sync_public_channel(&tx, &channel, self.upsert).map_err(store_err(
            LOC,
            "store.sql_channel.update.upsert_public_channel.app_error",
        ))?;
        tx.commit()
            .map_err(store_err(LOC, "store.sql_channel.update.commit_transaction.app_error"))?;

        self.invalidate_channel(&channel.id);
        self.invalidate_channel_by_name(&previous.team_id, &previous.name);
        self.invalidate_channel_by_name(&channel.team_id, &channel.name);
        Ok(channel)
    }

    /// Set the soft delete marker of a channel and its projection row.
    ///
    /// The per-user membership maps of every member are dropped too, since
    /// the live-only map leaves archived channels out.
    pub fn set_delete_at(&self, channel_id: &str, delete_at: i64, update_at: i64) -> AppResult<()> {
        const LOC: &str = "SqlChannelStore.SetDeleteAt";

        let mut conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.set_delete_at.open_transaction.app_error"))?;
        let tx = conn
            .begin()
            .map_err(store_err(LOC, "store.sql_channel.set_delete_at.open_transaction.app_error"))?;

        tx.execute(
            "UPDATE channels SET delete_at = ?1, update_at = ?2 WHERE id = ?3",
            params![delete_at, update_at, channel_id],
        )
        .map_err(store_err(LOC, "store.sql_channel.set_delete_at.update_channel.app_error"))?;

        let channel = find_channel(&tx, channel_id)
            .map_err(store_err(LOC, "store.sql_channel.set_delete_at.update_channel.app_error"))?
            .ok_or_else(|| {
                AppError::not_found(
                    LOC,
                    "store.sql_channel.set_delete_at.find.app_error",
                    "Channel not found",
                )
                .with_details(format!("id={channel_id}"))
            })?;

        let user_ids = members::member_user_ids(&tx, channel_id)
            .map_err(store_err(LOC, "store.sql_channel.set_delete_at.update_channel.app_error"))?;

        public_index::sync_public_channel(&tx, &channel, self.upsert).map_err(store_err(
            LOC,
            "store.sql_channel.set_delete_at.update_public_channel.app_error",
        ))?;
        tx.commit().map_err(store_err(
            LOC,
            "store.sql_channel.set_delete_at.commit_transaction.app_error",
        ))?;

        tracing::debug!(channel_id, delete_at, members = user_ids.len(), "channel delete marker set");
        self.invalidate_channel(channel_id);
        self.invalidate_channel_by_name(&channel.team_id, &channel.name);
        for user_id in &user_ids {
            self.invalidate_all_channel_members_for_user(user_id);
        }
        Ok(())
    }

    /// Archive a channel.
    pub fn delete(&self, channel_id: &str, time: i64) -> AppResult<()> {
        self.set_delete_at(channel_id, time, time)
    }

    /// Bring an archived channel back.
    pub fn restore(&self, channel_id: &str, time: i64) -> AppResult<()> {
        self.set_delete_at(channel_id, 0, time)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Physically remove a channel, its memberships and its projection row.
    /// Removing an unknown id is not an error.
    pub fn permanent_delete(&self, channel_id: &str) -> AppResult<()> {
        const LOC: &str = "SqlChannelStore.PermanentDelete";

        let mut conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.permanent_delete.open_transaction.app_error"))?;
        let tx = conn
            .begin()
            .map_err(store_err(LOC, "store.sql_channel.permanent_delete.open_transaction.app_error"))?;

        let channel = find_channel(&tx, channel_id)
            .map_err(store_err(LOC, "store.sql_channel.permanent_delete.app_error"))?;
        let user_ids = members::member_user_ids(&tx, channel_id)
            .map_err(store_err(LOC, "store.sql_channel.permanent_delete.app_error"))?;

        tx.execute("DELETE FROM channels WHERE id = ?1", params![channel_id])
            .map_err(store_err(LOC, "store.sql_channel.permanent_delete.app_error"))?;
        public_index::delete_public_channel(&tx, channel_id).map_err(store_err(
            LOC,
            "store.sql_channel.permanent_delete.delete_public_channel.app_error",
        ))?;
        tx.commit().map_err(store_err(
            LOC,
            "store.sql_channel.permanent_delete.commit_transaction.app_error",
        ))?;

        tracing::info!(channel_id, members = user_ids.len(), "channel permanently deleted");
        self.invalidate_channel(channel_id);
        if let Some(channel) = channel {
            self.invalidate_channel_by_name(&channel.team_id, &channel.name);
        }
        self.invalidate_member_count(channel_id);
        self.invalidate_cache_for_channel_members_notify_props(channel_id);
        for user_id in &user_ids {
            self.invalidate_all_channel_members_for_user(user_id);
        }
        Ok(())
    }

    /// Physically remove every channel of a team.
    pub fn permanent_delete_by_team(&self, team_id: &str) -> AppResult<()> {
        const LOC: &str = "SqlChannelStore.PermanentDeleteByTeam";

        let mut conn = self.db.conn().map_err(store_err(
            LOC,
            "store.sql_channel.permanent_delete_by_team.open_transaction.app_error",
        ))?;
        let tx = conn.begin().map_err(store_err(
            LOC,
            "store.sql_channel.permanent_delete_by_team.open_transaction.app_error",
        ))?;

        let channels = query_channels(
            &tx,
            &format!("SELECT {CHANNEL_COLUMNS} FROM channels c WHERE c.team_id = ?1"),
            params![team_id],
        )
        .map_err(store_err(LOC, "store.sql_channel.permanent_delete_by_team.app_error"))?;

        tx.execute("DELETE FROM channels WHERE team_id = ?1", params![team_id])
            .map_err(store_err(LOC, "store.sql_channel.permanent_delete_by_team.app_error"))?;
        public_index::delete_public_channels_for_team(&tx, team_id).map_err(store_err(
            LOC,
            "store.sql_channel.permanent_delete_by_team.delete_public_channels.app_error",
        ))?;
        tx.commit().map_err(store_err(
            LOC,
            "store.sql_channel.permanent_delete_by_team.commit_transaction.app_error",
        ))?;

        tracing::info!(team_id, channels = channels.len(), "team channels permanently deleted");
        for channel in &channels {
            self.invalidate_channel(&channel.id);
            self.invalidate_channel_by_name(&channel.team_id, &channel.name);
            self.invalidate_member_count(&channel.id);
            self.invalidate_cache_for_channel_members_notify_props(&channel.id);
        }
        // Memberships of the removed channels went with them.
        self.caches.all_channel_members_for_user.purge();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Cache control
    // ------------------------------------------------------------------

    pub fn invalidate_channel(&self, channel_id: &str) {
        self.caches.channel_by_id.remove(channel_id);
    }

    pub fn invalidate_channel_by_name(&self, team_id: &str, name: &str) {
        self.caches.channel_by_name.remove(&name_key(team_id, name));
    }

    pub fn invalidate_member_count(&self, channel_id: &str) {
        self.caches.channel_member_counts.remove(channel_id);
    }

    /// Drops both the live-only and the archived-included entry.
    pub fn invalidate_all_channel_members_for_user(&self, user_id: &str) {
        self.caches.all_channel_members_for_user.remove(user_id);
        self.caches
            .all_channel_members_for_user
            .remove(&deleted_key(user_id));
    }

    pub fn invalidate_cache_for_channel_members_notify_props(&self, channel_id: &str) {
        self.caches.all_channel_members_notify_props.remove(channel_id);
    }

    pub fn clear_caches(&self) {
        self.caches.purge_channel_caches();
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn name_key(team_id: &str, name: &str) -> String {
    format!("{team_id}{name}")
}

fn deleted_key(user_id: &str) -> String {
    format!("{user_id}_deleted")
}

/// Log a database failure and turn it into the error reported at `location`.
fn store_err<E: Into<StoreError>>(
    location: &'static str,
    id: &'static str,
) -> impl FnOnce(E) -> AppError {
    move |err| {
        let err = err.into();
        tracing::warn!(location, error = %err, "channel store operation failed");
        err.into_app_error(location, id)
    }
}

fn check_unsaved(location: &str, channel: &Channel) -> AppResult<()> {
    if channel.id.is_empty() {
        return Ok(());
    }
    Err(AppError::bad_request(
        location,
        "store.sql_channel.save_channel.existing.app_error",
        "Must call update for an existing channel",
    )
    .with_details(format!("id={}", channel.id)))
}

/// Insert a new channel on `conn`, enforcing the per-team ceiling for open and
/// private channels. A negative `max_channels_per_team` disables the ceiling.
fn save_channel_on(
    conn: &Connection,
    mut channel: Channel,
    max_channels_per_team: i64,
) -> Result<Channel, SaveChannelError> {
    const LOC: &str = "SqlChannelStore.SaveChannel";

    channel.pre_save();
    channel.is_valid()?;

    if channel.channel_type.is_team_channel() && max_channels_per_team >= 0 {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM channels
                 WHERE team_id = ?1 AND delete_at = 0 AND (type = 'O' OR type = 'P')",
                params![channel.team_id],
                |row| row.get(0),
            )
            .map_err(store_err(LOC, "store.sql_channel.save_channel.current_count.app_error"))?;
        if count >= max_channels_per_team {
            return Err(AppError::bad_request(
                LOC,
                "store.sql_channel.save_channel.limit.app_error",
                "You've reached the limit of the number of allowed channels",
            )
            .with_details(format!("team_id={}, limit={max_channels_per_team}", channel.team_id))
            .into());
        }
    }

    match insert_channel(conn, &channel) {
        Ok(()) => Ok(channel),
        Err(err) if is_unique_violation(&err) => {
            let duplicate = find_by_team_and_name(conn, &channel.team_id, &channel.name)
                .map_err(store_err(LOC, "store.sql_channel.save_channel.save.app_error"))?;
            let details = format!("id={}, name={}", channel.id, channel.name);
            match duplicate {
                Some(dup) if dup.delete_at > 0 => Err(AppError::bad_request(
                    LOC,
                    "store.sql_channel.save_channel.previously.app_error",
                    "A channel with that name was previously created",
                )
                .with_details(details)
                .into()),
                Some(dup) => Err(SaveChannelError::exists(
                    AppError::bad_request(
                        LOC,
                        CHANNEL_EXISTS_ERROR,
                        "A channel with that name already exists on the same team",
                    )
                    .with_details(details),
                    dup,
                )),
                None => Err(store_err(LOC, "store.sql_channel.save_channel.save.app_error")(err).into()),
            }
        }
        Err(err) => Err(store_err(LOC, "store.sql_channel.save_channel.save.app_error")(err).into()),
    }
}

fn insert_channel(conn: &Connection, channel: &Channel) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO channels (id, create_at, update_at, delete_at, team_id, type, display_name,
                               name, header, purpose, last_post_at, total_msg_count,
                               extra_update_at, creator_id, scheme_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            channel.id,
            channel.create_at,
            channel.update_at,
            channel.delete_at,
            channel.team_id,
            channel.channel_type.as_str(),
            channel.display_name,
            channel.name,
            channel.header,
            channel.purpose,
            channel.last_post_at,
            channel.total_msg_count,
            channel.extra_update_at,
            channel.creator_id,
            channel.scheme_id,
        ],
    )?;
    Ok(())
}

fn update_channel_row(conn: &Connection, channel: &Channel) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE channels SET update_at = ?2, delete_at = ?3, team_id = ?4, type = ?5,
                             display_name = ?6, name = ?7, header = ?8, purpose = ?9,
                             last_post_at = ?10, total_msg_count = ?11, extra_update_at = ?12,
                             creator_id = ?13, scheme_id = ?14
         WHERE id = ?1",
        params![
            channel.id,
            channel.update_at,
            channel.delete_at,
            channel.team_id,
            channel.channel_type.as_str(),
            channel.display_name,
            channel.name,
            channel.header,
            channel.purpose,
            channel.last_post_at,
            channel.total_msg_count,
            channel.extra_update_at,
            channel.creator_id,
            channel.scheme_id,
        ],
    )
}

fn find_channel(conn: &Connection, id: &str) -> rusqlite::Result<Option<Channel>> {
    conn.query_row(
        &format!("SELECT {CHANNEL_COLUMNS} FROM channels c WHERE c.id = ?1"),
        params![id],
        row_to_channel,
    )
    .optional()
}

fn find_by_team_and_name(
    conn: &Connection,
    team_id: &str,
    name: &str,
) -> rusqlite::Result<Option<Channel>> {
    conn.query_row(
        &format!("SELECT {CHANNEL_COLUMNS} FROM channels c WHERE c.team_id = ?1 AND c.name = ?2"),
        params![team_id, name],
        row_to_channel,
    )
    .optional()
}

fn query_channels<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<Channel>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, row_to_channel)?;
    rows.collect()
}

/// `?, ?, …` for `n` anonymous parameters.
fn anonymous_placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Map a row selected with [`CHANNEL_COLUMNS`] to a [`Channel`].
fn row_to_channel(row: &Row<'_>) -> rusqlite::Result<Channel> {
    let code: String = row.get(5)?;
    let channel_type = ChannelType::parse(&code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown channel type {code}").into(),
        )
    })?;

    Ok(Channel {
        id: row.get(0)?,
        create_at: row.get(1)?,
        update_at: row.get(2)?,
        delete_at: row.get(3)?,
        team_id: row.get(4)?,
        channel_type,
        display_name: row.get(6)?,
        name: row.get(7)?,
        header: row.get(8)?,
        purpose: row.get(9)?,
        last_post_at: row.get(10)?,
        total_msg_count: row.get(11)?,
        extra_update_at: row.get(12)?,
        creator_id: row.get(13)?,
        scheme_id: row.get(14)?,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::cache::{CacheMetrics, CounterMetrics};
    use crate::models::{Team, User};
    use parley_shared::new_id;

    pub(crate) struct Fixture {
        pub _dir: tempfile::TempDir,
        pub db: Arc<Database>,
        pub caches: Arc<CacheRegistry>,
        pub metrics: Arc<CounterMetrics>,
        pub store: ChannelStore,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self::with_config(|_| {})
        }

        pub fn with_config(tweak: impl FnOnce(&mut StoreConfig)) -> Self {
            crate::init_test_tracing();
            let dir = tempfile::tempdir().unwrap();
            let mut config = StoreConfig::at_path(dir.path().join("channels.db"));
            tweak(&mut config);

            let db = Arc::new(Database::new(&config).unwrap());
            let metrics = Arc::new(CounterMetrics::new());
            let caches = Arc::new(CacheRegistry::new(
                &config.cache,
                metrics.clone() as Arc<dyn CacheMetrics>,
            ));
            let store = ChannelStore::new(db.clone(), caches.clone(), &config);
            Self {
                _dir: dir,
                db,
                caches,
                metrics,
                store,
            }
        }

        pub fn team(&self) -> Team {
            let team = Team {
                id: new_id(),
                name: format!("team-{}", &new_id()[..8]),
                display_name: "Team".into(),
                scheme_id: None,
                delete_at: 0,
            };
            self.db.create_team(&team).unwrap();
            team
        }

        pub fn user(&self) -> User {
            let user = User {
                id: new_id(),
                username: format!("user-{}", &new_id()[..8]),
                delete_at: 0,
            };
            self.db.create_user(&user).unwrap();
            user
        }

        pub fn open_channel(&self, team_id: &str, name: &str) -> Channel {
            self.store
                .save(Channel::new(team_id, name, name.to_uppercase(), ChannelType::Open))
                .unwrap()
        }

        pub fn public_row(&self, id: &str) -> Option<crate::models::PublicChannel> {
            let conn = self.db.conn().unwrap();
            public_index::get_public_channel(&conn, id).unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::Fixture;
    use super::*;
    use crate::dispatch::dispatch;
    use parley_shared::{get_millis, new_id, ErrorStatus};

    #[test]
    fn save_open_channel_creates_projection() {
        let fx = Fixture::new();
        let team = fx.team();

        let saved = fx.open_channel(&team.id, "town-square");
        let stored = fx.store.get_from_master(&saved.id).unwrap();
        assert_eq!(stored.delete_at, 0);

        let row = fx.public_row(&saved.id).expect("projection row");
        assert_eq!(row.display_name, stored.display_name);
        assert_eq!(row.name, stored.name);
        assert_eq!(row.team_id, team.id);
    }

    #[test]
    fn save_private_channel_has_no_projection() {
        let fx = Fixture::new();
        let team = fx.team();

        let saved = fx
            .store
            .save(Channel::new(&team.id, "secret", "Secret", ChannelType::Private))
            .unwrap();
        assert!(fx.public_row(&saved.id).is_none());
    }

    #[test]
    fn update_keeps_projection_in_step() {
        let fx = Fixture::new();
        let team = fx.team();
        let mut channel = fx.open_channel(&team.id, "general");

        channel.display_name = "General Chat".into();
        let updated = fx.store.update(channel).unwrap();
        assert_eq!(fx.public_row(&updated.id).unwrap().display_name, "General Chat");
    }

    #[test]
    fn type_flips_remove_and_recreate_projection() {
        let fx = Fixture::new();
        let team = fx.team();
        let mut channel = fx.open_channel(&team.id, "flip");

        channel.channel_type = ChannelType::Private;
        let mut channel = fx.store.update(channel).unwrap();
        assert!(fx.public_row(&channel.id).is_none());

        channel.channel_type = ChannelType::Open;
        channel.purpose = "back in the open".into();
        let channel = fx.store.update(channel).unwrap();
        let row = fx.public_row(&channel.id).unwrap();
        assert_eq!(row.purpose, "back in the open");
        assert_eq!(row, channel.public_projection());
    }

    #[test]
    fn projection_matches_with_update_then_insert() {
        let fx = Fixture::with_config(|c| c.public_channel_upsert = UpsertStrategy::UpdateThenInsert);
        let team = fx.team();
        let mut channel = fx.open_channel(&team.id, "fallback");
        assert!(fx.public_row(&channel.id).is_some());

        channel.header = "new header".into();
        let channel = fx.store.update(channel).unwrap();
        // Re-running with identical values must not try a second insert.
        let channel = fx.store.update(channel).unwrap();
        assert_eq!(fx.public_row(&channel.id).unwrap().header, "new header");
    }

    #[test]
    fn archived_and_direct_channels_rejected_before_io() {
        let fx = Fixture::new();
        let team = fx.team();

        let mut archived = Channel::new(&team.id, "old", "Old", ChannelType::Open);
        archived.delete_at = 1;
        let err = fx.store.save(archived).unwrap_err();
        assert_eq!(err.error.id, "store.sql_channel.save.archived_channel.app_error");

        let direct = Channel::new("", "a__b", "", ChannelType::Direct);
        let err = fx.store.save(direct).unwrap_err();
        assert_eq!(err.error.id, "store.sql_channel.save.direct_channel.app_error");

        let mut preset = Channel::new(&team.id, "preset", "Preset", ChannelType::Open);
        preset.id = new_id();
        let err = fx.store.save(preset).unwrap_err();
        assert_eq!(err.error.id, "store.sql_channel.save_channel.existing.app_error");
        assert_eq!(err.error.status, ErrorStatus::BadRequest);
    }

    #[test]
    fn duplicate_name_returns_existing_channel() {
        let fx = Fixture::new();
        let team = fx.team();
        let first = fx.open_channel(&team.id, "dup");

        let err = fx
            .store
            .save(Channel::new(&team.id, "dup", "Dup", ChannelType::Open))
            .unwrap_err();
        assert_eq!(err.error.id, CHANNEL_EXISTS_ERROR);
        assert_eq!(err.existing.as_deref(), Some(&first));

        fx.store.delete(&first.id, get_millis()).unwrap();
        let err = fx
            .store
            .save(Channel::new(&team.id, "dup", "Dup", ChannelType::Open))
            .unwrap_err();
        assert_eq!(err.error.id, "store.sql_channel.save_channel.previously.app_error");
        assert!(err.existing.is_none());
    }

    #[test]
    fn team_ceiling_counts_live_team_channels() {
        let fx = Fixture::with_config(|c| c.max_channels_per_team = 2);
        let team = fx.team();
        let a = fx.open_channel(&team.id, "a");
        fx.store
            .save(Channel::new(&team.id, "b", "B", ChannelType::Private))
            .unwrap();

        let err = fx
            .store
            .save(Channel::new(&team.id, "c", "C", ChannelType::Open))
            .unwrap_err();
        assert_eq!(err.error.id, "store.sql_channel.save_channel.limit.app_error");

        // Group channels are not team channels.
        fx.store
            .save(Channel::new("", "group-x", "Group", ChannelType::Group))
            .unwrap();

        fx.store.delete(&a.id, get_millis()).unwrap();
        fx.open_channel(&team.id, "c");
    }

    #[test]
    fn failed_save_rolls_back_and_keeps_cache() {
        let fx = Fixture::with_config(|c| c.max_channels_per_team = 0);
        let team = fx.team();

        let sentinel = Channel::new(&team.id, "x", "X", ChannelType::Open);
        fx.caches.channel_by_name.put(format!("{}x", team.id), sentinel.clone());

        assert!(fx
            .store
            .save(Channel::new(&team.id, "x", "X", ChannelType::Open))
            .is_err());
        let conn = fx.db.conn().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM channels", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(fx.caches.channel_by_name.get(&format!("{}x", team.id)), Some(sentinel));
    }

    #[test]
    fn get_after_save_sees_saved_fields() {
        let fx = Fixture::new();
        let team = fx.team();
        let saved = fx.open_channel(&team.id, "fresh");
        assert_eq!(fx.store.get(&saved.id, true).unwrap(), saved);
    }

    #[test]
    fn reads_after_writes_ignore_stale_entries_already_cached() {
        let fx = Fixture::new();
        let team = fx.team();

        let mut stale = Channel::new(&team.id, "seeded", "Stale", ChannelType::Open);
        stale.id = new_id();
        fx.caches
            .channel_by_name
            .put(format!("{}seeded", team.id), stale.clone());

        let saved = fx.open_channel(&team.id, "seeded");
        assert_eq!(fx.store.get_by_name(&team.id, "seeded", true).unwrap(), saved);

        let mut leftover = saved.clone();
        leftover.display_name = "Leftover".into();
        fx.caches.channel_by_id.put(saved.id.clone(), leftover);

        let mut changed = saved.clone();
        changed.display_name = "Current".into();
        changed.purpose = "up to date".into();
        let updated = fx.store.update(changed).unwrap();

        let read = fx.store.get(&saved.id, true).unwrap();
        assert_eq!(read, updated);
        assert_eq!(read.display_name, "Current");
    }

    #[test]
    fn update_invalidates_cached_channel() {
        let fx = Fixture::new();
        let team = fx.team();
        let channel = fx.open_channel(&team.id, "cached");

        let mut cached = fx.store.get(&channel.id, true).unwrap();
        fx.store.get_by_name(&team.id, "cached", true).unwrap();
        cached.display_name = "Renamed".into();
        cached.name = "renamed".into();
        fx.store.update(cached).unwrap();

        assert_eq!(fx.store.get(&channel.id, true).unwrap().display_name, "Renamed");
        assert!(fx.store.get_by_name(&team.id, "cached", true).unwrap_err().is_not_found());
        assert_eq!(fx.store.get_by_name(&team.id, "renamed", true).unwrap().id, channel.id);
    }

    #[test]
    fn set_delete_at_invalidates_and_updates_projection() {
        let fx = Fixture::new();
        let team = fx.team();
        let channel = fx.open_channel(&team.id, "doomed");
        fx.store.get(&channel.id, true).unwrap();
        fx.store.get_by_name(&team.id, "doomed", true).unwrap();

        let t = get_millis();
        fx.store.set_delete_at(&channel.id, t, t).unwrap();

        assert!(fx.caches.channel_by_id.get(&channel.id).is_none());
        assert!(fx.store.get_by_name(&team.id, "doomed", true).unwrap_err().is_not_found());
        assert_eq!(fx.store.get(&channel.id, true).unwrap().delete_at, t);
        assert_eq!(fx.public_row(&channel.id).unwrap().delete_at, t);

        fx.store.restore(&channel.id, t + 1).unwrap();
        assert_eq!(fx.public_row(&channel.id).unwrap().delete_at, 0);
        assert_eq!(fx.store.get(&channel.id, true).unwrap().update_at, t + 1);
    }

    #[test]
    fn set_delete_at_on_unknown_channel_is_not_found() {
        let fx = Fixture::new();
        let err = fx.store.set_delete_at(&new_id(), 1, 1).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn update_of_archived_channel_is_rejected() {
        let fx = Fixture::new();
        let team = fx.team();
        let mut channel = fx.open_channel(&team.id, "archived");
        channel.delete_at = 5;
        let err = fx.store.update(channel).unwrap_err();
        assert_eq!(err.id, "store.sql_channel.update.archived_channel.app_error");
    }

    #[test]
    fn update_into_taken_name_is_exists() {
        let fx = Fixture::new();
        let team = fx.team();
        fx.open_channel(&team.id, "taken");
        let mut other = fx.open_channel(&team.id, "other");

        other.name = "taken".into();
        let err = fx.store.update(other).unwrap_err();
        assert_eq!(err.id, "store.sql_channel.update.exists.app_error");
    }

    #[test]
    fn permanent_delete_removes_rows_and_members() {
        let fx = Fixture::new();
        let team = fx.team();
        let user = fx.user();
        let channel = fx.open_channel(&team.id, "gone");
        fx.store
            .save_member(ChannelMember::new(&channel.id, &user.id))
            .unwrap();

        fx.store.permanent_delete(&channel.id).unwrap();
        assert!(fx.store.get(&channel.id, true).unwrap_err().is_not_found());
        assert!(fx.public_row(&channel.id).is_none());
        assert!(fx.store.get_member(&channel.id, &user.id).unwrap_err().is_not_found());

        // Idempotent.
        fx.store.permanent_delete(&channel.id).unwrap();
    }

    #[test]
    fn permanent_delete_by_team_clears_projection() {
        let fx = Fixture::new();
        let team = fx.team();
        let other_team = fx.team();
        let a = fx.open_channel(&team.id, "a");
        let b = fx.open_channel(&team.id, "b");
        let keep = fx.open_channel(&other_team.id, "a");

        fx.store.permanent_delete_by_team(&team.id).unwrap();
        assert!(fx.public_row(&a.id).is_none());
        assert!(fx.public_row(&b.id).is_none());
        assert!(fx.public_row(&keep.id).is_some());
    }

    #[test]
    fn direct_channel_with_both_members() {
        let fx = Fixture::new();
        let (u1, u2) = (fx.user(), fx.user());

        let channel = fx.store.create_direct_channel(&u1.id, &u2.id).unwrap();
        assert_eq!(channel.channel_type, ChannelType::Direct);
        assert_eq!(channel.name, direct_channel_name(&u1.id, &u2.id));
        assert!(channel.team_id.is_empty());
        assert!(fx.public_row(&channel.id).is_none());
        assert_eq!(fx.store.get_member_count(&channel.id, false).unwrap(), 2);

        let err = fx.store.create_direct_channel(&u2.id, &u1.id).unwrap_err();
        assert_eq!(err.error.id, CHANNEL_EXISTS_ERROR);
        assert_eq!(err.existing.map(|c| c.id), Some(channel.id));
    }

    #[test]
    fn direct_channel_with_self_has_one_member() {
        let fx = Fixture::new();
        let user = fx.user();
        let channel = fx.store.create_direct_channel(&user.id, &user.id).unwrap();
        assert_eq!(fx.store.get_member_count(&channel.id, false).unwrap(), 1);
    }

    #[test]
    fn direct_channel_member_failure_rolls_back() {
        let fx = Fixture::new();
        let user = fx.user();
        let channel = Channel::new("", "broken", "", ChannelType::Direct);
        let mut bad = ChannelMember::new("", &user.id);
        bad.scheme_guest = true;

        let err = fx
            .store
            .save_direct_channel(channel, ChannelMember::new("", "not-an-id"), Some(bad))
            .unwrap_err();
        assert_eq!(
            err.error.id,
            "store.sql_channel.save_direct_channel.add_members.app_error"
        );
        let conn = fx.db.conn().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM channels", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn concurrent_saves_complete_independently() {
        let fx = Fixture::new();
        let team = fx.team();

        let workers: Vec<_> = ["east", "west"]
            .into_iter()
            .map(|name| {
                let store = fx.store.clone();
                let team_id = team.id.clone();
                dispatch("Test.ConcurrentSave", move || {
                    store
                        .save(Channel::new(team_id, name, name, ChannelType::Open))
                        .map_err(AppError::from)
                })
            })
            .collect();

        let saved: Vec<Channel> = workers.into_iter().map(|ch| ch.recv().unwrap()).collect();
        assert_ne!(saved[0].id, saved[1].id);
        for channel in &saved {
            assert!(fx.public_row(&channel.id).is_some());
        }
    }
}
