use std::collections::HashMap;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use parley_shared::constants::MISSING_CHANNEL_MEMBER_ERROR;
use parley_shared::{AppError, AppResult};

use super::member_roles::{resolve_member_roles, ResolvedRoles, SchemeDefaults};
use super::{anonymous_placeholders, deleted_key, store_err, ChannelStore};
use crate::models::{ChannelMember, NotifyProps};

/// Memberships joined with the schemes of their channel and of the channel's
/// team, which supply the scheme-implied role names.
const MEMBER_SELECT: &str = "SELECT cm.channel_id, cm.user_id, cm.roles, cm.last_viewed_at,
        cm.msg_count, cm.mention_count, cm.notify_props, cm.last_update_at,
        cm.scheme_guest, cm.scheme_user, cm.scheme_admin,
        cs.default_channel_guest_role, cs.default_channel_user_role, cs.default_channel_admin_role,
        ts.default_channel_guest_role, ts.default_channel_user_role, ts.default_channel_admin_role
     FROM channel_members cm
     INNER JOIN channels c ON c.id = cm.channel_id
     LEFT JOIN schemes cs ON cs.id = c.scheme_id
     LEFT JOIN teams t ON t.id = c.team_id
     LEFT JOIN schemes ts ON ts.id = t.scheme_id";

impl ChannelStore {
    pub fn save_member(&self, mut member: ChannelMember) -> AppResult<ChannelMember> {
        const LOC: &str = "SqlChannelStore.SaveMember";

        // Conflict detection must not trust a cached channel.
        self.get_from_master(&member.channel_id)?;

        let conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.save_member.save.app_error"))?;
        insert_member_on(&conn, &mut member, LOC)?;
        let saved = fetch_member(&conn, &member.channel_id, &member.user_id)
            .map_err(store_err(LOC, "store.sql_channel.save_member.save.app_error"))?
            .ok_or_else(|| missing_member(LOC, &member.channel_id, &member.user_id))?;

        self.invalidate_membership(&saved.channel_id, &saved.user_id);
        Ok(saved)
    }

    pub fn update_member(&self, mut member: ChannelMember) -> AppResult<ChannelMember> {
        const LOC: &str = "SqlChannelStore.UpdateMember";

        member.pre_update();
        apply_stored_roles(&mut member);
        member.is_valid()?;
        let notify_props = serde_json::to_string(&member.notify_props)
            .map_err(store_err(LOC, "store.sql_channel.update_member.app_error"))?;

        let conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.update_member.app_error"))?;
        conn.execute(
            "UPDATE channel_members
             SET roles = ?3, last_viewed_at = ?4, msg_count = ?5, mention_count = ?6,
                 notify_props = ?7, last_update_at = ?8,
                 scheme_guest = ?9, scheme_user = ?10, scheme_admin = ?11
             WHERE channel_id = ?1 AND user_id = ?2",
            params![
                member.channel_id,
                member.user_id,
                member.explicit_roles,
                member.last_viewed_at,
                member.msg_count,
                member.mention_count,
                notify_props,
                member.last_update_at,
                member.scheme_guest,
                member.scheme_user,
                member.scheme_admin,
            ],
        )
        .map_err(store_err(LOC, "store.sql_channel.update_member.app_error"))?;

        let updated = fetch_member(&conn, &member.channel_id, &member.user_id)
            .map_err(store_err(LOC, "store.sql_channel.update_member.app_error"))?
            .ok_or_else(|| missing_member(LOC, &member.channel_id, &member.user_id))?;

        self.invalidate_membership(&updated.channel_id, &updated.user_id);
        Ok(updated)
    }

    pub fn get_member(&self, channel_id: &str, user_id: &str) -> AppResult<ChannelMember> {
        const LOC: &str = "SqlChannelStore.GetMember";
        let conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.get_member.app_error"))?;
        fetch_member(&conn, channel_id, user_id)
            .map_err(store_err(LOC, "store.sql_channel.get_member.app_error"))?
            .ok_or_else(|| missing_member(LOC, channel_id, user_id))
    }

    pub fn get_members(
        &self,
        channel_id: &str,
        offset: i64,
        limit: i64,
    ) -> AppResult<Vec<ChannelMember>> {
        const LOC: &str = "SqlChannelStore.GetMembers";
        let conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.get_members.app_error"))?;
        query_members(
            &conn,
            &format!(
                "{MEMBER_SELECT} WHERE cm.channel_id = ?1 ORDER BY cm.user_id LIMIT ?2 OFFSET ?3"
            ),
            params![channel_id, limit, offset],
        )
        .map_err(store_err(LOC, "store.sql_channel.get_members.app_error"))
    }

    pub fn get_members_by_ids(
        &self,
        channel_id: &str,
        user_ids: &[String],
    ) -> AppResult<Vec<ChannelMember>> {
        const LOC: &str = "SqlChannelStore.GetMembersByIds";
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.get_members_by_ids.app_error"))?;
        let sql = format!(
            "{MEMBER_SELECT} WHERE cm.channel_id = ? AND cm.user_id IN ({}) ORDER BY cm.user_id",
            anonymous_placeholders(user_ids.len())
        );
        let args = std::iter::once(channel_id).chain(user_ids.iter().map(String::as_str));
        query_members(&conn, &sql, params_from_iter(args))
            .map_err(store_err(LOC, "store.sql_channel.get_members_by_ids.app_error"))
    }

    /// Removing a membership that does not exist is not an error.
    pub fn remove_member(&self, channel_id: &str, user_id: &str) -> AppResult<()> {
        const LOC: &str = "SqlChannelStore.RemoveMember";
        self.db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.remove_member.app_error"))?
            .execute(
                "DELETE FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                params![channel_id, user_id],
            )
            .map_err(store_err(LOC, "store.sql_channel.remove_member.app_error"))?;

        self.invalidate_membership(channel_id, user_id);
        Ok(())
    }

    pub fn permanent_delete_members_by_channel(&self, channel_id: &str) -> AppResult<()> {
        const LOC: &str = "SqlChannelStore.PermanentDeleteMembersByChannel";
        let mut conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.remove_member.app_error"))?;
        let tx = conn
            .begin()
            .map_err(store_err(LOC, "store.sql_channel.remove_member.app_error"))?;
        let user_ids = member_user_ids(&tx, channel_id)
            .map_err(store_err(LOC, "store.sql_channel.remove_member.app_error"))?;
        tx.execute("DELETE FROM channel_members WHERE channel_id = ?1", params![channel_id])
            .map_err(store_err(LOC, "store.sql_channel.remove_member.app_error"))?;
        tx.commit()
            .map_err(store_err(LOC, "store.sql_channel.remove_member.app_error"))?;

        self.invalidate_member_count(channel_id);
        self.invalidate_cache_for_channel_members_notify_props(channel_id);
        for user_id in &user_ids {
            self.invalidate_all_channel_members_for_user(user_id);
        }
        Ok(())
    }

    pub fn permanent_delete_members_by_user(&self, user_id: &str) -> AppResult<()> {
        const LOC: &str = "SqlChannelStore.PermanentDeleteMembersByUser";
        let mut conn = self.db.conn().map_err(store_err(
            LOC,
            "store.sql_channel.permanent_delete_members_by_user.app_error",
        ))?;
        let tx = conn.begin().map_err(store_err(
            LOC,
            "store.sql_channel.permanent_delete_members_by_user.app_error",
        ))?;

        let channel_ids = {
            let mut stmt = tx
                .prepare("SELECT channel_id FROM channel_members WHERE user_id = ?1")
                .map_err(store_err(LOC, "store.sql_channel.permanent_delete_members_by_user.app_error"))?;
            let rows = stmt
                .query_map(params![user_id], |row| row.get::<_, String>(0))
                .map_err(store_err(LOC, "store.sql_channel.permanent_delete_members_by_user.app_error"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(store_err(LOC, "store.sql_channel.permanent_delete_members_by_user.app_error"))?
        };
        tx.execute("DELETE FROM channel_members WHERE user_id = ?1", params![user_id])
            .map_err(store_err(LOC, "store.sql_channel.permanent_delete_members_by_user.app_error"))?;
        tx.commit()
            .map_err(store_err(LOC, "store.sql_channel.permanent_delete_members_by_user.app_error"))?;

        self.invalidate_all_channel_members_for_user(user_id);
        for channel_id in &channel_ids {
            self.invalidate_member_count(channel_id);
            self.invalidate_cache_for_channel_members_notify_props(channel_id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    /// Channel id to full role string for every membership of `user_id`.
    ///
    /// Cached under the user id, or `user_id + "_deleted"` when archived
    /// channels are included. The cache is only filled when
    /// `allow_from_cache` is set.
    pub fn get_all_channel_members_for_user(
        &self,
        user_id: &str,
        allow_from_cache: bool,
        include_deleted: bool,
    ) -> AppResult<HashMap<String, String>> {
        const LOC: &str = "SqlChannelStore.GetAllChannelMembersForUser";
        let key = if include_deleted {
            deleted_key(user_id)
        } else {
            user_id.to_string()
        };

        if allow_from_cache {
            if let Some(map) = self.caches.all_channel_members_for_user.get(&key) {
                return Ok(map);
            }
        }

        let generation = self.caches.all_channel_members_for_user.generation();
        let filter = if include_deleted { "" } else { "AND c.delete_at = 0" };
        let conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.get_channels.get.app_error"))?;
        let members = query_members(
            &conn,
            &format!("{MEMBER_SELECT} WHERE cm.user_id = ?1 {filter}"),
            params![user_id],
        )
        .map_err(store_err(LOC, "store.sql_channel.get_channels.get.app_error"))?;

        let map: HashMap<String, String> = members
            .into_iter()
            .map(|m| (m.channel_id, m.roles))
            .collect();
        if allow_from_cache {
            self.caches
                .all_channel_members_for_user
                .put_if_unchanged(key, map.clone(), generation);
        }
        Ok(map)
    }

    /// User id to notify props for every member of a channel.
    pub fn get_all_channel_members_notify_props_for_channel(
        &self,
        channel_id: &str,
        allow_from_cache: bool,
    ) -> AppResult<HashMap<String, NotifyProps>> {
        const LOC: &str = "SqlChannelStore.GetAllChannelMembersNotifyPropsForChannel";

        if allow_from_cache {
            if let Some(map) = self.caches.all_channel_members_notify_props.get(channel_id) {
                return Ok(map);
            }
        }

        let generation = self.caches.all_channel_members_notify_props.generation();
        let conn = self.db.conn().map_err(store_err(
            LOC,
            "store.sql_channel.get_members.app_error",
        ))?;
        let mut stmt = conn
            .prepare("SELECT user_id, notify_props FROM channel_members WHERE channel_id = ?1")
            .map_err(store_err(LOC, "store.sql_channel.get_members.app_error"))?;
        let rows = stmt
            .query_map(params![channel_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(store_err(LOC, "store.sql_channel.get_members.app_error"))?;

        let mut map = HashMap::new();
        for row in rows {
            let (user_id, raw) = row.map_err(store_err(LOC, "store.sql_channel.get_members.app_error"))?;
            let props: NotifyProps = serde_json::from_str(&raw)
                .map_err(store_err(LOC, "store.sql_channel.get_members.app_error"))?;
            map.insert(user_id, props);
        }

        self.caches
            .all_channel_members_notify_props
            .put_if_unchanged(channel_id, map.clone(), generation);
        Ok(map)
    }

    /// Members of a channel whose user is not deactivated.
    pub fn get_member_count(&self, channel_id: &str, allow_from_cache: bool) -> AppResult<i64> {
        const LOC: &str = "SqlChannelStore.GetMemberCount";

        if allow_from_cache {
            if let Some(count) = self.caches.channel_member_counts.get(channel_id) {
                return Ok(count);
            }
        }

        let generation = self.caches.channel_member_counts.generation();
        let count: i64 = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.get_member_count.app_error"))?
            .query_row(
                "SELECT COUNT(*) FROM channel_members cm
                 INNER JOIN users u ON u.id = cm.user_id
                 WHERE cm.channel_id = ?1 AND u.delete_at = 0",
                params![channel_id],
                |row| row.get(0),
            )
            .map_err(store_err(LOC, "store.sql_channel.get_member_count.app_error"))?;

        if allow_from_cache {
            self.caches
                .channel_member_counts
                .put_if_unchanged(channel_id, count, generation);
        }
        Ok(count)
    }

    /// Member count, 0 if it can not be determined.
    pub fn get_member_count_from_cache(&self, channel_id: &str) -> i64 {
        if let Some(count) = self.caches.channel_member_counts.get(channel_id) {
            return count;
        }
        match self.get_member_count(channel_id, true) {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(channel_id, error = %err, "member count unavailable");
                0
            }
        }
    }

    /// Membership check against the cached per-user map; `false` when the
    /// map can not be loaded.
    pub fn is_user_in_channel_use_cache(&self, user_id: &str, channel_id: &str) -> bool {
        if let Some(map) = self.caches.all_channel_members_for_user.get(user_id) {
            return map.contains_key(channel_id);
        }
        match self.get_all_channel_members_for_user(user_id, true, false) {
            Ok(map) => map.contains_key(channel_id),
            Err(err) => {
                tracing::error!(user_id, channel_id, error = %err, "membership lookup failed");
                false
            }
        }
    }

    fn invalidate_membership(&self, channel_id: &str, user_id: &str) {
        self.invalidate_member_count(channel_id);
        self.invalidate_cache_for_channel_members_notify_props(channel_id);
        self.invalidate_all_channel_members_for_user(user_id);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Normalize `member` and insert it on `conn`; shared by
/// [`ChannelStore::save_member`] and direct channel creation.
pub(super) fn insert_member_on(
    conn: &Connection,
    member: &mut ChannelMember,
    location: &'static str,
) -> AppResult<()> {
    member.pre_save();
    apply_stored_roles(member);
    member.is_valid()?;

    let notify_props = serde_json::to_string(&member.notify_props)
        .map_err(store_err(location, "store.sql_channel.save_member.save.app_error"))?;

    let inserted = conn.execute(
        "INSERT INTO channel_members (channel_id, user_id, roles, last_viewed_at, msg_count,
                                      mention_count, notify_props, last_update_at,
                                      scheme_guest, scheme_user, scheme_admin)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            member.channel_id,
            member.user_id,
            member.explicit_roles,
            member.last_viewed_at,
            member.msg_count,
            member.mention_count,
            notify_props,
            member.last_update_at,
            member.scheme_guest,
            member.scheme_user,
            member.scheme_admin,
        ],
    );

    match inserted {
        Ok(_) => Ok(()),
        Err(err) if crate::error::is_unique_violation(&err) => Err(AppError::bad_request(
            location,
            "store.sql_channel.save_member.exists.app_error",
            "A channel member with that id already exists",
        )
        .with_details(format!(
            "channel_id={}, user_id={}",
            member.channel_id, member.user_id
        ))),
        Err(err) => Err(store_err(location, "store.sql_channel.save_member.save.app_error")(err)),
    }
}

/// Only explicit roles are persisted; implicit tokens become scheme flags.
fn apply_stored_roles(member: &mut ChannelMember) {
    let raw = if member.explicit_roles.is_empty() {
        &member.roles
    } else {
        &member.explicit_roles
    };
    let ResolvedRoles {
        roles,
        explicit_roles,
        scheme_guest,
        scheme_user,
        scheme_admin,
    } = resolve_member_roles(
        raw,
        member.scheme_guest,
        member.scheme_user,
        member.scheme_admin,
        &SchemeDefaults::default(),
    );
    member.roles = roles;
    member.explicit_roles = explicit_roles;
    member.scheme_guest = scheme_guest;
    member.scheme_user = scheme_user;
    member.scheme_admin = scheme_admin;
}

pub(super) fn member_user_ids(conn: &Connection, channel_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT user_id FROM channel_members WHERE channel_id = ?1")?;
    let rows = stmt.query_map(params![channel_id], |row| row.get(0))?;
    rows.collect()
}

fn fetch_member(
    conn: &Connection,
    channel_id: &str,
    user_id: &str,
) -> rusqlite::Result<Option<ChannelMember>> {
    conn.query_row(
        &format!("{MEMBER_SELECT} WHERE cm.channel_id = ?1 AND cm.user_id = ?2"),
        params![channel_id, user_id],
        row_to_member,
    )
    .optional()
}

fn query_members<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<ChannelMember>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, row_to_member)?;
    rows.collect()
}

fn missing_member(location: &str, channel_id: &str, user_id: &str) -> AppError {
    AppError::not_found(location, MISSING_CHANNEL_MEMBER_ERROR, "Channel member not found")
        .with_details(format!("channel_id={channel_id}, user_id={user_id}"))
}

/// Map a row selected with [`MEMBER_SELECT`], resolving its roles.
fn row_to_member(row: &Row<'_>) -> rusqlite::Result<ChannelMember> {
    let raw_roles: String = row.get(2)?;
    let raw_props: String = row.get(6)?;
    let notify_props: NotifyProps = serde_json::from_str(&raw_props).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let defaults = SchemeDefaults {
        channel_guest_role: row.get(11)?,
        channel_user_role: row.get(12)?,
        channel_admin_role: row.get(13)?,
        team_guest_role: row.get(14)?,
        team_user_role: row.get(15)?,
        team_admin_role: row.get(16)?,
    };
    let resolved = resolve_member_roles(&raw_roles, row.get(8)?, row.get(9)?, row.get(10)?, &defaults);

    Ok(ChannelMember {
        channel_id: row.get(0)?,
        user_id: row.get(1)?,
        roles: resolved.roles,
        explicit_roles: resolved.explicit_roles,
        last_viewed_at: row.get(3)?,
        msg_count: row.get(4)?,
        mention_count: row.get(5)?,
        notify_props,
        last_update_at: row.get(7)?,
        scheme_guest: resolved.scheme_guest,
        scheme_user: resolved.scheme_user,
        scheme_admin: resolved.scheme_admin,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::*;
    use crate::models::{Channel, Scheme};
    use parley_shared::{get_millis, ChannelType, SchemeScope};

    #[test]
    fn save_then_get_member() {
        let fx = Fixture::new();
        let team = fx.team();
        let user = fx.user();
        let channel = fx.open_channel(&team.id, "members");

        let mut member = ChannelMember::new(&channel.id, &user.id);
        member.roles = "channel_user channel_admin moderator".into();
        let saved = fx.store.save_member(member).unwrap();

        assert_eq!(saved.explicit_roles, "moderator");
        assert!(saved.scheme_user && saved.scheme_admin && !saved.scheme_guest);
        assert_eq!(fx.store.get_member(&channel.id, &user.id).unwrap(), saved);

        let err = fx
            .store
            .save_member(ChannelMember::new(&channel.id, &user.id))
            .unwrap_err();
        assert_eq!(err.id, "store.sql_channel.save_member.exists.app_error");
    }

    #[test]
    fn resolving_stored_roles_is_stable() {
        let fx = Fixture::new();
        let team = fx.team();
        let user = fx.user();
        let channel = fx.open_channel(&team.id, "stable");

        let mut member = ChannelMember::new(&channel.id, &user.id);
        member.explicit_roles = "channel_user reviewer".into();
        fx.store.save_member(member).unwrap();

        let first = fx.store.get_member(&channel.id, &user.id).unwrap();
        let second = fx.store.get_member(&channel.id, &user.id).unwrap();
        assert_eq!(first.roles, second.roles);
        assert_eq!(first.explicit_roles, second.explicit_roles);
        assert_eq!(first.roles.matches("channel_user").count(), 1);

        // Writing back what was read changes nothing.
        let rewritten = fx.store.update_member(first.clone()).unwrap();
        assert_eq!(rewritten.roles, first.roles);
        assert_eq!(rewritten.explicit_roles, first.explicit_roles);
    }

    #[test]
    fn scheme_roles_are_implied() {
        let fx = Fixture::new();
        let team = fx.team();
        let user = fx.user();

        let mut team_scheme = Scheme::new("team-scheme", "Team Scheme", SchemeScope::Team);
        team_scheme.pre_save();
        fx.db.create_scheme(&mut team_scheme).unwrap();
        fx.db.set_team_scheme(&team.id, Some(team_scheme.id.as_str())).unwrap();

        let channel = fx.open_channel(&team.id, "schemed");
        let member = fx
            .store
            .save_member(ChannelMember::new(&channel.id, &user.id))
            .unwrap();
        assert_eq!(member.roles, team_scheme.default_channel_user_role);
        assert_eq!(member.explicit_roles, "");

        let mut channel_scheme = Scheme::new("channel-scheme", "Channel Scheme", SchemeScope::Channel);
        channel_scheme.pre_save();
        fx.db.create_scheme(&mut channel_scheme).unwrap();
        let mut channel = fx.store.get_from_master(&channel.id).unwrap();
        channel.scheme_id = Some(channel_scheme.id.clone());
        fx.store.update(channel.clone()).unwrap();

        let member = fx.store.get_member(&channel.id, &user.id).unwrap();
        assert_eq!(member.roles, channel_scheme.default_channel_user_role);
    }

    #[test]
    fn save_member_requires_channel() {
        let fx = Fixture::new();
        let user = fx.user();
        let err = fx
            .store
            .save_member(ChannelMember::new(parley_shared::new_id(), &user.id))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn member_listings() {
        let fx = Fixture::new();
        let team = fx.team();
        let channel = fx.open_channel(&team.id, "crowd");
        let users: Vec<_> = (0..3).map(|_| fx.user()).collect();
        for user in &users {
            fx.store
                .save_member(ChannelMember::new(&channel.id, &user.id))
                .unwrap();
        }

        assert_eq!(fx.store.get_members(&channel.id, 0, 2).unwrap().len(), 2);
        assert_eq!(fx.store.get_members(&channel.id, 2, 2).unwrap().len(), 1);

        let ids = vec![users[0].id.clone(), users[2].id.clone()];
        assert_eq!(fx.store.get_members_by_ids(&channel.id, &ids).unwrap().len(), 2);
        assert!(fx.store.get_members_by_ids(&channel.id, &[]).unwrap().is_empty());

        let err = fx.store.get_member(&channel.id, &team.id).unwrap_err();
        assert_eq!(err.id, MISSING_CHANNEL_MEMBER_ERROR);
    }

    #[test]
    fn member_count_skips_deactivated_users_and_invalidates() {
        let fx = Fixture::new();
        let team = fx.team();
        let channel = fx.open_channel(&team.id, "count");
        let (a, b) = (fx.user(), fx.user());
        fx.store.save_member(ChannelMember::new(&channel.id, &a.id)).unwrap();

        assert_eq!(fx.store.get_member_count(&channel.id, true).unwrap(), 1);
        fx.store.save_member(ChannelMember::new(&channel.id, &b.id)).unwrap();
        assert_eq!(fx.store.get_member_count_from_cache(&channel.id), 2);

        fx.db.set_user_delete_at(&b.id, get_millis()).unwrap();
        fx.store.invalidate_member_count(&channel.id);
        assert_eq!(fx.store.get_member_count(&channel.id, true).unwrap(), 1);

        fx.store.remove_member(&channel.id, &a.id).unwrap();
        assert_eq!(fx.store.get_member_count_from_cache(&channel.id), 0);
    }

    #[test]
    fn member_count_uncached_read_does_not_populate() {
        let fx = Fixture::new();
        let team = fx.team();
        let channel = fx.open_channel(&team.id, "quiet");
        fx.store.get_member_count(&channel.id, false).unwrap();
        assert!(fx.caches.channel_member_counts.get(&channel.id).is_none());
    }

    #[test]
    fn all_members_for_user_and_membership_check() {
        let fx = Fixture::new();
        let team = fx.team();
        let user = fx.user();
        let live = fx.open_channel(&team.id, "live");
        let archived = fx.open_channel(&team.id, "archived");
        for channel in [&live, &archived] {
            fx.store
                .save_member(ChannelMember::new(&channel.id, &user.id))
                .unwrap();
        }
        fx.store.delete(&archived.id, get_millis()).unwrap();

        let map = fx.store.get_all_channel_members_for_user(&user.id, true, false).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&live.id).map(String::as_str), Some("channel_user"));

        let with_deleted = fx.store.get_all_channel_members_for_user(&user.id, true, true).unwrap();
        assert_eq!(with_deleted.len(), 2);

        assert!(fx.store.is_user_in_channel_use_cache(&user.id, &live.id));
        assert!(!fx.store.is_user_in_channel_use_cache(&user.id, &archived.id));

        fx.store.remove_member(&live.id, &user.id).unwrap();
        assert!(fx.caches.all_channel_members_for_user.get(&user.id).is_none());
        assert!(!fx.store.is_user_in_channel_use_cache(&user.id, &live.id));
    }

    #[test]
    fn archiving_and_restoring_refresh_membership_maps() {
        let fx = Fixture::new();
        let team = fx.team();
        let user = fx.user();
        let room = fx.open_channel(&team.id, "room");
        fx.store
            .save_member(ChannelMember::new(&room.id, &user.id))
            .unwrap();

        let before = fx.store.get_all_channel_members_for_user(&user.id, true, false).unwrap();
        assert_eq!(before.len(), 1);
        fx.store.get_all_channel_members_for_user(&user.id, true, true).unwrap();
        assert!(fx.store.is_user_in_channel_use_cache(&user.id, &room.id));

        fx.store.delete(&room.id, get_millis()).unwrap();
        assert!(fx.caches.all_channel_members_for_user.is_empty());
        let archived = fx.store.get_all_channel_members_for_user(&user.id, true, false).unwrap();
        assert!(archived.is_empty());
        assert!(!fx.store.is_user_in_channel_use_cache(&user.id, &room.id));

        fx.store.restore(&room.id, get_millis()).unwrap();
        assert!(fx.store.is_user_in_channel_use_cache(&user.id, &room.id));
        let restored = fx.store.get_all_channel_members_for_user(&user.id, true, false).unwrap();
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn notify_props_map() {
        let fx = Fixture::new();
        let team = fx.team();
        let user = fx.user();
        let channel = fx.open_channel(&team.id, "props");

        let mut member = ChannelMember::new(&channel.id, &user.id);
        member.notify_props.insert("desktop".into(), "mention".into());
        fx.store.save_member(member).unwrap();

        let props = fx
            .store
            .get_all_channel_members_notify_props_for_channel(&channel.id, true)
            .unwrap();
        assert_eq!(
            props.get(&user.id).and_then(|p| p.get("desktop")).map(String::as_str),
            Some("mention")
        );
        assert!(fx
            .caches
            .all_channel_members_notify_props
            .get(&channel.id)
            .is_some());
    }

    #[test]
    fn permanent_member_deletes() {
        let fx = Fixture::new();
        let team = fx.team();
        let (a, b) = (fx.user(), fx.user());
        let one = fx.open_channel(&team.id, "one");
        let two = fx.open_channel(&team.id, "two");
        for channel in [&one, &two] {
            for user in [&a, &b] {
                fx.store
                    .save_member(ChannelMember::new(&channel.id, &user.id))
                    .unwrap();
            }
        }

        fx.store.permanent_delete_members_by_channel(&one.id).unwrap();
        assert!(fx.store.get_members(&one.id, 0, 10).unwrap().is_empty());
        assert_eq!(fx.store.get_members(&two.id, 0, 10).unwrap().len(), 2);

        fx.store.permanent_delete_members_by_user(&a.id).unwrap();
        let left = fx.store.get_members(&two.id, 0, 10).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].user_id, b.id);
    }

    #[test]
    fn group_channel_members_resolve_without_team() {
        let fx = Fixture::new();
        let user = fx.user();
        let group = fx
            .store
            .save(Channel::new("", "trio", "Trio", ChannelType::Group))
            .unwrap();
        let member = fx
            .store
            .save_member(ChannelMember::new(&group.id, &user.id))
            .unwrap();
        assert_eq!(member.roles, "channel_user");
    }
}
