use rusqlite::{params, params_from_iter, OptionalExtension};

use parley_shared::constants::MISSING_CHANNEL_ERROR;
use parley_shared::{AppError, AppResult};

use super::{
    anonymous_placeholders, find_channel, name_key, public_index, query_channels, row_to_channel,
    store_err, ChannelStore, CHANNEL_COLUMNS,
};
use crate::models::{Channel, PublicChannel};

impl ChannelStore {
    // ------------------------------------------------------------------
    // By id
    // ------------------------------------------------------------------

    /// Fetch a channel, archived ones included.
    pub fn get(&self, channel_id: &str, allow_from_cache: bool) -> AppResult<Channel> {
        if allow_from_cache {
            if let Some(channel) = self.caches.channel_by_id.get(channel_id) {
                return Ok(channel);
            }
        }

        let generation = self.caches.channel_by_id.generation();
        let channel = self.fetch(channel_id, "SqlChannelStore.Get")?;
        self.caches
            .channel_by_id
            .put_if_unchanged(channel_id, channel.clone(), generation);
        Ok(channel)
    }

    /// Read straight from the database. Never consults or fills the cache.
    pub fn get_from_master(&self, channel_id: &str) -> AppResult<Channel> {
        self.fetch(channel_id, "SqlChannelStore.GetFromMaster")
    }

    fn fetch(&self, channel_id: &str, location: &'static str) -> AppResult<Channel> {
        let conn = self
            .db
            .conn()
            .map_err(store_err(location, "store.sql_channel.get.find.app_error"))?;
        find_channel(&conn, channel_id)
            .map_err(store_err(location, "store.sql_channel.get.find.app_error"))?
            .ok_or_else(|| {
                AppError::not_found(location, "store.sql_channel.get.existing.app_error", "Channel not found")
                    .with_details(format!("id={channel_id}"))
            })
    }

    // ------------------------------------------------------------------
    // By name
    // ------------------------------------------------------------------

    /// Live channel called `name` in the team, or a team-less channel (direct
    /// or group) with that name. The team's own channel wins.
    ///
    /// Only channels of `team_id` itself are cached: the key is always the
    /// channel's own `team_id + name`, the one its writes invalidate.
    pub fn get_by_name(&self, team_id: &str, name: &str, allow_from_cache: bool) -> AppResult<Channel> {
        const LOC: &str = "SqlChannelStore.GetByName";
        let key = name_key(team_id, name);

        if allow_from_cache {
            if let Some(channel) = self.caches.channel_by_name.get(&key) {
                return Ok(channel);
            }
        }

        let generation = self.caches.channel_by_name.generation();
        let channel = self
            .find_by_name(team_id, name, "AND c.delete_at = 0", LOC)?
            .ok_or_else(|| missing_by_name(LOC, team_id, name))?;
        if channel.team_id == team_id {
            self.caches
                .channel_by_name
                .put_if_unchanged(key, channel.clone(), generation);
        }
        Ok(channel)
    }

    /// Like [`ChannelStore::get_by_name`] but archived channels match too.
    /// Never cached, so a live-only lookup can not be answered with an
    /// archived channel.
    pub fn get_by_name_include_deleted(&self, team_id: &str, name: &str) -> AppResult<Channel> {
        const LOC: &str = "SqlChannelStore.GetByNameIncludeDeleted";
        self.find_by_name(team_id, name, "", LOC)?
            .ok_or_else(|| missing_by_name(LOC, team_id, name))
    }

    pub fn get_deleted_by_name(&self, team_id: &str, name: &str) -> AppResult<Channel> {
        const LOC: &str = "SqlChannelStore.GetDeletedByName";
        self.find_by_name(team_id, name, "AND c.delete_at != 0", LOC)?
            .ok_or_else(|| {
                AppError::not_found(
                    LOC,
                    "store.sql_channel.get_deleted_by_name.missing.app_error",
                    "No archived channel with that name",
                )
                .with_details(format!("team_id={team_id}, name={name}"))
            })
    }

    fn find_by_name(
        &self,
        team_id: &str,
        name: &str,
        filter: &str,
        location: &'static str,
    ) -> AppResult<Option<Channel>> {
        let conn = self
            .db
            .conn()
            .map_err(store_err(location, "store.sql_channel.get_by_name.existing.app_error"))?;
        conn.query_row(
            &format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels c
                 WHERE (c.team_id = ?1 OR c.team_id = '') AND c.name = ?2 {filter}
                 ORDER BY c.team_id DESC LIMIT 1"
            ),
            params![team_id, name],
            row_to_channel,
        )
        .optional()
        .map_err(store_err(location, "store.sql_channel.get_by_name.existing.app_error"))
    }

    /// Live channels matching any of `names`. Cached names are answered from
    /// the cache; only the rest are queried.
    pub fn get_by_names(
        &self,
        team_id: &str,
        names: &[String],
        allow_from_cache: bool,
    ) -> AppResult<Vec<Channel>> {
        const LOC: &str = "SqlChannelStore.GetByNames";

        let mut channels = Vec::with_capacity(names.len());
        let mut misses: Vec<&str> = Vec::new();
        for name in names {
            let hit = if allow_from_cache {
                self.caches.channel_by_name.get(&name_key(team_id, name))
            } else {
                None
            };
            match hit {
                Some(channel) => channels.push(channel),
                None => misses.push(name),
            }
        }

        if misses.is_empty() {
            return Ok(channels);
        }

        let conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.get_by_names.app_error"))?;
        let sql = format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels c
             WHERE (c.team_id = ? OR c.team_id = '') AND c.name IN ({}) AND c.delete_at = 0",
            anonymous_placeholders(misses.len())
        );
        let args = std::iter::once(team_id).chain(misses.iter().copied());
        let generation = self.caches.channel_by_name.generation();
        let loaded = query_channels(&conn, &sql, params_from_iter(args))
            .map_err(store_err(LOC, "store.sql_channel.get_by_names.app_error"))?;

        // Team-less matches stay uncached, as in `get_by_name`.
        for channel in loaded.iter().filter(|c| c.team_id == team_id) {
            self.caches.channel_by_name.put_if_unchanged(
                name_key(team_id, &channel.name),
                channel.clone(),
                generation,
            );
        }
        channels.extend(loaded);
        Ok(channels)
    }

    // ------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------

    /// Archived channels of a team, by display name. No match is a 404.
    pub fn get_deleted(&self, team_id: &str, offset: i64, limit: i64) -> AppResult<Vec<Channel>> {
        const LOC: &str = "SqlChannelStore.GetDeleted";
        let conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.get_deleted.existing.app_error"))?;
        let channels = query_channels(
            &conn,
            &format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels c
                 WHERE (c.team_id = ?1 OR c.team_id = '') AND c.delete_at != 0
                 ORDER BY c.display_name LIMIT ?2 OFFSET ?3"
            ),
            params![team_id, limit, offset],
        )
        .map_err(store_err(LOC, "store.sql_channel.get_deleted.existing.app_error"))?;

        if channels.is_empty() {
            return Err(AppError::not_found(
                LOC,
                "store.sql_channel.get_deleted.missing.app_error",
                "No archived channels",
            )
            .with_details(format!("team_id={team_id}")));
        }
        Ok(channels)
    }

    /// Live open channels of a team, read through `public_channels`.
    pub fn get_public_channels_for_team(
        &self,
        team_id: &str,
        offset: i64,
        limit: i64,
    ) -> AppResult<Vec<Channel>> {
        const LOC: &str = "SqlChannelStore.GetPublicChannelsForTeam";
        let conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.get_public_channels.get.app_error"))?;
        query_channels(
            &conn,
            &format!(
                "SELECT {CHANNEL_COLUMNS} FROM public_channels pc
                 INNER JOIN channels c ON c.id = pc.id
                 WHERE pc.team_id = ?1 AND pc.delete_at = 0
                 ORDER BY pc.display_name LIMIT ?2 OFFSET ?3"
            ),
            params![team_id, limit, offset],
        )
        .map_err(store_err(LOC, "store.sql_channel.get_public_channels.get.app_error"))
    }

    /// Live open channels of a team among `channel_ids`. No match is a 404.
    pub fn get_public_channels_by_ids_for_team(
        &self,
        team_id: &str,
        channel_ids: &[String],
    ) -> AppResult<Vec<Channel>> {
        const LOC: &str = "SqlChannelStore.GetPublicChannelsByIdsForTeam";
        let not_found = || {
            AppError::not_found(
                LOC,
                "store.sql_channel.get_channels_by_ids.not_found.app_error",
                "No public channels found",
            )
            .with_details(format!("team_id={team_id}"))
        };
        if channel_ids.is_empty() {
            return Err(not_found());
        }

        let conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.get_channels_by_ids.get.app_error"))?;
        let sql = format!(
            "SELECT {CHANNEL_COLUMNS} FROM public_channels pc
             INNER JOIN channels c ON c.id = pc.id
             WHERE pc.team_id = ? AND pc.delete_at = 0 AND pc.id IN ({})
             ORDER BY pc.display_name",
            anonymous_placeholders(channel_ids.len())
        );
        let args = std::iter::once(team_id).chain(channel_ids.iter().map(String::as_str));
        let channels = query_channels(&conn, &sql, params_from_iter(args))
            .map_err(store_err(LOC, "store.sql_channel.get_channels_by_ids.get.app_error"))?;

        if channels.is_empty() {
            return Err(not_found());
        }
        Ok(channels)
    }

    /// Live open channels of a team that `user_id` has not joined.
    pub fn get_more_channels(
        &self,
        team_id: &str,
        user_id: &str,
        offset: i64,
        limit: i64,
    ) -> AppResult<Vec<Channel>> {
        const LOC: &str = "SqlChannelStore.GetMoreChannels";
        let conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.get_more_channels.get.app_error"))?;
        query_channels(
            &conn,
            &format!(
                "SELECT {CHANNEL_COLUMNS} FROM public_channels pc
                 INNER JOIN channels c ON c.id = pc.id
                 WHERE pc.team_id = ?1 AND pc.delete_at = 0
                   AND pc.id NOT IN (SELECT cm.channel_id FROM channel_members cm WHERE cm.user_id = ?2)
                 ORDER BY pc.display_name LIMIT ?3 OFFSET ?4"
            ),
            params![team_id, user_id, limit, offset],
        )
        .map_err(store_err(LOC, "store.sql_channel.get_more_channels.get.app_error"))
    }

    /// Every non-direct channel of a team, archived ones included. No match
    /// is a 404.
    pub fn get_team_channels(&self, team_id: &str) -> AppResult<Vec<Channel>> {
        const LOC: &str = "SqlChannelStore.GetTeamChannels";
        let conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.get_channels.get.app_error"))?;
        let channels = query_channels(
            &conn,
            &format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels c
                 WHERE c.team_id = ?1 AND c.type != 'D'
                 ORDER BY c.display_name"
            ),
            params![team_id],
        )
        .map_err(store_err(LOC, "store.sql_channel.get_channels.get.app_error"))?;

        if channels.is_empty() {
            return Err(AppError::not_found(
                LOC,
                "store.sql_channel.get_channels.not_found.app_error",
                "No channels were found",
            )
            .with_details(format!("team_id={team_id}")));
        }
        Ok(channels)
    }

    pub fn get_channels_by_scheme(
        &self,
        scheme_id: &str,
        offset: i64,
        limit: i64,
    ) -> AppResult<Vec<Channel>> {
        const LOC: &str = "SqlChannelStore.GetChannelsByScheme";
        let conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.get_by_scheme.app_error"))?;
        query_channels(
            &conn,
            &format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels c
                 WHERE c.scheme_id = ?1
                 ORDER BY c.display_name LIMIT ?2 OFFSET ?3"
            ),
            params![scheme_id, limit, offset],
        )
        .map_err(store_err(LOC, "store.sql_channel.get_by_scheme.app_error"))
    }

    /// The `public_channels` row of a channel, if it has one.
    pub fn get_public_channel(&self, channel_id: &str) -> AppResult<Option<PublicChannel>> {
        const LOC: &str = "SqlChannelStore.GetPublicChannel";
        let conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.get_public_channel.app_error"))?;
        public_index::get_public_channel(&conn, channel_id)
            .map_err(store_err(LOC, "store.sql_channel.get_public_channel.app_error"))
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Detach every channel from its scheme.
    pub fn reset_all_channel_schemes(&self) -> AppResult<()> {
        const LOC: &str = "SqlChannelStore.ResetAllChannelSchemes";
        let mut conn = self.db.conn().map_err(store_err(
            LOC,
            "store.sql_channel.reset_all_channel_schemes.open_transaction.app_error",
        ))?;
        let tx = conn.begin().map_err(store_err(
            LOC,
            "store.sql_channel.reset_all_channel_schemes.open_transaction.app_error",
        ))?;

        let reset = tx
            .execute("UPDATE channels SET scheme_id = NULL WHERE scheme_id IS NOT NULL", [])
            .map_err(store_err(LOC, "store.sql_channel.reset_all_channel_schemes.app_error"))?;
        tx.commit().map_err(store_err(
            LOC,
            "store.sql_channel.reset_all_channel_schemes.commit_transaction.app_error",
        ))?;

        tracing::info!(channels = reset, "channel schemes reset");
        self.clear_caches();
        Ok(())
    }

    /// Create the missing `public_channels` rows of open channels. Returns the
    /// number of rows created.
    pub fn migrate_public_channels(&self) -> AppResult<usize> {
        const LOC: &str = "SqlChannelStore.MigratePublicChannels";
        let mut conn = self
            .db
            .conn()
            .map_err(store_err(LOC, "store.sql_channel.migrate_public_channels.app_error"))?;
        let tx = conn
            .begin()
            .map_err(store_err(LOC, "store.sql_channel.migrate_public_channels.app_error"))?;
        let created = public_index::backfill(&tx)
            .map_err(store_err(LOC, "store.sql_channel.migrate_public_channels.app_error"))?;
        tx.commit()
            .map_err(store_err(LOC, "store.sql_channel.migrate_public_channels.app_error"))?;

        tracing::info!(created, "public channels backfilled");
        Ok(created)
    }
}

fn missing_by_name(location: &str, team_id: &str, name: &str) -> AppError {
    AppError::not_found(location, MISSING_CHANNEL_ERROR, "Channel not found")
        .with_details(format!("team_id={team_id}, name={name}"))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use crate::models::ChannelMember;
    use parley_shared::constants::CACHE_CHANNEL;
    use parley_shared::{get_millis, new_id, ChannelType};

    use super::*;

    #[test]
    fn get_reads_through_cache() {
        let fx = Fixture::new();
        let team = fx.team();
        let channel = fx.open_channel(&team.id, "hot");

        fx.store.get(&channel.id, true).unwrap();
        fx.store.get(&channel.id, true).unwrap();
        let stats = fx.metrics.snapshot(CACHE_CHANNEL);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);

        // Bypassing the lookup still refreshes the entry.
        fx.caches.channel_by_id.remove(&channel.id);
        fx.store.get(&channel.id, false).unwrap();
        assert!(fx.caches.channel_by_id.get(&channel.id).is_some());
    }

    #[test]
    fn master_reads_never_populate() {
        let fx = Fixture::new();
        let team = fx.team();
        let channel = fx.open_channel(&team.id, "master");

        assert_eq!(fx.store.get_from_master(&channel.id).unwrap(), channel);
        assert!(fx.caches.channel_by_id.get(&channel.id).is_none());

        let err = fx.store.get_from_master(&new_id()).unwrap_err();
        assert_eq!(err.id, "store.sql_channel.get.existing.app_error");
    }

    #[test]
    fn get_by_name_finds_team_less_channels() {
        let fx = Fixture::new();
        let team = fx.team();
        let group = fx
            .store
            .save(Channel::new("", "crew", "Crew", ChannelType::Group))
            .unwrap();

        assert_eq!(fx.store.get_by_name(&team.id, "crew", true).unwrap().id, group.id);
        let err = fx.store.get_by_name(&team.id, "nope", true).unwrap_err();
        assert_eq!(err.id, MISSING_CHANNEL_ERROR);
    }

    #[test]
    fn team_less_channel_found_by_team_lookup_is_never_stale() {
        let fx = Fixture::new();
        let team = fx.team();
        let group = fx
            .store
            .save(Channel::new("", "crew", "Crew", ChannelType::Group))
            .unwrap();

        fx.store.get_by_name(&team.id, "crew", true).unwrap();
        let names: Vec<String> = vec!["crew".into()];
        fx.store.get_by_names(&team.id, &names, true).unwrap();

        let mut renamed = group.clone();
        renamed.display_name = "Renamed".into();
        fx.store.update(renamed).unwrap();

        let by_team = fx.store.get_by_name(&team.id, "crew", true).unwrap();
        assert_eq!(by_team.display_name, "Renamed");
        let listed = fx.store.get_by_names(&team.id, &names, true).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].display_name, "Renamed");

        // Team-less lookups cache under the channel's own key and are
        // invalidated by its writes.
        fx.store.get_by_name("", "crew", true).unwrap();
        fx.store.delete(&group.id, get_millis()).unwrap();

        let err = fx.store.get_by_name(&team.id, "crew", true).unwrap_err();
        assert_eq!(err.id, MISSING_CHANNEL_ERROR);
        assert!(fx.store.get_by_name("", "crew", true).is_err());
        assert!(fx.store.get_by_names(&team.id, &names, true).unwrap().is_empty());
    }

    #[test]
    fn team_channel_wins_over_team_less_namesake() {
        let fx = Fixture::new();
        let team = fx.team();
        fx.store
            .save(Channel::new("", "shared", "Group", ChannelType::Group))
            .unwrap();
        let own = fx.open_channel(&team.id, "shared");

        assert_eq!(fx.store.get_by_name(&team.id, "shared", false).unwrap().id, own.id);
        assert_eq!(fx.store.get_by_name(&team.id, "shared", true).unwrap().id, own.id);
    }

    #[test]
    fn archived_lookups_by_name() {
        let fx = Fixture::new();
        let team = fx.team();
        let channel = fx.open_channel(&team.id, "attic");
        assert!(fx.store.get_deleted_by_name(&team.id, "attic").is_err());

        fx.store.delete(&channel.id, get_millis()).unwrap();
        assert_eq!(fx.store.get_deleted_by_name(&team.id, "attic").unwrap().id, channel.id);
        assert_eq!(
            fx.store.get_by_name_include_deleted(&team.id, "attic").unwrap().id,
            channel.id
        );
        assert!(fx.store.get_by_name(&team.id, "attic", false).is_err());

        let deleted = fx.store.get_deleted(&team.id, 0, 10).unwrap();
        assert_eq!(deleted.len(), 1);
        assert!(fx.store.get_deleted(&fx.team().id, 0, 10).unwrap_err().is_not_found());
    }

    #[test]
    fn get_by_names_only_queries_misses() {
        let fx = Fixture::new();
        let team = fx.team();
        let a = fx.open_channel(&team.id, "alpha");
        let b = fx.open_channel(&team.id, "beta");

        fx.store.get_by_name(&team.id, "alpha", true).unwrap();
        let found = fx
            .store
            .get_by_names(&team.id, &["alpha".into(), "beta".into(), "gamma".into()], true)
            .unwrap();
        let mut ids: Vec<_> = found.into_iter().map(|c| c.id).collect();
        ids.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(ids, expected);
        assert!(fx
            .caches
            .channel_by_name
            .get(&format!("{}beta", team.id))
            .is_some());
    }

    #[test]
    fn public_listings_follow_projection() {
        let fx = Fixture::new();
        let team = fx.team();
        let user = fx.user();
        let lobby = fx.open_channel(&team.id, "lobby");
        let news = fx.open_channel(&team.id, "news");
        fx.store
            .save(Channel::new(&team.id, "hidden", "Hidden", ChannelType::Private))
            .unwrap();

        let public = fx.store.get_public_channels_for_team(&team.id, 0, 10).unwrap();
        assert_eq!(public.len(), 2);
        assert_eq!(public[0].id, lobby.id);

        fx.store
            .save_member(ChannelMember::new(&lobby.id, &user.id))
            .unwrap();
        let more = fx.store.get_more_channels(&team.id, &user.id, 0, 10).unwrap();
        assert_eq!(more.into_iter().map(|c| c.id).collect::<Vec<_>>(), vec![news.id.clone()]);

        fx.store.delete(&news.id, get_millis()).unwrap();
        assert_eq!(fx.store.get_public_channels_for_team(&team.id, 0, 10).unwrap().len(), 1);

        let by_ids = fx
            .store
            .get_public_channels_by_ids_for_team(&team.id, &[lobby.id.clone(), news.id.clone()])
            .unwrap();
        assert_eq!(by_ids.len(), 1);
        assert!(fx
            .store
            .get_public_channels_by_ids_for_team(&team.id, &[news.id])
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn team_channels_exclude_direct() {
        let fx = Fixture::new();
        let team = fx.team();
        fx.open_channel(&team.id, "one");
        fx.store
            .save(Channel::new(&team.id, "two", "Two", ChannelType::Private))
            .unwrap();

        assert_eq!(fx.store.get_team_channels(&team.id).unwrap().len(), 2);
        assert!(fx.store.get_team_channels(&new_id()).unwrap_err().is_not_found());
    }

    #[test]
    fn scheme_reset_detaches_channels() {
        let fx = Fixture::new();
        let team = fx.team();
        let scheme_id = new_id();
        let mut channel = Channel::new(&team.id, "schemed", "Schemed", ChannelType::Open);
        channel.scheme_id = Some(scheme_id.clone());
        let channel = fx.store.save(channel).unwrap();

        assert_eq!(fx.store.get_channels_by_scheme(&scheme_id, 0, 10).unwrap().len(), 1);
        fx.store.get(&channel.id, true).unwrap();

        fx.store.reset_all_channel_schemes().unwrap();
        assert!(fx.store.get_channels_by_scheme(&scheme_id, 0, 10).unwrap().is_empty());
        assert_eq!(fx.store.get(&channel.id, true).unwrap().scheme_id, None);
    }

    #[test]
    fn migrate_public_channels_backfills_missing_rows() {
        let fx = Fixture::new();
        let team = fx.team();
        let channel = fx.open_channel(&team.id, "backfill");

        fx.db
            .conn()
            .unwrap()
            .execute("DELETE FROM public_channels", [])
            .unwrap();
        assert!(fx.store.get_public_channel(&channel.id).unwrap().is_none());

        assert_eq!(fx.store.migrate_public_channels().unwrap(), 1);
        assert_eq!(
            fx.store.get_public_channel(&channel.id).unwrap(),
            Some(channel.public_projection())
        );
        assert_eq!(fx.store.migrate_public_channels().unwrap(), 0);
    }
}
