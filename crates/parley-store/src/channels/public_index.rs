//! Maintenance of `public_channels`, the projection of every open channel.
//!
//! All functions take the connection (usually a transaction) of the caller so
//! the projection changes commit or roll back together with `channels`.

use rusqlite::{params, Connection, OptionalExtension};

use crate::config::UpsertStrategy;
use crate::migrations::v002_public_channels::BACKFILL_SQL;
use crate::models::{Channel, PublicChannel};

/// Bring the projection row of `channel` in line with the channel as it is
/// now: open channels are upserted, every other type loses its row.
pub(crate) fn sync_public_channel(
    conn: &Connection,
    channel: &Channel,
    strategy: UpsertStrategy,
) -> rusqlite::Result<()> {
    if !channel.is_open() {
        delete_public_channel(conn, &channel.id)?;
        return Ok(());
    }

    let projection = channel.public_projection();
    match strategy {
        UpsertStrategy::Native => upsert_native(conn, &projection),
        UpsertStrategy::UpdateThenInsert => update_then_insert(conn, &projection),
    }
}

fn upsert_native(conn: &Connection, pc: &PublicChannel) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO public_channels (id, delete_at, team_id, display_name, name, header, purpose)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
             delete_at = excluded.delete_at,
             team_id = excluded.team_id,
             display_name = excluded.display_name,
             name = excluded.name,
             header = excluded.header,
             purpose = excluded.purpose",
        params![
            pc.id,
            pc.delete_at,
            pc.team_id,
            pc.display_name,
            pc.name,
            pc.header,
            pc.purpose,
        ],
    )?;
    Ok(())
}

fn update_then_insert(conn: &Connection, pc: &PublicChannel) -> rusqlite::Result<()> {
    let changed = conn.execute(
        "UPDATE public_channels
         SET delete_at = ?2, team_id = ?3, display_name = ?4, name = ?5, header = ?6, purpose = ?7
         WHERE id = ?1",
        params![
            pc.id,
            pc.delete_at,
            pc.team_id,
            pc.display_name,
            pc.name,
            pc.header,
            pc.purpose,
        ],
    )?;
    if changed > 0 {
        return Ok(());
    }

    // Zero changes does not prove the row is missing: check before inserting.
    if public_channel_exists(conn, &pc.id)? {
        return Ok(());
    }

    conn.execute(
        "INSERT INTO public_channels (id, delete_at, team_id, display_name, name, header, purpose)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            pc.id,
            pc.delete_at,
            pc.team_id,
            pc.display_name,
            pc.name,
            pc.header,
            pc.purpose,
        ],
    )?;
    Ok(())
}

pub(crate) fn public_channel_exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM public_channels WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )
}

/// Idempotent.
pub(crate) fn delete_public_channel(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM public_channels WHERE id = ?1", params![id])
}

pub(crate) fn delete_public_channels_for_team(
    conn: &Connection,
    team_id: &str,
) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM public_channels WHERE team_id = ?1", params![team_id])
}

pub(crate) fn get_public_channel(
    conn: &Connection,
    id: &str,
) -> rusqlite::Result<Option<PublicChannel>> {
    conn.query_row(
        "SELECT id, delete_at, team_id, display_name, name, header, purpose
         FROM public_channels WHERE id = ?1",
        params![id],
        |row| {
            Ok(PublicChannel {
                id: row.get(0)?,
                delete_at: row.get(1)?,
                team_id: row.get(2)?,
                display_name: row.get(3)?,
                name: row.get(4)?,
                header: row.get(5)?,
                purpose: row.get(6)?,
            })
        },
    )
    .optional()
}

/// Insert projection rows for open channels that lack one. Returns the
/// number of rows created.
pub(crate) fn backfill(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(BACKFILL_SQL, [])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use parley_shared::{new_id, ChannelType};

    fn setup() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("public_index.db")).unwrap();
        (dir, db)
    }

    fn open_channel() -> Channel {
        let mut channel = Channel::new(new_id(), "lobby", "Lobby", ChannelType::Open);
        channel.pre_save();
        channel
    }

    #[test]
    fn both_strategies_converge() {
        for strategy in [UpsertStrategy::Native, UpsertStrategy::UpdateThenInsert] {
            let (_dir, db) = setup();
            let conn = db.conn().unwrap();
            let mut channel = open_channel();

            sync_public_channel(&conn, &channel, strategy).unwrap();
            assert_eq!(
                get_public_channel(&conn, &channel.id).unwrap(),
                Some(channel.public_projection())
            );

            channel.display_name = "Main Lobby".into();
            sync_public_channel(&conn, &channel, strategy).unwrap();
            // Same values again: a no-op update must not trigger a second insert.
            sync_public_channel(&conn, &channel, strategy).unwrap();
            let row = get_public_channel(&conn, &channel.id).unwrap().unwrap();
            assert_eq!(row.display_name, "Main Lobby");
        }
    }

    #[test]
    fn non_open_channels_lose_their_row() {
        let (_dir, db) = setup();
        let conn = db.conn().unwrap();
        let mut channel = open_channel();

        sync_public_channel(&conn, &channel, UpsertStrategy::Native).unwrap();
        channel.channel_type = ChannelType::Private;
        sync_public_channel(&conn, &channel, UpsertStrategy::Native).unwrap();
        assert!(!public_channel_exists(&conn, &channel.id).unwrap());

        // Deleting an absent row is fine.
        sync_public_channel(&conn, &channel, UpsertStrategy::Native).unwrap();
    }
}
