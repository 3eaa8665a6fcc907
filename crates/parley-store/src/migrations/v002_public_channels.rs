//! v002 -- Public channel projection.
//!
//! Adds `public_channels`, a denormalized copy of every open channel, and
//! backfills it from the rows already present in `channels`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 1 to version 2.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS public_channels (
    id           TEXT PRIMARY KEY NOT NULL,   -- same id as channels(id)
    delete_at    INTEGER NOT NULL DEFAULT 0,
    team_id      TEXT NOT NULL,
    display_name TEXT NOT NULL DEFAULT '',
    name         TEXT NOT NULL,
    header       TEXT NOT NULL DEFAULT '',
    purpose      TEXT NOT NULL DEFAULT '',

    UNIQUE (name, team_id)
);

CREATE INDEX IF NOT EXISTS idx_public_channels_team_id ON public_channels(team_id);
CREATE INDEX IF NOT EXISTS idx_public_channels_delete_at ON public_channels(delete_at);
"#;

/// Copies open channels that have no projection row yet.
pub(crate) const BACKFILL_SQL: &str = r#"
INSERT INTO public_channels (id, delete_at, team_id, display_name, name, header, purpose)
SELECT c.id, c.delete_at, c.team_id, c.display_name, c.name, c.header, c.purpose
FROM channels c
LEFT JOIN public_channels pc ON pc.id = c.id
WHERE c.type = 'O' AND pc.id IS NULL
"#;

/// Apply the public channel migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)?;
    conn.execute(BACKFILL_SQL, [])?;
    Ok(())
}
