//! v001 -- Initial schema creation.
//!
//! Creates the core tables: `teams`, `users`, `channels`, `channel_members`,
//! `roles`, `schemes` and `reactions`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Teams
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS teams (
    id           TEXT PRIMARY KEY NOT NULL,   -- 26-char id
    name         TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL DEFAULT '',
    scheme_id    TEXT,                        -- nullable -> schemes(id)
    delete_at    INTEGER NOT NULL DEFAULT 0
);

-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id        TEXT PRIMARY KEY NOT NULL,
    username  TEXT NOT NULL UNIQUE,
    delete_at INTEGER NOT NULL DEFAULT 0
);

-- ----------------------------------------------------------------
-- Channels
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS channels (
    id              TEXT PRIMARY KEY NOT NULL,
    create_at       INTEGER NOT NULL,
    update_at       INTEGER NOT NULL,
    delete_at       INTEGER NOT NULL DEFAULT 0,   -- 0 = live
    team_id         TEXT NOT NULL,                -- '' for direct/group
    type            TEXT NOT NULL,                -- 'O' | 'P' | 'D' | 'G'
    display_name    TEXT NOT NULL DEFAULT '',
    name            TEXT NOT NULL,
    header          TEXT NOT NULL DEFAULT '',
    purpose         TEXT NOT NULL DEFAULT '',
    last_post_at    INTEGER NOT NULL DEFAULT 0,
    total_msg_count INTEGER NOT NULL DEFAULT 0,
    extra_update_at INTEGER NOT NULL DEFAULT 0,
    creator_id      TEXT NOT NULL DEFAULT '',
    scheme_id       TEXT,

    UNIQUE (name, team_id)
);

CREATE INDEX IF NOT EXISTS idx_channels_team_id ON channels(team_id);
CREATE INDEX IF NOT EXISTS idx_channels_update_at ON channels(update_at);
CREATE INDEX IF NOT EXISTS idx_channels_delete_at ON channels(delete_at);
CREATE INDEX IF NOT EXISTS idx_channels_scheme_id ON channels(scheme_id);

-- ----------------------------------------------------------------
-- Channel members
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS channel_members (
    channel_id     TEXT NOT NULL,
    user_id        TEXT NOT NULL,
    roles          TEXT NOT NULL DEFAULT '',      -- explicit roles only
    last_viewed_at INTEGER NOT NULL DEFAULT 0,
    msg_count      INTEGER NOT NULL DEFAULT 0,
    mention_count  INTEGER NOT NULL DEFAULT 0,
    notify_props   TEXT NOT NULL DEFAULT '{}',    -- JSON string map
    last_update_at INTEGER NOT NULL DEFAULT 0,
    scheme_guest   INTEGER NOT NULL DEFAULT 0,    -- boolean 0/1
    scheme_user    INTEGER NOT NULL DEFAULT 0,
    scheme_admin   INTEGER NOT NULL DEFAULT 0,

    PRIMARY KEY (channel_id, user_id),
    FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_channel_members_user_id ON channel_members(user_id);

-- ----------------------------------------------------------------
-- Roles
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS roles (
    id             TEXT PRIMARY KEY NOT NULL,
    name           TEXT NOT NULL UNIQUE,
    display_name   TEXT NOT NULL DEFAULT '',
    description    TEXT NOT NULL DEFAULT '',
    permissions    TEXT NOT NULL DEFAULT '',      -- space separated
    scheme_managed INTEGER NOT NULL DEFAULT 0,
    built_in       INTEGER NOT NULL DEFAULT 0,
    create_at      INTEGER NOT NULL,
    update_at      INTEGER NOT NULL,
    delete_at      INTEGER NOT NULL DEFAULT 0
);

-- ----------------------------------------------------------------
-- Schemes
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS schemes (
    id                         TEXT PRIMARY KEY NOT NULL,
    name                       TEXT NOT NULL UNIQUE,
    display_name               TEXT NOT NULL DEFAULT '',
    description                TEXT NOT NULL DEFAULT '',
    scope                      TEXT NOT NULL,     -- 'team' | 'channel'
    default_channel_guest_role TEXT NOT NULL DEFAULT '',
    default_channel_user_role  TEXT NOT NULL DEFAULT '',
    default_channel_admin_role TEXT NOT NULL DEFAULT '',
    create_at                  INTEGER NOT NULL,
    update_at                  INTEGER NOT NULL,
    delete_at                  INTEGER NOT NULL DEFAULT 0
);

-- ----------------------------------------------------------------
-- Reactions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS reactions (
    post_id    TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    emoji_name TEXT NOT NULL,
    create_at  INTEGER NOT NULL,

    PRIMARY KEY (post_id, user_id, emoji_name)
);

CREATE INDEX IF NOT EXISTS idx_reactions_create_at ON reactions(create_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
