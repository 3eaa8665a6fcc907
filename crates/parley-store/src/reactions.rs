use rusqlite::{params, params_from_iter, Row};

use crate::database::Database;
use crate::error::Result;
use crate::models::Reaction;
use crate::roles::placeholders;

impl Database {
    /// Insert a reaction; reacting twice with the same emoji refreshes
    /// `create_at`.
    pub fn save_reaction(&self, reaction: &Reaction) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO reactions (post_id, user_id, emoji_name, create_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(post_id, user_id, emoji_name) DO UPDATE SET create_at = excluded.create_at",
            params![
                reaction.post_id,
                reaction.user_id,
                reaction.emoji_name,
                reaction.create_at,
            ],
        )?;
        Ok(())
    }

    pub fn delete_reaction(&self, reaction: &Reaction) -> Result<bool> {
        let affected = self.conn()?.execute(
            "DELETE FROM reactions WHERE post_id = ?1 AND user_id = ?2 AND emoji_name = ?3",
            params![reaction.post_id, reaction.user_id, reaction.emoji_name],
        )?;
        Ok(affected > 0)
    }

    pub fn get_reactions_for_post(&self, post_id: &str) -> Result<Vec<Reaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, post_id, emoji_name, create_at
             FROM reactions WHERE post_id = ?1 ORDER BY create_at ASC",
        )?;
        let rows = stmt.query_map(params![post_id], row_to_reaction)?;
        let reactions = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reactions)
    }

    /// Reactions for several posts in one query.
    pub fn get_reactions_for_posts(&self, post_ids: &[String]) -> Result<Vec<Reaction>> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT user_id, post_id, emoji_name, create_at
             FROM reactions WHERE post_id IN ({}) ORDER BY create_at ASC",
            placeholders(post_ids.len())
        ))?;
        let rows = stmt.query_map(params_from_iter(post_ids.iter()), row_to_reaction)?;
        let reactions = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reactions)
    }

    pub fn delete_reactions_with_emoji(&self, emoji_name: &str) -> Result<usize> {
        Ok(self
            .conn()?
            .execute("DELETE FROM reactions WHERE emoji_name = ?1", params![emoji_name])?)
    }

    /// Remove up to `limit` reactions created before `end_time`.
    pub fn delete_reactions_batch(&self, end_time: i64, limit: i64) -> Result<usize> {
        Ok(self.conn()?.execute(
            "DELETE FROM reactions WHERE rowid IN (
                 SELECT rowid FROM reactions WHERE create_at < ?1 LIMIT ?2
             )",
            params![end_time, limit],
        )?)
    }
}

fn row_to_reaction(row: &Row<'_>) -> rusqlite::Result<Reaction> {
    Ok(Reaction {
        user_id: row.get(0)?,
        post_id: row.get(1)?,
        emoji_name: row.get(2)?,
        create_at: row.get(3)?,
    })
}
