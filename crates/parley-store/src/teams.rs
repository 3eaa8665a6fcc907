use rusqlite::params;

use crate::database::Database;
use crate::error::{not_found_on_no_rows, Result};
use crate::models::Team;

impl Database {
    pub fn create_team(&self, team: &Team) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO teams (id, name, display_name, scheme_id, delete_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                team.id,
                team.name,
                team.display_name,
                team.scheme_id,
                team.delete_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_team(&self, id: &str) -> Result<Team> {
        self.conn()?
            .query_row(
                "SELECT id, name, display_name, scheme_id, delete_at FROM teams WHERE id = ?1",
                params![id],
                row_to_team,
            )
            .map_err(not_found_on_no_rows)
    }

    /// Attach (or with `None`, detach) a team scheme.
    pub fn set_team_scheme(&self, id: &str, scheme_id: Option<&str>) -> Result<bool> {
        let affected = self.conn()?.execute(
            "UPDATE teams SET scheme_id = ?1 WHERE id = ?2",
            params![scheme_id, id],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_team(row: &rusqlite::Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        scheme_id: row.get(3)?,
        delete_at: row.get(4)?,
    })
}
