use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::database::Database;
use crate::error::Result;
use crate::models::Role;

const ROLE_COLUMNS: &str = "id, name, display_name, description, permissions, scheme_managed, \
                            built_in, create_at, update_at, delete_at";

impl Database {
    /// Insert `role`, or overwrite the row with the same id.
    pub fn upsert_role(&self, role: &Role) -> Result<()> {
        let conn = self.conn()?;
        upsert_role_on(&conn, role)?;
        Ok(())
    }

    pub fn get_role(&self, id: &str) -> Result<Option<Role>> {
        let conn = self.conn()?;
        let role = conn
            .query_row(
                &format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ?1"),
                params![id],
                row_to_role,
            )
            .optional()?;
        Ok(role)
    }

    pub fn get_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let conn = self.conn()?;
        let role = conn
            .query_row(
                &format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name = ?1"),
                params![name],
                row_to_role,
            )
            .optional()?;
        Ok(role)
    }

    pub fn get_roles_by_names(&self, names: &[String]) -> Result<Vec<Role>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE name IN ({}) ORDER BY name",
            placeholders(names.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(names.iter()), row_to_role)?;
        let roles = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(roles)
    }

    pub fn get_all_roles(&self) -> Result<Vec<Role>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY name"))?;
        let rows = stmt.query_map([], row_to_role)?;
        let roles = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(roles)
    }

    /// Soft delete. Returns the updated role, or `None` if it does not exist.
    pub fn soft_delete_role(&self, id: &str, now: i64) -> Result<Option<Role>> {
        let affected = self.conn()?.execute(
            "UPDATE roles SET delete_at = ?1, update_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        if affected == 0 {
            return Ok(None);
        }
        self.get_role(id)
    }

    pub fn delete_all_roles(&self) -> Result<usize> {
        Ok(self.conn()?.execute("DELETE FROM roles", [])?)
    }
}

/// Shared with scheme creation, which writes its roles in the same transaction.
pub(crate) fn upsert_role_on(conn: &Connection, role: &Role) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO roles (id, name, display_name, description, permissions, scheme_managed,
                            built_in, create_at, update_at, delete_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             display_name = excluded.display_name,
             description = excluded.description,
             permissions = excluded.permissions,
             scheme_managed = excluded.scheme_managed,
             built_in = excluded.built_in,
             update_at = excluded.update_at,
             delete_at = excluded.delete_at",
        params![
            role.id,
            role.name,
            role.display_name,
            role.description,
            role.permissions_column(),
            role.scheme_managed,
            role.built_in,
            role.create_at,
            role.update_at,
            role.delete_at,
        ],
    )
}

fn row_to_role(row: &Row<'_>) -> rusqlite::Result<Role> {
    let permissions: String = row.get(4)?;
    Ok(Role {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        description: row.get(3)?,
        permissions: permissions.split_whitespace().map(str::to_string).collect(),
        scheme_managed: row.get(5)?,
        built_in: row.get(6)?,
        create_at: row.get(7)?,
        update_at: row.get(8)?,
        delete_at: row.get(9)?,
    })
}

/// `?1, ?2, …, ?n`
pub(crate) fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}
