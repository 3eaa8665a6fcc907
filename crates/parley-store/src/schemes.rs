use rusqlite::{params, OptionalExtension, Row, Transaction};

use parley_shared::constants::{CHANNEL_ADMIN_ROLE_ID, CHANNEL_GUEST_ROLE_ID, CHANNEL_USER_ROLE_ID};
use parley_shared::{new_id, SchemeScope};

use crate::database::Database;
use crate::error::Result;
use crate::models::{Role, Scheme};
use crate::roles::upsert_role_on;

const SCHEME_COLUMNS: &str = "id, name, display_name, description, scope, \
                              default_channel_guest_role, default_channel_user_role, \
                              default_channel_admin_role, create_at, update_at, delete_at";

impl Database {
    /// Insert a new scheme. When none of its channel role slots are set, three
    /// scheme-managed roles are created alongside it, each starting with the
    /// permissions of the matching well-known role.
    ///
    /// Expects `scheme.pre_save()` to have run.
    pub fn create_scheme(&self, scheme: &mut Scheme) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.begin()?;

        if scheme.needs_default_roles() {
            let display = scheme.display_name.clone();
            let now = scheme.create_at;
            scheme.default_channel_guest_role = create_scheme_role(
                &tx,
                CHANNEL_GUEST_ROLE_ID,
                &format!("Channel Guest Role for Scheme {display}"),
                now,
            )?;
            scheme.default_channel_user_role = create_scheme_role(
                &tx,
                CHANNEL_USER_ROLE_ID,
                &format!("Channel User Role for Scheme {display}"),
                now,
            )?;
            scheme.default_channel_admin_role = create_scheme_role(
                &tx,
                CHANNEL_ADMIN_ROLE_ID,
                &format!("Channel Admin Role for Scheme {display}"),
                now,
            )?;
        }

        tx.execute(
            "INSERT INTO schemes (id, name, display_name, description, scope,
                                  default_channel_guest_role, default_channel_user_role,
                                  default_channel_admin_role, create_at, update_at, delete_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                scheme.id,
                scheme.name,
                scheme.display_name,
                scheme.description,
                scheme.scope.as_str(),
                scheme.default_channel_guest_role,
                scheme.default_channel_user_role,
                scheme.default_channel_admin_role,
                scheme.create_at,
                scheme.update_at,
                scheme.delete_at,
            ],
        )?;

        tx.commit()?;
        tracing::debug!(scheme_id = %scheme.id, "scheme created");
        Ok(())
    }

    /// Overwrite the mutable columns of an existing scheme. Returns `false`
    /// when no scheme has that id.
    pub fn update_scheme(&self, scheme: &Scheme) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM schemes WHERE id = ?1)",
            params![scheme.id],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(false);
        }
        conn.execute(
            "UPDATE schemes SET name = ?2, display_name = ?3, description = ?4,
                                default_channel_guest_role = ?5, default_channel_user_role = ?6,
                                default_channel_admin_role = ?7, update_at = ?8, delete_at = ?9
             WHERE id = ?1",
            params![
                scheme.id,
                scheme.name,
                scheme.display_name,
                scheme.description,
                scheme.default_channel_guest_role,
                scheme.default_channel_user_role,
                scheme.default_channel_admin_role,
                scheme.update_at,
                scheme.delete_at,
            ],
        )?;
        Ok(true)
    }

    pub fn get_scheme(&self, id: &str) -> Result<Option<Scheme>> {
        let conn = self.conn()?;
        let scheme = conn
            .query_row(
                &format!("SELECT {SCHEME_COLUMNS} FROM schemes WHERE id = ?1"),
                params![id],
                row_to_scheme,
            )
            .optional()?;
        Ok(scheme)
    }

    pub fn get_scheme_by_name(&self, name: &str) -> Result<Option<Scheme>> {
        let conn = self.conn()?;
        let scheme = conn
            .query_row(
                &format!("SELECT {SCHEME_COLUMNS} FROM schemes WHERE name = ?1"),
                params![name],
                row_to_scheme,
            )
            .optional()?;
        Ok(scheme)
    }

    /// Live schemes, newest first, optionally restricted to one scope.
    pub fn get_schemes_page(
        &self,
        scope: Option<SchemeScope>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Scheme>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCHEME_COLUMNS} FROM schemes
             WHERE delete_at = 0 AND (?1 IS NULL OR scope = ?1)
             ORDER BY create_at DESC, id
             LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(
            params![scope.map(SchemeScope::as_str), limit, offset],
            row_to_scheme,
        )?;
        let schemes = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(schemes)
    }

    /// Soft delete a scheme and its roles, and detach it from every team and
    /// channel that references it. Returns `None` if the scheme does not exist.
    pub fn delete_scheme(&self, id: &str, now: i64) -> Result<Option<Scheme>> {
        let mut conn = self.conn()?;
        let tx = conn.begin()?;

        let Some(mut scheme) = tx
            .query_row(
                &format!("SELECT {SCHEME_COLUMNS} FROM schemes WHERE id = ?1"),
                params![id],
                row_to_scheme,
            )
            .optional()?
        else {
            return Ok(None);
        };

        tx.execute("UPDATE teams SET scheme_id = NULL WHERE scheme_id = ?1", params![id])?;
        let channels = tx.execute("UPDATE channels SET scheme_id = NULL WHERE scheme_id = ?1", params![id])?;
        tx.execute(
            "UPDATE roles SET delete_at = ?1, update_at = ?1 WHERE name IN (?2, ?3, ?4)",
            params![
                now,
                scheme.default_channel_guest_role,
                scheme.default_channel_user_role,
                scheme.default_channel_admin_role,
            ],
        )?;
        tx.execute(
            "UPDATE schemes SET delete_at = ?1, update_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        tx.commit()?;

        tracing::info!(scheme_id = %id, channels_reset = channels, "scheme deleted");
        scheme.delete_at = now;
        scheme.update_at = now;
        Ok(Some(scheme))
    }

    pub fn delete_all_schemes(&self) -> Result<usize> {
        Ok(self.conn()?.execute("DELETE FROM schemes", [])?)
    }
}

/// Create a scheme-managed role named with a fresh id, seeded from the
/// permissions of `template` if that role exists. Returns the new role name.
fn create_scheme_role(
    tx: &Transaction<'_>,
    template: &str,
    display_name: &str,
    now: i64,
) -> Result<String> {
    let permissions: Option<String> = tx
        .query_row(
            "SELECT permissions FROM roles WHERE name = ?1",
            params![template],
            |row| row.get(0),
        )
        .optional()?;

    let mut role = Role::new(new_id(), display_name);
    role.id = new_id();
    role.permissions = permissions
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    role.scheme_managed = true;
    role.create_at = now;
    role.update_at = now;

    upsert_role_on(tx, &role)?;
    Ok(role.name)
}

fn row_to_scheme(row: &Row<'_>) -> rusqlite::Result<Scheme> {
    let scope: String = row.get(4)?;
    let scope = SchemeScope::parse(&scope).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown scheme scope {scope}").into(),
        )
    })?;

    Ok(Scheme {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        description: row.get(3)?,
        scope,
        default_channel_guest_role: row.get(5)?,
        default_channel_user_role: row.get(6)?,
        default_channel_admin_role: row.get(7)?,
        create_at: row.get(8)?,
        update_at: row.get(9)?,
        delete_at: row.get(10)?,
    })
}
