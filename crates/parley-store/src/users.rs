use rusqlite::params;

use crate::database::Database;
use crate::error::{not_found_on_no_rows, Result};
use crate::models::User;

impl Database {
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO users (id, username, delete_at) VALUES (?1, ?2, ?3)",
            params![user.id, user.username, user.delete_at],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<User> {
        self.conn()?
            .query_row(
                "SELECT id, username, delete_at FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        delete_at: row.get(2)?,
                    })
                },
            )
            .map_err(not_found_on_no_rows)
    }

    /// Deactivated users keep their memberships but stop counting as members.
    pub fn set_user_delete_at(&self, id: &str, delete_at: i64) -> Result<bool> {
        let affected = self.conn()?.execute(
            "UPDATE users SET delete_at = ?1 WHERE id = ?2",
            params![delete_at, id],
        )?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::new_id;

    #[test]
    fn deactivate_user() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("users.db")).unwrap();

        let user = User {
            id: new_id(),
            username: "alice".into(),
            delete_at: 0,
        };
        db.create_user(&user).unwrap();
        assert!(db.set_user_delete_at(&user.id, 42).unwrap());
        assert_eq!(db.get_user(&user.id).unwrap().delete_at, 42);
        assert!(!db.set_user_delete_at("missing", 1).unwrap());
    }
}
