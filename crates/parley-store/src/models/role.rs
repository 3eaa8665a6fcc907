use serde::{Deserialize, Serialize};

use parley_shared::constants::ROLE_NAME_MAX_LENGTH;
use parley_shared::{get_millis, new_id, AppResult};

use super::{check_id, invalid};

/// A named set of permissions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub permissions: Vec<String>,
    pub scheme_managed: bool,
    pub built_in: bool,
    pub create_at: i64,
    pub update_at: i64,
    pub delete_at: i64,
}

impl Role {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            display_name: display_name.into(),
            description: String::new(),
            permissions: Vec::new(),
            scheme_managed: false,
            built_in: false,
            create_at: 0,
            update_at: 0,
            delete_at: 0,
        }
    }

    /// Assign an id on first save and bump the timestamps.
    pub fn pre_save(&mut self) {
        let now = get_millis();
        if self.id.is_empty() {
            self.id = new_id();
            self.create_at = now;
        }
        self.update_at = now;
    }

    pub fn is_valid(&self) -> AppResult<()> {
        const LOC: &str = "Role.IsValid";
        check_id(LOC, "role.id", &self.id)?;

        let name_ok = !self.name.is_empty()
            && self.name.len() <= ROLE_NAME_MAX_LENGTH
            && self
                .name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !name_ok {
            return Err(invalid(LOC, "role.name", format!("name={}", self.name)));
        }
        if self.permissions.iter().any(|p| p.is_empty() || p.contains(' ')) {
            return Err(invalid(LOC, "role.permissions", format!("id={}", self.id)));
        }
        Ok(())
    }

    /// Permissions as stored: one space-separated string.
    pub(crate) fn permissions_column(&self) -> String {
        self.permissions.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_save_keeps_create_at_on_resave() {
        let mut role = Role::new("team_reader", "Team Reader");
        role.pre_save();
        let first_create = role.create_at;
        let id = role.id.clone();

        role.pre_save();
        assert_eq!(role.id, id);
        assert_eq!(role.create_at, first_create);
        assert!(role.is_valid().is_ok());
    }

    #[test]
    fn permissions_must_be_single_tokens() {
        let mut role = Role::new("writer", "Writer");
        role.pre_save();
        role.permissions = vec!["create_post".into(), "bad perm".into()];
        assert!(role.is_valid().is_err());
    }
}
