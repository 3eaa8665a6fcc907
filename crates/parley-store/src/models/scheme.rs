use serde::{Deserialize, Serialize};

use parley_shared::constants::{ROLE_NAME_MAX_LENGTH, SCHEME_NAME_MAX_LENGTH};
use parley_shared::{get_millis, new_id, AppResult, SchemeScope};

use super::{check_id, invalid};

/// A permission scheme: overrides the default channel role names for every
/// channel (or every channel of every team) it is attached to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scheme {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub scope: SchemeScope,
    pub default_channel_guest_role: String,
    pub default_channel_user_role: String,
    pub default_channel_admin_role: String,
    pub create_at: i64,
    pub update_at: i64,
    pub delete_at: i64,
}

impl Scheme {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>, scope: SchemeScope) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            display_name: display_name.into(),
            description: String::new(),
            scope,
            default_channel_guest_role: String::new(),
            default_channel_user_role: String::new(),
            default_channel_admin_role: String::new(),
            create_at: 0,
            update_at: 0,
            delete_at: 0,
        }
    }

    pub fn pre_save(&mut self) {
        let now = get_millis();
        if self.id.is_empty() {
            self.id = new_id();
            self.create_at = now;
        }
        self.update_at = now;
    }

    pub fn is_valid(&self) -> AppResult<()> {
        const LOC: &str = "Scheme.IsValid";
        check_id(LOC, "scheme.id", &self.id)?;

        if self.name.is_empty() || self.name.len() > SCHEME_NAME_MAX_LENGTH {
            return Err(invalid(LOC, "scheme.name", format!("name={}", self.name)));
        }
        for role in [
            &self.default_channel_guest_role,
            &self.default_channel_user_role,
            &self.default_channel_admin_role,
        ] {
            if role.len() > ROLE_NAME_MAX_LENGTH {
                return Err(invalid(LOC, "scheme.default_role", format!("id={}", self.id)));
            }
        }
        Ok(())
    }

    /// True when all three channel role slots are still unassigned.
    pub(crate) fn needs_default_roles(&self) -> bool {
        self.default_channel_guest_role.is_empty()
            && self.default_channel_user_role.is_empty()
            && self.default_channel_admin_role.is_empty()
    }
}
