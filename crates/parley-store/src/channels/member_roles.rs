use parley_shared::constants::{CHANNEL_ADMIN_ROLE_ID, CHANNEL_GUEST_ROLE_ID, CHANNEL_USER_ROLE_ID};

/// Default role names contributed by the schemes attached to a channel and
/// its team. `None` (or an empty name) falls through to the next level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemeDefaults {
    pub channel_guest_role: Option<String>,
    pub channel_user_role: Option<String>,
    pub channel_admin_role: Option<String>,
    pub team_guest_role: Option<String>,
    pub team_user_role: Option<String>,
    pub team_admin_role: Option<String>,
}

impl SchemeDefaults {
    fn pick<'a>(channel: &'a Option<String>, team: &'a Option<String>, builtin: &'a str) -> &'a str {
        [channel, team]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|name| !name.is_empty())
            .unwrap_or(builtin)
    }

    fn guest(&self) -> &str {
        Self::pick(&self.channel_guest_role, &self.team_guest_role, CHANNEL_GUEST_ROLE_ID)
    }

    fn user(&self) -> &str {
        Self::pick(&self.channel_user_role, &self.team_user_role, CHANNEL_USER_ROLE_ID)
    }

    fn admin(&self) -> &str {
        Self::pick(&self.channel_admin_role, &self.team_admin_role, CHANNEL_ADMIN_ROLE_ID)
    }
}

/// Effective roles of one membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoles {
    /// Every role, scheme-implied ones included, space separated.
    pub roles: String,
    /// Only the roles stored on the membership.
    pub explicit_roles: String,
    pub scheme_guest: bool,
    pub scheme_user: bool,
    pub scheme_admin: bool,
}

/// Resolve the stored role string of a membership against its scheme flags.
///
/// An implicit token (`channel_guest`, `channel_user`, `channel_admin`) in
/// `raw_roles` sets its flag and stays out of `explicit_roles`. Every flag
/// set afterwards adds the default role for that slot, unless `roles`
/// already holds it.
pub fn resolve_member_roles(
    raw_roles: &str,
    scheme_guest: bool,
    scheme_user: bool,
    scheme_admin: bool,
    defaults: &SchemeDefaults,
) -> ResolvedRoles {
    let (mut guest, mut user, mut admin) = (scheme_guest, scheme_user, scheme_admin);
    let mut roles: Vec<&str> = Vec::new();
    let mut explicit: Vec<&str> = Vec::new();

    for token in raw_roles.split_whitespace() {
        match token {
            CHANNEL_GUEST_ROLE_ID => guest = true,
            CHANNEL_USER_ROLE_ID => user = true,
            CHANNEL_ADMIN_ROLE_ID => admin = true,
            _ => explicit.push(token),
        }
        roles.push(token);
    }

    for (flag, implied) in [(guest, defaults.guest()), (user, defaults.user()), (admin, defaults.admin())] {
        if flag && !roles.contains(&implied) {
            roles.push(implied);
        }
    }

    ResolvedRoles {
        roles: roles.join(" "),
        explicit_roles: explicit.join(" "),
        scheme_guest: guest,
        scheme_user: user,
        scheme_admin: admin,
    }
}
