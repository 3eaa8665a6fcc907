use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use parley_shared::{get_millis, AppResult};

use super::{check_id, invalid};

/// Per-member notification settings, stored as a JSON object.
pub type NotifyProps = HashMap<String, String>;

/// A user's membership in a channel.
///
/// `roles` is the full, space-separated role list including scheme-implied
/// roles; `explicit_roles` holds only the roles stored on the row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelMember {
    pub channel_id: String,
    pub user_id: String,
    pub roles: String,
    pub explicit_roles: String,
    pub last_viewed_at: i64,
    pub msg_count: i64,
    pub mention_count: i64,
    pub notify_props: NotifyProps,
    pub last_update_at: i64,
    pub scheme_guest: bool,
    pub scheme_user: bool,
    pub scheme_admin: bool,
}

impl ChannelMember {
    /// A regular member with default notification settings.
    pub fn new(channel_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            roles: String::new(),
            explicit_roles: String::new(),
            last_viewed_at: 0,
            msg_count: 0,
            mention_count: 0,
            notify_props: default_notify_props(),
            last_update_at: 0,
            scheme_guest: false,
            scheme_user: true,
            scheme_admin: false,
        }
    }

    pub fn pre_save(&mut self) {
        self.last_update_at = get_millis();
    }

    pub fn pre_update(&mut self) {
        self.last_update_at = get_millis();
    }

    pub fn is_valid(&self) -> AppResult<()> {
        const LOC: &str = "ChannelMember.IsValid";

        check_id(LOC, "channel_member.channel_id", &self.channel_id)?;
        check_id(LOC, "channel_member.user_id", &self.user_id)?;

        if self.scheme_guest && self.scheme_user {
            return Err(invalid(
                LOC,
                "channel_member.scheme_guest",
                format!("channel_id={}, user_id={}", self.channel_id, self.user_id),
            ));
        }

        Ok(())
    }
}

pub fn default_notify_props() -> NotifyProps {
    [
        ("desktop", "default"),
        ("email", "default"),
        ("push", "default"),
        ("mark_unread", "all"),
        ("ignore_channel_mentions", "default"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
