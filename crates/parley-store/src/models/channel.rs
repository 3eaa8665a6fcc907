use serde::{Deserialize, Serialize};

use parley_shared::constants::{
    CHANNEL_DISPLAY_NAME_MAX_RUNES, CHANNEL_HEADER_MAX_RUNES, CHANNEL_NAME_MAX_LENGTH,
    CHANNEL_PURPOSE_MAX_RUNES, ID_LENGTH,
};
use parley_shared::{get_millis, new_id, AppResult, ChannelType};

use super::{check_id, invalid};

/// A conversation channel.
///
/// Open and private channels belong to a team; direct and group channels have
/// an empty `team_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    /// Server-generated id, empty until saved.
    pub id: String,
    pub create_at: i64,
    pub update_at: i64,
    /// Soft delete marker in ms since the epoch, 0 while live.
    pub delete_at: i64,
    pub team_id: String,
    pub channel_type: ChannelType,
    pub display_name: String,
    /// Url-safe handle, unique per team.
    pub name: String,
    pub header: String,
    pub purpose: String,
    pub last_post_at: i64,
    pub total_msg_count: i64,
    pub extra_update_at: i64,
    pub creator_id: String,
    pub scheme_id: Option<String>,
}

impl Channel {
    /// Unsaved channel with every optional field empty.
    pub fn new(
        team_id: impl Into<String>,
        name: impl Into<String>,
        display_name: impl Into<String>,
        channel_type: ChannelType,
    ) -> Self {
        Self {
            id: String::new(),
            create_at: 0,
            update_at: 0,
            delete_at: 0,
            team_id: team_id.into(),
            channel_type,
            display_name: display_name.into(),
            name: name.into(),
            header: String::new(),
            purpose: String::new(),
            last_post_at: 0,
            total_msg_count: 0,
            extra_update_at: 0,
            creator_id: String::new(),
            scheme_id: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.channel_type == ChannelType::Open
    }

    /// Assign an id and the creation timestamps.
    pub fn pre_save(&mut self) {
        if self.id.is_empty() {
            self.id = new_id();
        }
        self.name = self.name.to_lowercase();
        self.create_at = get_millis();
        self.update_at = self.create_at;
        self.extra_update_at = self.create_at;
    }

    pub fn pre_update(&mut self) {
        self.name = self.name.to_lowercase();
        self.update_at = get_millis();
    }

    pub fn is_valid(&self) -> AppResult<()> {
        const LOC: &str = "Channel.IsValid";

        check_id(LOC, "channel.id", &self.id)?;

        if self.create_at == 0 {
            return Err(invalid(LOC, "channel.create_at", format!("id={}", self.id)));
        }
        if self.update_at == 0 {
            return Err(invalid(LOC, "channel.update_at", format!("id={}", self.id)));
        }
        if self.display_name.chars().count() > CHANNEL_DISPLAY_NAME_MAX_RUNES {
            return Err(invalid(LOC, "channel.display_name", format!("id={}", self.id)));
        }
        if !is_valid_channel_identifier(&self.name) {
            return Err(invalid(LOC, "channel.name", format!("id={}", self.id)));
        }
        if self.header.chars().count() > CHANNEL_HEADER_MAX_RUNES {
            return Err(invalid(LOC, "channel.header", format!("id={}", self.id)));
        }
        if self.purpose.chars().count() > CHANNEL_PURPOSE_MAX_RUNES {
            return Err(invalid(LOC, "channel.purpose", format!("id={}", self.id)));
        }
        if self.creator_id.len() > ID_LENGTH {
            return Err(invalid(LOC, "channel.creator_id", format!("id={}", self.id)));
        }
        if self.channel_type.is_team_channel() && self.team_id.is_empty() {
            return Err(invalid(LOC, "channel.team_id", format!("id={}", self.id)));
        }

        Ok(())
    }

    /// The row this channel contributes to the public channel projection.
    pub fn public_projection(&self) -> PublicChannel {
        PublicChannel {
            id: self.id.clone(),
            delete_at: self.delete_at,
            team_id: self.team_id.clone(),
            display_name: self.display_name.clone(),
            name: self.name.clone(),
            header: self.header.clone(),
            purpose: self.purpose.clone(),
        }
    }
}

/// The subset of an open channel kept in `public_channels`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicChannel {
    pub id: String,
    pub delete_at: i64,
    pub team_id: String,
    pub display_name: String,
    pub name: String,
    pub header: String,
    pub purpose: String,
}

/// Name of the direct channel between two users: both ids, sorted, joined by
/// a double underscore.
pub fn direct_channel_name(user_id: &str, other_user_id: &str) -> String {
    if user_id > other_user_id {
        format!("{other_user_id}__{user_id}")
    } else {
        format!("{user_id}__{other_user_id}")
    }
}

fn is_valid_channel_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= CHANNEL_NAME_MAX_LENGTH
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}
