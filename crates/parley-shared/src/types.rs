use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::ID_LENGTH;

/// Generate a new server-side identifier.
///
/// Ids are 26 lowercase alphanumeric characters: the first 26 hex digits of a
/// random v4 UUID.
pub fn new_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(ID_LENGTH);
    id
}

pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LENGTH && id.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn get_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Channel visibility/kind, stored as a single character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    Open,
    Private,
    Direct,
    Group,
}

impl ChannelType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelType::Open => "O",
            ChannelType::Private => "P",
            ChannelType::Direct => "D",
            ChannelType::Group => "G",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "O" => Some(Self::Open),
            "P" => Some(Self::Private),
            "D" => Some(Self::Direct),
            "G" => Some(Self::Group),
            _ => None,
        }
    }

    /// Direct and group messages are not bound to a team.
    pub fn is_team_channel(self) -> bool {
        matches!(self, ChannelType::Open | ChannelType::Private)
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope a permission scheme applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemeScope {
    Team,
    Channel,
}

impl SchemeScope {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemeScope::Team => "team",
            SchemeScope::Channel => "channel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "team" => Some(Self::Team),
            "channel" => Some(Self::Channel),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_valid_and_distinct() {
        let a = new_id();
        let b = new_id();
        assert!(is_valid_id(&a));
        assert!(is_valid_id(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn channel_type_round_trips_through_its_code() {
        for t in [ChannelType::Open, ChannelType::Private, ChannelType::Direct, ChannelType::Group] {
            assert_eq!(ChannelType::parse(t.as_str()), Some(t));
        }
        assert_eq!(ChannelType::parse("X"), None);
    }
}
