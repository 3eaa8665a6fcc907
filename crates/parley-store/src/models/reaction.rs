use serde::{Deserialize, Serialize};

use parley_shared::constants::EMOJI_NAME_MAX_LENGTH;
use parley_shared::{get_millis, AppResult};

use super::{check_id, invalid};

/// An emoji reaction left by a user on a post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reaction {
    pub user_id: String,
    pub post_id: String,
    pub emoji_name: String,
    pub create_at: i64,
}

impl Reaction {
    pub fn new(
        user_id: impl Into<String>,
        post_id: impl Into<String>,
        emoji_name: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            post_id: post_id.into(),
            emoji_name: emoji_name.into(),
            create_at: 0,
        }
    }

    pub fn pre_save(&mut self) {
        if self.create_at == 0 {
            self.create_at = get_millis();
        }
    }

    pub fn is_valid(&self) -> AppResult<()> {
        const LOC: &str = "Reaction.IsValid";
        check_id(LOC, "reaction.user_id", &self.user_id)?;
        check_id(LOC, "reaction.post_id", &self.post_id)?;

        let emoji_ok = !self.emoji_name.is_empty()
            && self.emoji_name.len() <= EMOJI_NAME_MAX_LENGTH
            && self
                .emoji_name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'+'));
        if !emoji_ok {
            return Err(invalid(LOC, "reaction.emoji_name", format!("emoji_name={}", self.emoji_name)));
        }
        if self.create_at == 0 {
            return Err(invalid(LOC, "reaction.create_at", format!("post_id={}", self.post_id)));
        }
        Ok(())
    }
}
