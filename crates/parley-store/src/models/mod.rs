//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the API layer.

mod channel;
mod member;
mod reaction;
mod role;
mod scheme;
mod team;

pub use channel::{direct_channel_name, Channel, PublicChannel};
pub use member::{default_notify_props, ChannelMember, NotifyProps};
pub use reaction::Reaction;
pub use role::Role;
pub use scheme::Scheme;
pub use team::{Team, User};

use parley_shared::types::is_valid_id;
use parley_shared::AppError;

/// Shared `is_valid` failure helper: every model reports an invalid field the
/// same way.
pub(crate) fn invalid(location: &str, field: &str, details: impl Into<String>) -> AppError {
    AppError::bad_request(
        location,
        &format!("model.{field}.is_valid.app_error"),
        "Invalid field",
    )
    .with_details(details)
}

pub(crate) fn check_id(location: &str, field: &str, id: &str) -> Result<(), AppError> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(invalid(location, field, format!("{field}={id}")))
    }
}
