//! # parley-shared
//!
//! Types shared by every Parley crate: the structured [`AppError`], id and
//! clock helpers, and the well-known constants (role ids, cache names and
//! sizes) that the store and its callers agree on.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{AppError, ErrorStatus};
pub use types::{get_millis, new_id, ChannelType, SchemeScope};

pub type AppResult<T> = std::result::Result<T, AppError>;
