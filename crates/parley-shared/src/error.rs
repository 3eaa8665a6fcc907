use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse status class attached to every [`AppError`].
///
/// The API layer maps these straight onto HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorStatus {
    BadRequest,
    NotFound,
    Internal,
}

impl ErrorStatus {
    pub fn http_status(self) -> u16 {
        match self {
            ErrorStatus::BadRequest => 400,
            ErrorStatus::NotFound => 404,
            ErrorStatus::Internal => 500,
        }
    }
}

/// Structured error returned by every store operation.
///
/// `id` is the machine-readable code (for example
/// `store.sql_channel.save.archived_channel.app_error`), `message` is meant for
/// humans, `detailed_error` carries ids and driver messages for the logs.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{location}: {message}, {detailed_error}")]
pub struct AppError {
    pub id: String,
    pub message: String,
    pub detailed_error: String,
    pub location: String,
    pub status: ErrorStatus,
}

impl AppError {
    pub fn new(
        location: impl Into<String>,
        id: impl Into<String>,
        message: impl Into<String>,
        status: ErrorStatus,
    ) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            detailed_error: String::new(),
            location: location.into(),
            status,
        }
    }

    pub fn bad_request(location: &str, id: &str, message: &str) -> Self {
        Self::new(location, id, message, ErrorStatus::BadRequest)
    }

    pub fn not_found(location: &str, id: &str, message: &str) -> Self {
        Self::new(location, id, message, ErrorStatus::NotFound)
    }

    pub fn internal(location: &str, id: &str, message: &str) -> Self {
        Self::new(location, id, message, ErrorStatus::Internal)
    }

    /// Attach the contextual detail string.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.detailed_error = details.into();
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.status == ErrorStatus::NotFound
    }
}
