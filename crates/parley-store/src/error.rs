use parley_shared::AppError;
use thiserror::Error;

/// Infrastructure errors produced by the store layer.
///
/// These never leave the crate as-is: operations convert them into an
/// [`AppError`] that names the failing operation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No pooled connection became available in time.
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// The requested record does not exist.
    #[error("Record not found")]
    NotFound,

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// JSON column could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Convert into the [`AppError`] reported at `location`: `NotFound` stays a
    /// 404, everything else is internal.
    pub fn into_app_error(self, location: &str, id: &str) -> AppError {
        match self {
            StoreError::NotFound => AppError::not_found(location, id, "Record not found"),
            other => AppError::internal(location, id, "We encountered an error with the database")
                .with_details(other.to_string()),
        }
    }

    /// True if the driver rejected a write because of a UNIQUE or PRIMARY KEY
    /// constraint.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Sqlite(e) => is_unique_violation(e),
            _ => false,
        }
    }
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}

pub(crate) fn not_found_on_no_rows(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
