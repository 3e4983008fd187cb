use thiserror::Error;

use crate::validation::{SecurityError, UsernameError};

/// Errors that can arise in the menu engine, its stores and the user database.
#[derive(Debug, Error)]
pub enum BbsError {
    /// Wrapper around IO errors (directory creation, file reads and writes).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapper around serde_json errors for menu and user records.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config file could not be parsed.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Returned when a menu or user record is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Returned when creating a record that already exists.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// Menu name, password or record contents rejected by validation.
    #[error("{0}")]
    Security(#[from] SecurityError),

    /// Username failed validation.
    #[error("invalid username: {0}")]
    InvalidUsername(#[from] UsernameError),

    /// Password hashing or verification failed for reasons other than a mismatch.
    #[error("password hash error: {0}")]
    PasswordHash(String),

    /// Configuration is missing a required value or holds an invalid one.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Internal error (poisoned locks, unexpected conditions)
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<password_hash::Error> for BbsError {
    fn from(e: password_hash::Error) -> Self {
        BbsError::PasswordHash(e.to_string())
    }
}
