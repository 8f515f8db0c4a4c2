//! Authentication and session logic.
//!
//! Access token signing, the refresh token store, and the interfaces of the
//! two external collaborators used by the login flow (user directory and
//! password hasher).

pub mod jwt;
pub mod password;
pub mod queries;
pub mod refresh;
pub mod users;

use thiserror::Error;

/// Access token errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("token signature does not match")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("token subject is not a valid user id")]
    InvalidSubject,

    #[error("token lifetime must be at least one second")]
    InvalidLifetime,

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Refresh token store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("refresh token not found")]
    NotFound,

    #[error("refresh token expired")]
    Expired,

    #[error("refresh token revoked")]
    Revoked,

    #[error("refresh token storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for RefreshError {
    fn from(e: sqlx::Error) -> Self {
        RefreshError::Storage(e.to_string())
    }
}

/// Errors raised by the user directory and password hasher collaborators.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Password hashing error: {0}")]
    Hashing(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
