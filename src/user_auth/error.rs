//! User Auth Error Types

use axum::http::StatusCode;
use thiserror::Error;

use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Login and password must not be empty")]
    InvalidInput,

    #[error("Login already taken: {0}")]
    LoginTaken(String),

    #[error("Invalid login or password")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Storage(#[from] LedgerError),
}

impl AuthError {
    /// Error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidInput => "INVALID_INPUT",
            AuthError::LoginTaken(_) => "LOGIN_TAKEN",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::Hashing(_) | AuthError::Signing(_) => "AUTH_INTERNAL",
            AuthError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// HTTP status code for API responses
    pub fn http_status(&self) -> StatusCode {
        match self {
            AuthError::InvalidInput => StatusCode::BAD_REQUEST,
            AuthError::LoginTaken(_) => StatusCode::CONFLICT,
            AuthError::InvalidCredentials | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::Hashing(_) | AuthError::Signing(_) | AuthError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
