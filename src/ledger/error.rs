//! Ledger Error Types

use thiserror::Error;

use crate::retry::Cancelled;

/// SQLSTATE for unique_violation
pub(crate) const PG_UNIQUE_VIOLATION: &str = "23505";

/// SQLSTATE class for connection exceptions
pub(crate) const PG_CONNECTION_EXCEPTION_CLASS: &str = "08";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl LedgerError {
    /// Map a unique-key violation to `Duplicate`, pass everything else through.
    pub(crate) fn from_insert(e: sqlx::Error, key: &str) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(PG_UNIQUE_VIOLATION) => {
                LedgerError::Duplicate(key.to_string())
            }
            _ => LedgerError::Database(e),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, LedgerError::Cancelled(_))
    }
}
