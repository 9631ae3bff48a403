//! User persistence contract

use async_trait::async_trait;

use crate::core_types::UserId;
use crate::ledger::LedgerError;

/// Registered user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub login: String,
    /// PHC-formatted argon2 hash
    pub password_hash: String,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user; a taken login fails with `LedgerError::Duplicate`.
    async fn add_user(&self, login: &str, password_hash: &str) -> Result<User, LedgerError>;

    async fn get_user_by_login(&self, login: &str) -> Result<Option<User>, LedgerError>;

    fn is_retryable(&self, err: &LedgerError) -> bool;
}
