//! Ledger Store
//!
//! Persistence contract for orders, withdrawals and balance aggregation.
//!
//! # Implementations
//!
//! - [`PgLedgerStore`] - PostgreSQL via sqlx (production)
//! - [`MemoryLedger`] - in-process store with fault injection (tests, local runs)
//!
//! # Contract
//!
//! 1. **Global uniqueness**: order numbers and withdrawal order numbers are
//!    unique across users; a second insert fails with `Duplicate`
//! 2. **Atomic apply**: `apply_accruals` commits every update or none
//! 3. **Forward-only**: `apply_accruals` never rewrites a terminal order
//! 4. **Retry classification**: `is_retryable` tells the retry helper which
//!    errors are transient

pub mod error;
pub mod memory;
pub mod postgres;
pub mod types;

use async_trait::async_trait;

use crate::core_types::UserId;
use crate::order_number::OrderNumber;

pub use error::LedgerError;
pub use memory::MemoryLedger;
pub use postgres::PgLedgerStore;
pub use types::{AccrualUpdate, Balance, Order, OrderStatus, Withdrawal};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn add_order(&self, order: &Order) -> Result<(), LedgerError>;

    async fn get_order(&self, number: &OrderNumber) -> Result<Option<Order>, LedgerError>;

    /// All orders of one user, unordered
    async fn list_orders(&self, owner: UserId) -> Result<Vec<Order>, LedgerError>;

    /// Up to `limit` orders still in NEW / PROCESSING / REGISTERED, oldest first
    async fn list_unresolved_orders(&self, limit: usize) -> Result<Vec<Order>, LedgerError>;

    async fn get_withdrawal(&self, order: &OrderNumber)
    -> Result<Option<Withdrawal>, LedgerError>;

    /// All withdrawals of one user, unordered
    async fn list_withdrawals(&self, owner: UserId) -> Result<Vec<Withdrawal>, LedgerError>;

    async fn balance(&self, owner: UserId) -> Result<Balance, LedgerError>;

    async fn add_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), LedgerError>;

    /// Apply a round's updates in one transaction.
    ///
    /// Returns the number of orders actually rewritten; updates aimed at
    /// unknown or terminal orders are skipped.
    async fn apply_accruals(&self, updates: &[AccrualUpdate]) -> Result<usize, LedgerError>;

    /// Whether `err` is transient and worth retrying
    fn is_retryable(&self, err: &LedgerError) -> bool;
}
