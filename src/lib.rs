//! Loyalty Ledger - loyalty-point accounting with accrual reconciliation
//!
//! Users upload order numbers, an external accrual service decides how many
//! points each order earns, and users spend points through withdrawals.
//!
//! # Modules
//!
//! - [`money`] - Fixed-point amounts and RFC 3339 timestamps
//! - [`order_number`] - Luhn-validated order numbers
//! - [`ledger`] - `LedgerStore` trait with PostgreSQL and in-memory stores
//! - [`accrual`] - HTTP client for the accrual service
//! - [`reconcile`] - Reconciliation rounds and the poll scheduler
//! - [`loyalty`] - Order intake, withdrawals, listings, balances
//! - [`balance_guard`] - Process-wide balance reader/writer lock
//! - [`retry`] - Bounded retry with fixed backoff
//! - [`shutdown`] - Cooperative cancellation
//! - [`user_auth`] - Registration, login, JWT
//! - [`gateway`] - axum HTTP surface

// Core types - must be first!
pub mod core_types;

// Value types
pub mod money;
pub mod order_number;

// Runtime primitives
pub mod balance_guard;
pub mod retry;
pub mod shutdown;

// Domain
pub mod accrual;
pub mod ledger;
pub mod loyalty;
pub mod reconcile;
pub mod user_auth;

// Service shell
pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;

// Convenient re-exports at crate root
pub use balance_guard::BalanceGuard;
pub use core_types::UserId;
pub use ledger::{LedgerStore, MemoryLedger, PgLedgerStore};
pub use loyalty::{LoyaltyService, OrderSubmission, WithdrawalSubmission};
pub use money::{Money, Timestamp};
pub use order_number::OrderNumber;
pub use reconcile::{PollConfig, PollScheduler, ReconcileEngine};
pub use retry::RetryPolicy;
pub use shutdown::ShutdownSignal;
