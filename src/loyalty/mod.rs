//! Loyalty Service
//!
//! User-facing operations on the ledger: order intake, withdrawals,
//! listings and balance reads.
//!
//! # Balance Safety
//!
//! A withdrawal checks the balance and inserts itself while holding the
//! [`BalanceGuard`](crate::balance_guard::BalanceGuard) exclusively, so no
//! two withdrawals can both pass the same check.

pub mod error;
pub mod service;

pub use error::LoyaltyError;
pub use service::{LoyaltyService, OrderSubmission, WithdrawalSubmission};
