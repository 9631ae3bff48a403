//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules.
//! They provide semantic meaning and enable future type evolution.

/// User ID - globally unique, immutable after assignment.
///
/// # Usage:
/// - Primary key for user accounts (`BIGSERIAL` in PostgreSQL)
/// - Owner of orders and withdrawals
/// - JWT subject claim
pub type UserId = i64;

/// Upper bound on ledger retry attempts for a single operation.
pub const LEDGER_RETRY_ATTEMPTS: usize = 3;
