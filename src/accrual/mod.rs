//! Accrual service client
//!
//! One `GET {base}/api/orders/{number}` per lookup. Status codes are
//! translated into [`AccrualReply`] or [`AccrualError`]; the client never
//! retries on its own.

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

use crate::order_number::OrderNumber;

pub use client::HttpAccrualClient;
pub use error::AccrualError;
pub use types::{AccrualReply, AccrualResult, AccrualStatus};

/// Source of accrual results for the reconciliation engine
#[async_trait]
pub trait AccrualSource: Send + Sync {
    async fn fetch_accrual(&self, number: &OrderNumber) -> Result<AccrualReply, AccrualError>;
}
