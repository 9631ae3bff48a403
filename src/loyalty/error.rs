//! Loyalty Error Types

use axum::http::StatusCode;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::money::Money;
use crate::order_number::OrderNumberError;

#[derive(Debug, Error)]
pub enum LoyaltyError {
    // === Validation Errors ===
    #[error("Invalid order number: {0}")]
    OrderFormat(#[from] OrderNumberError),

    #[error("Withdrawal amount must be positive, got {0}")]
    InvalidAmount(Money),

    // === Business Errors ===
    #[error("Order {0} was already uploaded by another user")]
    AlreadyUploadedByAnotherUser(String),

    #[error("Insufficient funds: balance {current}, requested {requested}")]
    InsufficientFunds { current: Money, requested: Money },

    // === System Errors ===
    #[error(transparent)]
    Storage(#[from] LedgerError),
}

impl LoyaltyError {
    /// Error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LoyaltyError::OrderFormat(_) => "ORDER_FORMAT",
            LoyaltyError::InvalidAmount(_) => "INVALID_AMOUNT",
            LoyaltyError::AlreadyUploadedByAnotherUser(_) => "ORDER_CONFLICT",
            LoyaltyError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LoyaltyError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// HTTP status code for API responses
    pub fn http_status(&self) -> StatusCode {
        match self {
            LoyaltyError::OrderFormat(_) | LoyaltyError::InvalidAmount(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            LoyaltyError::AlreadyUploadedByAnotherUser(_) => StatusCode::CONFLICT,
            LoyaltyError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            LoyaltyError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
