//! Accrual client errors

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccrualError {
    #[error("Invalid accrual client configuration: {0}")]
    Config(String),

    #[error("Accrual request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Accrual service failure: {0}")]
    Server(StatusCode),

    #[error("Unexpected accrual status: {0}")]
    UnexpectedStatus(StatusCode),

    #[error("Undecodable accrual body: {0}")]
    Decode(String),
}
