//! Accrual service reply types

use serde::Deserialize;
use std::time::Duration;

use crate::ledger::OrderStatus;
use crate::money::Money;

/// Order status as reported by the accrual service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccrualStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl From<AccrualStatus> for OrderStatus {
    fn from(status: AccrualStatus) -> Self {
        match status {
            AccrualStatus::Registered => OrderStatus::Registered,
            AccrualStatus::Processing => OrderStatus::Processing,
            AccrualStatus::Invalid => OrderStatus::Invalid,
            AccrualStatus::Processed => OrderStatus::Processed,
        }
    }
}

#[derive(Deserialize)]
struct RawAccrualResult {
    order: String,
    status: AccrualStatus,
    #[serde(default)]
    accrual: Option<Money>,
}

/// Decoded `200 OK` body; a missing or null `accrual` reads as zero.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawAccrualResult")]
pub struct AccrualResult {
    pub order: String,
    pub status: AccrualStatus,
    pub accrual: Money,
}

impl From<RawAccrualResult> for AccrualResult {
    fn from(raw: RawAccrualResult) -> Self {
        Self {
            order: raw.order,
            status: raw.status,
            accrual: raw.accrual.unwrap_or(Money::ZERO),
        }
    }
}

/// Non-error outcomes of one lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccrualReply {
    /// 200: the service knows the order
    Ready(AccrualResult),
    /// 204: order not registered with the service
    NotRegistered,
    /// 429 with a usable `Retry-After`
    RateLimited(Duration),
    /// 429 without a usable `Retry-After`
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_processed() {
        let r: AccrualResult =
            serde_json::from_str(r#"{"order":"4561261212345467","status":"PROCESSED","accrual":500}"#)
                .unwrap();
        assert_eq!(r.order, "4561261212345467");
        assert_eq!(r.status, AccrualStatus::Processed);
        assert_eq!(r.accrual, Money::from_minor(50_000));
    }

    #[test]
    fn test_missing_or_null_sum_is_zero() {
        let r: AccrualResult =
            serde_json::from_str(r#"{"order":"79927398713","status":"PROCESSING"}"#).unwrap();
        assert_eq!(r.accrual, Money::ZERO);

        let r: AccrualResult =
            serde_json::from_str(r#"{"order":"79927398713","status":"INVALID","accrual":null}"#)
                .unwrap();
        assert_eq!(r.accrual, Money::ZERO);
        assert_eq!(OrderStatus::from(r.status), OrderStatus::Invalid);
    }

    #[test]
    fn test_unknown_status_rejected() {
        let r = serde_json::from_str::<AccrualResult>(r#"{"order":"1","status":"NEW"}"#);
        assert!(r.is_err());
    }
}
