//! Ledger record types
//!
//! Status strings match the PostgreSQL `orders.status` column and the
//! JSON returned to clients.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::core_types::UserId;
use crate::money::{Money, Timestamp};
use crate::order_number::OrderNumber;

/// Order processing status
///
/// Forward-only: `NEW → PROCESSING/REGISTERED → PROCESSED | INVALID`.
/// Terminal states: PROCESSED, INVALID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Uploaded, accrual service not yet consulted
    New,
    /// Accrual service is computing the reward
    Processing,
    /// Accrual service knows the order but has not started
    Registered,
    /// Terminal: reward computed, amount is authoritative
    Processed,
    /// Terminal: accrual service rejected the order
    Invalid,
}

impl OrderStatus {
    /// Statuses the reconciliation engine still polls for.
    pub const UNRESOLVED: [OrderStatus; 3] = [
        OrderStatus::New,
        OrderStatus::Processing,
        OrderStatus::Registered,
    ];

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
    }

    /// Position in the forward-only progression.
    #[inline]
    fn rank(&self) -> u8 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Processing | OrderStatus::Registered => 1,
            OrderStatus::Processed | OrderStatus::Invalid => 2,
        }
    }

    /// Whether an order in `self` may be rewritten to `next`.
    ///
    /// Terminal orders are frozen; everything else may move sideways
    /// between the two intermediate states or forward.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Registered => "REGISTERED",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "REGISTERED" => Ok(OrderStatus::Registered),
            "PROCESSED" => Ok(OrderStatus::Processed),
            "INVALID" => Ok(OrderStatus::Invalid),
            _ => Err(format!("Invalid order status: {}", s)),
        }
    }
}

/// An uploaded order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub owner: UserId,
    pub number: OrderNumber,
    pub status: OrderStatus,
    /// Stored amount; only meaningful once `status` is PROCESSED
    pub accrual: Option<Money>,
    pub uploaded_at: Timestamp,
}

impl Order {
    /// Fresh upload: NEW with a zero amount
    pub fn new(owner: UserId, number: OrderNumber) -> Self {
        Self {
            owner,
            number,
            status: OrderStatus::New,
            accrual: Some(Money::ZERO),
            uploaded_at: Timestamp::now(),
        }
    }

    /// Amount a client may rely on (PROCESSED orders only)
    pub fn settled_accrual(&self) -> Option<Money> {
        match self.status {
            OrderStatus::Processed => self.accrual,
            _ => None,
        }
    }
}

/// A spend of points against a new order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Withdrawal {
    pub owner: UserId,
    pub order: OrderNumber,
    pub amount: Money,
    pub processed_at: Timestamp,
}

/// Derived balance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub current: Money,
    pub withdrawn: Money,
}

impl Balance {
    /// `current = accrued - withdrawn`
    pub fn from_totals(accrued: Money, withdrawn: Money) -> Self {
        Self {
            current: accrued - withdrawn,
            withdrawn,
        }
    }
}

/// One status/amount rewrite produced by a reconciliation round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccrualUpdate {
    pub number: OrderNumber,
    pub status: OrderStatus,
    pub amount: Money,
}
