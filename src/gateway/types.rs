//! Request and response DTOs

use serde::{Deserialize, Serialize};

use crate::ledger::{Order, OrderStatus, Withdrawal};
use crate::money::{Money, Timestamp};

/// Order as listed to its owner
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub number: String,
    pub status: OrderStatus,
    /// Present for PROCESSED orders only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Money>,
    pub uploaded_at: Timestamp,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            number: order.number.to_string(),
            status: order.status,
            accrual: order.settled_accrual(),
            uploaded_at: order.uploaded_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WithdrawalView {
    pub order: String,
    pub sum: Money,
    pub processed_at: Timestamp,
}

impl From<&Withdrawal> for WithdrawalView {
    fn from(w: &Withdrawal) -> Self {
        Self {
            order: w.order.to_string(),
            sum: w.amount,
            processed_at: w.processed_at,
        }
    }
}

/// POST /api/user/balance/withdraw body
#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub order: String,
    pub sum: Money,
}
