use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::LoyaltyError;
use crate::balance_guard::BalanceGuard;
use crate::core_types::UserId;
use crate::ledger::{Balance, LedgerError, LedgerStore, Order, Withdrawal};
use crate::money::{Money, Timestamp};
use crate::order_number::OrderNumber;
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownSignal;

/// Successful outcomes of [`LoyaltyService::submit_order`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSubmission {
    /// New order stored as NEW
    Accepted,
    /// The caller had already uploaded this number
    AlreadyUploaded,
}

/// Successful outcomes of [`LoyaltyService::submit_withdrawal`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalSubmission {
    Recorded,
    /// The caller had already withdrawn against this number
    AlreadyRecorded,
}

pub struct LoyaltyService {
    ledger: Arc<dyn LedgerStore>,
    guard: Arc<BalanceGuard>,
    retry: RetryPolicy,
    shutdown: ShutdownSignal,
}

impl LoyaltyService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        guard: Arc<BalanceGuard>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            ledger,
            guard,
            retry: RetryPolicy::default(),
            shutdown,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run a ledger call through the retry policy
    async fn ledger_op<T, F, Fut>(&self, op: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let ledger = &self.ledger;
        self.retry
            .run(&self.shutdown, |e| ledger.is_retryable(e), op)
            .await
    }

    /// Upload an order number for `user`.
    pub async fn submit_order(
        &self,
        user: UserId,
        raw_number: &str,
    ) -> Result<OrderSubmission, LoyaltyError> {
        let number = OrderNumber::parse(raw_number)?;

        if let Some(existing) = self.ledger_op(|| self.ledger.get_order(&number)).await? {
            return Self::classify_order_owner(user, &existing);
        }

        let order = Order::new(user, number.clone());
        match self.ledger_op(|| self.ledger.add_order(&order)).await {
            Ok(()) => {
                info!(user_id = user, order = %number, "Order accepted");
                Ok(OrderSubmission::Accepted)
            }
            // Lost an insert race: whoever won owns the number
            Err(LedgerError::Duplicate(_)) => {
                let existing = self
                    .ledger_op(|| self.ledger.get_order(&number))
                    .await?
                    .ok_or_else(|| {
                        LedgerError::Corrupt(format!("order {} vanished after duplicate", number))
                    })?;
                Self::classify_order_owner(user, &existing)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn classify_order_owner(user: UserId, existing: &Order) -> Result<OrderSubmission, LoyaltyError> {
        if existing.owner == user {
            Ok(OrderSubmission::AlreadyUploaded)
        } else {
            warn!(
                user_id = user,
                owner_id = existing.owner,
                order = %existing.number,
                "Order already uploaded by another user"
            );
            Err(LoyaltyError::AlreadyUploadedByAnotherUser(
                existing.number.to_string(),
            ))
        }
    }

    /// Spend `amount` points against a new order number.
    pub async fn submit_withdrawal(
        &self,
        user: UserId,
        raw_order: &str,
        amount: Money,
    ) -> Result<WithdrawalSubmission, LoyaltyError> {
        let order = OrderNumber::parse(raw_order)?;
        if !amount.is_positive() {
            return Err(LoyaltyError::InvalidAmount(amount));
        }

        if let Some(existing) = self.ledger_op(|| self.ledger.get_withdrawal(&order)).await? {
            return Self::classify_withdrawal_owner(user, &existing);
        }

        let _exclusive = self.guard.write().await;

        let balance = self.ledger_op(|| self.ledger.balance(user)).await?;
        if balance.current < amount {
            info!(
                user_id = user,
                current = %balance.current,
                requested = %amount,
                "Withdrawal rejected: insufficient funds"
            );
            return Err(LoyaltyError::InsufficientFunds {
                current: balance.current,
                requested: amount,
            });
        }

        let withdrawal = Withdrawal {
            owner: user,
            order: order.clone(),
            amount,
            processed_at: Timestamp::now(),
        };
        match self.ledger_op(|| self.ledger.add_withdrawal(&withdrawal)).await {
            Ok(()) => {
                info!(user_id = user, order = %order, amount = %amount, "Withdrawal recorded");
                Ok(WithdrawalSubmission::Recorded)
            }
            Err(LedgerError::Duplicate(_)) => {
                let existing = self
                    .ledger_op(|| self.ledger.get_withdrawal(&order))
                    .await?
                    .ok_or_else(|| {
                        LedgerError::Corrupt(format!(
                            "withdrawal {} vanished after duplicate",
                            order
                        ))
                    })?;
                Self::classify_withdrawal_owner(user, &existing)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn classify_withdrawal_owner(
        user: UserId,
        existing: &Withdrawal,
    ) -> Result<WithdrawalSubmission, LoyaltyError> {
        if existing.owner == user {
            Ok(WithdrawalSubmission::AlreadyRecorded)
        } else {
            Err(LoyaltyError::AlreadyUploadedByAnotherUser(
                existing.order.to_string(),
            ))
        }
    }

    /// Orders of `user`, newest upload first
    pub async fn list_orders(&self, user: UserId) -> Result<Vec<Order>, LoyaltyError> {
        let mut orders = self.ledger_op(|| self.ledger.list_orders(user)).await?;
        orders.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(orders)
    }

    /// Withdrawals of `user`, newest first
    pub async fn list_withdrawals(&self, user: UserId) -> Result<Vec<Withdrawal>, LoyaltyError> {
        let mut withdrawals = self.ledger_op(|| self.ledger.list_withdrawals(user)).await?;
        withdrawals.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        Ok(withdrawals)
    }

    pub async fn balance(&self, user: UserId) -> Result<Balance, LoyaltyError> {
        let _shared = self.guard.read().await;
        Ok(self.ledger_op(|| self.ledger.balance(user)).await?)
    }
}
