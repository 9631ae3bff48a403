//! In-memory ledger store
//!
//! Same contract as the PostgreSQL store, held behind one mutex. Every
//! operation yields to the scheduler before touching state so concurrent
//! callers interleave the way they would against a real database.
//!
//! Fault injection: [`MemoryLedger::fail_next`] makes the next `n`
//! operations fail with a retryable `Unavailable` error.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::error::LedgerError;
use super::types::{AccrualUpdate, Balance, Order, OrderStatus, Withdrawal};
use super::LedgerStore;
use crate::core_types::UserId;
use crate::money::Money;
use crate::order_number::OrderNumber;
use crate::user_auth::store::{User, UserStore};

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, User>,
    next_user_id: UserId,
    orders: HashMap<OrderNumber, Order>,
    withdrawals: HashMap<OrderNumber, Withdrawal>,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
    pending_faults: AtomicUsize,
    apply_calls: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` operations with `LedgerError::Unavailable`.
    pub fn fail_next(&self, n: usize) {
        self.pending_faults.store(n, Ordering::SeqCst);
    }

    /// Number of `apply_accruals` calls that reached the store.
    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn enter(&self) -> Result<(), LedgerError> {
        tokio::task::yield_now().await;
        let injected = self
            .pending_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(LedgerError::Unavailable("injected fault".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn add_order(&self, order: &Order) -> Result<(), LedgerError> {
        self.enter().await?;
        let mut state = self.lock();
        if state.orders.contains_key(&order.number) {
            return Err(LedgerError::Duplicate(order.number.to_string()));
        }
        state.orders.insert(order.number.clone(), order.clone());
        Ok(())
    }

    async fn get_order(&self, number: &OrderNumber) -> Result<Option<Order>, LedgerError> {
        self.enter().await?;
        Ok(self.lock().orders.get(number).cloned())
    }

    async fn list_orders(&self, owner: UserId) -> Result<Vec<Order>, LedgerError> {
        self.enter().await?;
        Ok(self
            .lock()
            .orders
            .values()
            .filter(|o| o.owner == owner)
            .cloned()
            .collect())
    }

    async fn list_unresolved_orders(&self, limit: usize) -> Result<Vec<Order>, LedgerError> {
        self.enter().await?;
        let mut unresolved: Vec<Order> = self
            .lock()
            .orders
            .values()
            .filter(|o| OrderStatus::UNRESOLVED.contains(&o.status))
            .cloned()
            .collect();
        unresolved.sort_by(|a, b| {
            a.uploaded_at
                .cmp(&b.uploaded_at)
                .then_with(|| a.number.cmp(&b.number))
        });
        unresolved.truncate(limit);
        Ok(unresolved)
    }

    async fn get_withdrawal(
        &self,
        order: &OrderNumber,
    ) -> Result<Option<Withdrawal>, LedgerError> {
        self.enter().await?;
        Ok(self.lock().withdrawals.get(order).cloned())
    }

    async fn list_withdrawals(&self, owner: UserId) -> Result<Vec<Withdrawal>, LedgerError> {
        self.enter().await?;
        Ok(self
            .lock()
            .withdrawals
            .values()
            .filter(|w| w.owner == owner)
            .cloned()
            .collect())
    }

    async fn balance(&self, owner: UserId) -> Result<Balance, LedgerError> {
        self.enter().await?;
        let state = self.lock();
        let accrued: Money = state
            .orders
            .values()
            .filter(|o| o.owner == owner)
            .filter_map(Order::settled_accrual)
            .sum();
        let withdrawn: Money = state
            .withdrawals
            .values()
            .filter(|w| w.owner == owner)
            .map(|w| w.amount)
            .sum();
        Ok(Balance::from_totals(accrued, withdrawn))
    }

    async fn add_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), LedgerError> {
        self.enter().await?;
        let mut state = self.lock();
        if state.withdrawals.contains_key(&withdrawal.order) {
            return Err(LedgerError::Duplicate(withdrawal.order.to_string()));
        }
        state
            .withdrawals
            .insert(withdrawal.order.clone(), withdrawal.clone());
        Ok(())
    }

    async fn apply_accruals(&self, updates: &[AccrualUpdate]) -> Result<usize, LedgerError> {
        self.enter().await?;
        self.apply_calls.fetch_add(1, Ordering::SeqCst);

        // One lock for the whole batch: readers see all updates or none
        let mut state = self.lock();
        let mut applied = 0usize;
        for update in updates {
            if let Some(order) = state.orders.get_mut(&update.number)
                && OrderStatus::UNRESOLVED.contains(&order.status)
            {
                order.status = update.status;
                order.accrual = Some(update.amount);
                applied += 1;
            }
        }
        Ok(applied)
    }

    fn is_retryable(&self, err: &LedgerError) -> bool {
        matches!(err, LedgerError::Unavailable(_))
    }
}

#[async_trait]
impl UserStore for MemoryLedger {
    async fn add_user(&self, login: &str, password_hash: &str) -> Result<User, LedgerError> {
        self.enter().await?;
        let mut state = self.lock();
        if state.users.contains_key(login) {
            return Err(LedgerError::Duplicate(login.to_string()));
        }
        state.next_user_id += 1;
        let user = User {
            id: state.next_user_id,
            login: login.to_string(),
            password_hash: password_hash.to_string(),
        };
        state.users.insert(login.to_string(), user.clone());
        Ok(user)
    }

    async fn get_user_by_login(&self, login: &str) -> Result<Option<User>, LedgerError> {
        self.enter().await?;
        Ok(self.lock().users.get(login).cloned())
    }

    fn is_retryable(&self, err: &LedgerError) -> bool {
        matches!(err, LedgerError::Unavailable(_))
    }
}
