//! Balance guard
//!
//! One process-wide reader/writer lock around everything that reads or
//! changes a balance:
//!
//! | Holder                         | Mode      |
//! |--------------------------------|-----------|
//! | accrual commit (reconcile)     | shared    |
//! | balance read                   | shared    |
//! | withdrawal check + insert      | exclusive |
//!
//! Withdrawals are the only operation that can take a balance down, so
//! they are the only writers. Accrual commits only raise balances and may
//! overlap balance reads.

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct BalanceGuard {
    lock: RwLock<()>,
}

impl BalanceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared access: accrual commits and balance reads
    pub async fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().await
    }

    /// Exclusive access: withdrawal creation
    pub async fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().await
    }
}
