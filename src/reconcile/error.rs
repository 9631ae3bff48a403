//! Reconciliation round errors

use std::time::Duration;
use thiserror::Error;

use crate::accrual::AccrualError;
use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Ledger access failed: {0}")]
    Ledger(LedgerError),

    /// A lookup failed; nothing from the round was committed.
    #[error("Accrual lookup for order {order} failed: {source}")]
    Lookup {
        order: String,
        #[source]
        source: AccrualError,
        /// Last rate-limit pause observed before the failure
        pause: Duration,
    },

    #[error("Round cancelled by shutdown")]
    Cancelled,
}

impl ReconcileError {
    /// Rate-limit pause the scheduler should still honor after this error.
    pub fn pause(&self) -> Duration {
        match self {
            ReconcileError::Lookup { pause, .. } => *pause,
            _ => Duration::ZERO,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReconcileError::Cancelled)
    }
}

impl From<LedgerError> for ReconcileError {
    fn from(e: LedgerError) -> Self {
        if e.is_cancelled() {
            ReconcileError::Cancelled
        } else {
            ReconcileError::Ledger(e)
        }
    }
}
