//! Order–accrual reconciliation
//!
//! - [`ReconcileEngine`] runs one round: pull unresolved orders, fan out
//!   lookups, commit every result in one ledger transaction or nothing
//! - [`PollScheduler`] drives rounds on a fixed interval and honors
//!   rate-limit pauses

pub mod engine;
pub mod error;
pub mod scheduler;

pub use engine::{ReconcileEngine, RoundReport};
pub use error::ReconcileError;
pub use scheduler::{PollConfig, PollScheduler, SchedulerState};
