//! Reconciliation round
//!
//! # Round Flow
//!
//! ```text
//! list_unresolved_orders(batch_limit)
//!     → fan out lookups (≤ concurrency_limit in flight)
//!     → Ready results become updates, 429 pauses are tracked (last wins)
//!     → first lookup error aborts: in-flight lookups dropped, nothing committed
//!     → apply_accruals(updates) under the shared balance guard
//! ```

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::ReconcileError;
use crate::accrual::{AccrualReply, AccrualResult, AccrualSource};
use crate::balance_guard::BalanceGuard;
use crate::ledger::{AccrualUpdate, LedgerStore, Order, OrderStatus};
use crate::money::Money;
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownSignal;

/// Outcome of one successful round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// Unresolved orders pulled from the ledger
    pub examined: usize,
    /// Orders actually rewritten by the commit
    pub committed: usize,
    /// Last rate-limit pause observed (zero if none)
    pub pause: Duration,
}

pub struct ReconcileEngine {
    ledger: Arc<dyn LedgerStore>,
    accrual: Arc<dyn AccrualSource>,
    guard: Arc<BalanceGuard>,
    retry: RetryPolicy,
    shutdown: ShutdownSignal,
}

impl ReconcileEngine {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        accrual: Arc<dyn AccrualSource>,
        guard: Arc<BalanceGuard>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            ledger,
            accrual,
            guard,
            retry: RetryPolicy::default(),
            shutdown,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run one reconciliation round.
    pub async fn process_batch(
        &self,
        batch_limit: usize,
        concurrency_limit: usize,
    ) -> Result<RoundReport, ReconcileError> {
        let ledger = &self.ledger;
        let orders = self
            .retry
            .run(
                &self.shutdown,
                |e| ledger.is_retryable(e),
                || ledger.list_unresolved_orders(batch_limit),
            )
            .await?;

        if orders.is_empty() {
            return Ok(RoundReport::default());
        }

        let (updates, pause) = self.lookup_all(&orders, concurrency_limit).await?;

        let committed = if updates.is_empty() {
            0
        } else {
            let _shared = self.guard.read().await;
            self.retry
                .run(
                    &self.shutdown,
                    |e| ledger.is_retryable(e),
                    || ledger.apply_accruals(&updates),
                )
                .await?
        };

        let report = RoundReport {
            examined: orders.len(),
            committed,
            pause,
        };
        info!(
            examined = report.examined,
            committed = report.committed,
            pause_secs = report.pause.as_secs(),
            "Reconciliation round complete"
        );
        Ok(report)
    }

    /// Fan out one lookup per order. Returning drops the stream, which
    /// cancels every lookup still in flight.
    async fn lookup_all(
        &self,
        orders: &[Order],
        concurrency_limit: usize,
    ) -> Result<(Vec<AccrualUpdate>, Duration), ReconcileError> {
        // Lookups own their order and source handle; the round future must be `Send`
        let mut lookups = stream::iter(orders.iter().cloned())
            .map(|order| {
                let accrual = Arc::clone(&self.accrual);
                async move {
                    let reply = accrual.fetch_accrual(&order.number).await;
                    (order, reply)
                }
            })
            .buffer_unordered(concurrency_limit.max(1));

        let mut updates = Vec::with_capacity(orders.len());
        let mut pause = Duration::ZERO;

        loop {
            let next = tokio::select! {
                next = lookups.next() => next,
                _ = self.shutdown.wait() => return Err(ReconcileError::Cancelled),
            };
            let Some((order, reply)) = next else {
                break;
            };

            match reply {
                Ok(AccrualReply::Ready(result)) => {
                    if let Some(update) = Self::to_update(&order, result) {
                        updates.push(update);
                    }
                }
                Ok(AccrualReply::RateLimited(p)) => {
                    debug!(order = %order.number, pause_secs = p.as_secs(), "Rate limited");
                    pause = p;
                }
                Ok(AccrualReply::NotRegistered) => {
                    debug!(order = %order.number, "Not registered with accrual service");
                }
                Ok(AccrualReply::Skipped) => {}
                Err(source) => {
                    warn!(order = %order.number, error = %source, "Lookup failed, aborting round");
                    return Err(ReconcileError::Lookup {
                        order: order.number.to_string(),
                        source,
                        pause,
                    });
                }
            }
        }

        Ok((updates, pause))
    }

    /// Turn a lookup result into a ledger update, dropping regressions.
    fn to_update(order: &Order, result: AccrualResult) -> Option<AccrualUpdate> {
        if result.order != order.number.as_str() {
            warn!(
                requested = %order.number,
                returned = %result.order,
                "Accrual reply for a different order number"
            );
        }

        let status = OrderStatus::from(result.status);
        if !order.status.can_advance_to(status) {
            debug!(
                order = %order.number,
                from = %order.status,
                to = %status,
                "Dropping regressing update"
            );
            return None;
        }

        let amount = match status {
            OrderStatus::Processed => result.accrual,
            _ => Money::ZERO,
        };
        Some(AccrualUpdate {
            number: order.number.clone(),
            status,
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accrual::{AccrualError, AccrualStatus};
    use crate::ledger::{LedgerError, MemoryLedger};
    use crate::order_number::OrderNumber;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    enum Scripted {
        Reply(AccrualReply),
        ServerError,
        Hang,
    }

    /// Accrual source answering from a fixed script
    #[derive(Default)]
    struct ScriptedAccrual {
        script: HashMap<String, Scripted>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedAccrual {
        fn with(mut self, number: &str, reply: Scripted) -> Self {
            self.script.insert(number.to_string(), reply);
            self
        }
    }

    #[async_trait]
    impl AccrualSource for ScriptedAccrual {
        async fn fetch_accrual(
            &self,
            number: &OrderNumber,
        ) -> Result<AccrualReply, AccrualError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;

            let scripted = self
                .script
                .get(number.as_str())
                .cloned()
                .unwrap_or(Scripted::Reply(AccrualReply::NotRegistered));
            let out = match scripted {
                Scripted::Reply(reply) => Ok(reply),
                Scripted::ServerError => Err(AccrualError::Server(StatusCode::INTERNAL_SERVER_ERROR)),
                Scripted::Hang => std::future::pending().await,
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            out
        }
    }

    fn ready(number: &str, status: AccrualStatus, minor: i64) -> Scripted {
        Scripted::Reply(AccrualReply::Ready(AccrualResult {
            order: number.to_string(),
            status,
            accrual: Money::from_minor(minor),
        }))
    }

    async fn seeded(numbers: &[&str]) -> Arc<MemoryLedger> {
        let ledger = Arc::new(MemoryLedger::new());
        for n in numbers {
            ledger
                .add_order(&Order::new(1, OrderNumber::parse(n).unwrap()))
                .await
                .unwrap();
        }
        ledger
    }

    fn engine(ledger: Arc<MemoryLedger>, accrual: Arc<ScriptedAccrual>) -> ReconcileEngine {
        ReconcileEngine::new(
            ledger,
            accrual,
            Arc::new(BalanceGuard::new()),
            ShutdownSignal::new(),
        )
    }

    #[tokio::test]
    async fn test_empty_ledger_is_a_noop() {
        let ledger = Arc::new(MemoryLedger::new());
        let accrual = Arc::new(ScriptedAccrual::default());
        let report = engine(ledger.clone(), accrual.clone())
            .process_batch(100, 30)
            .await
            .unwrap();

        assert_eq!(report, RoundReport::default());
        assert_eq!(accrual.calls.load(Ordering::SeqCst), 0);
        assert_eq!(ledger.apply_calls(), 0);
    }

    #[tokio::test]
    async fn test_commits_processed_and_intermediate_states() {
        let ledger = seeded(&["4561261212345467", "79927398713", "12345678903"]).await;
        let accrual = Arc::new(
            ScriptedAccrual::default()
                .with("4561261212345467", ready("4561261212345467", AccrualStatus::Processed, 50_000))
                .with("79927398713", ready("79927398713", AccrualStatus::Processing, 0))
                .with("12345678903", ready("12345678903", AccrualStatus::Invalid, 999)),
        );

        let report = engine(ledger.clone(), accrual).process_batch(100, 2).await.unwrap();
        assert_eq!(report.examined, 3);
        assert_eq!(report.committed, 3);
        assert_eq!(report.pause, Duration::ZERO);

        let get = |n: &str| {
            let ledger = ledger.clone();
            let n = OrderNumber::parse(n).unwrap();
            async move { ledger.get_order(&n).await.unwrap().unwrap() }
        };
        let processed = get("4561261212345467").await;
        assert_eq!(processed.status, OrderStatus::Processed);
        assert_eq!(processed.accrual, Some(Money::from_minor(50_000)));

        let invalid = get("12345678903").await;
        assert_eq!(invalid.status, OrderStatus::Invalid);
        assert_eq!(invalid.accrual, Some(Money::ZERO));

        assert_eq!(get("79927398713").await.status, OrderStatus::Processing);
        assert_eq!(ledger.balance(1).await.unwrap().current, Money::from_minor(50_000));
    }

    #[tokio::test]
    async fn test_server_error_commits_nothing() {
        let ledger = seeded(&["4561261212345467", "79927398713"]).await;
        let accrual = Arc::new(
            ScriptedAccrual::default()
                .with("4561261212345467", ready("4561261212345467", AccrualStatus::Processed, 50_000))
                .with("79927398713", Scripted::ServerError),
        );

        let err = engine(ledger.clone(), accrual).process_batch(100, 1).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Lookup { .. }));
        assert_eq!(ledger.apply_calls(), 0);
        assert_eq!(ledger.balance(1).await.unwrap().current, Money::ZERO);
    }

    #[tokio::test]
    async fn test_failure_cancels_in_flight_lookups() {
        let ledger = seeded(&["79927398713", "12345678903"]).await;
        let accrual = Arc::new(
            ScriptedAccrual::default()
                .with("79927398713", Scripted::Hang)
                .with("12345678903", Scripted::ServerError),
        );

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            engine(ledger, accrual).process_batch(100, 2),
        )
        .await
        .expect("round must not wait for the hanging lookup");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_concurrency_limit_respected() {
        let numbers = ["4561261212345467", "79927398713", "12345678903", "9278923470", "0"];
        let ledger = seeded(&numbers).await;
        let accrual = Arc::new(ScriptedAccrual::default());

        engine(ledger, accrual.clone()).process_batch(100, 2).await.unwrap();
        assert_eq!(accrual.calls.load(Ordering::SeqCst), 5);
        assert!(accrual.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_rate_limit_pause_reported() {
        let ledger = seeded(&["79927398713", "12345678903"]).await;
        let accrual = Arc::new(
            ScriptedAccrual::default()
                .with("79927398713", Scripted::Reply(AccrualReply::RateLimited(Duration::from_secs(5))))
                .with("12345678903", Scripted::Reply(AccrualReply::Skipped)),
        );

        let report = engine(ledger.clone(), accrual).process_batch(100, 1).await.unwrap();
        assert_eq!(report.pause, Duration::from_secs(5));
        assert_eq!(report.committed, 0);
        assert_eq!(ledger.apply_calls(), 0);
    }

    #[test]
    fn test_regressing_update_dropped() {
        let mut order = Order::new(1, OrderNumber::parse("79927398713").unwrap());
        order.status = OrderStatus::Processing;
        let regress = AccrualResult {
            order: "79927398713".into(),
            status: AccrualStatus::Registered,
            accrual: Money::ZERO,
        };
        // Sideways between intermediate states is allowed
        assert!(ReconcileEngine::to_update(&order, regress).is_some());

        order.status = OrderStatus::Processed;
        let late = AccrualResult {
            order: "79927398713".into(),
            status: AccrualStatus::Processing,
            accrual: Money::ZERO,
        };
        assert!(ReconcileEngine::to_update(&order, late).is_none());
    }

    #[tokio::test]
    async fn test_shutdown_aborts_round() {
        let ledger = seeded(&["79927398713"]).await;
        let accrual = Arc::new(ScriptedAccrual::default().with("79927398713", Scripted::Hang));
        let shutdown = ShutdownSignal::new();
        let engine = ReconcileEngine::new(
            ledger.clone(),
            accrual,
            Arc::new(BalanceGuard::new()),
            shutdown.clone(),
        );

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.request_shutdown();
        });

        let err = engine.process_batch(100, 4).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(ledger.apply_calls(), 0);
    }

    #[tokio::test]
    async fn test_round_runs_on_spawned_task() {
        let ledger = seeded(&["4561261212345467"]).await;
        let accrual = Arc::new(ScriptedAccrual::default().with(
            "4561261212345467",
            ready("4561261212345467", AccrualStatus::Processed, 50_000),
        ));
        let engine = Arc::new(engine(ledger.clone(), accrual));

        let report = tokio::spawn(async move { engine.process_batch(10, 4).await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.committed, 1);
        assert_eq!(ledger.balance(1).await.unwrap().current, Money::from_minor(50_000));
    }

    #[tokio::test]
    async fn test_transient_ledger_faults_retried() {
        let ledger = seeded(&["79927398713"]).await;
        let accrual = Arc::new(ScriptedAccrual::default().with(
            "79927398713",
            ready("79927398713", AccrualStatus::Processed, 1_000),
        ));
        let engine = engine(ledger.clone(), accrual)
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1)));

        ledger.fail_next(2);
        let report = engine.process_batch(10, 1).await.unwrap();
        assert_eq!(report.committed, 1);
        assert_eq!(ledger.balance(1).await.unwrap().current, Money::from_minor(1_000));
    }

    #[tokio::test]
    async fn test_exhausted_ledger_retries_surface() {
        let ledger = seeded(&["79927398713"]).await;
        let accrual = Arc::new(ScriptedAccrual::default());
        let engine = engine(ledger.clone(), accrual.clone())
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1)));

        ledger.fail_next(3);
        let err = engine.process_batch(10, 1).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Ledger(LedgerError::Unavailable(_))));
        assert_eq!(err.pause(), Duration::ZERO);
        assert_eq!(accrual.calls.load(Ordering::SeqCst), 0);
    }
}
