//! Upload → reconcile → balance, with the accrual service mocked over HTTP.

mod common;

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

use common::{MockAccrual, MockReply};
use loyalty_ledger::accrual::HttpAccrualClient;
use loyalty_ledger::ledger::{Order, OrderStatus};
use loyalty_ledger::reconcile::{ReconcileError, SchedulerState};
use loyalty_ledger::{
    BalanceGuard, LedgerStore, LoyaltyService, MemoryLedger, Money, OrderNumber, OrderSubmission,
    PollConfig, PollScheduler, ReconcileEngine, RetryPolicy, ShutdownSignal, Timestamp,
};

struct Harness {
    mock: MockAccrual,
    ledger: Arc<MemoryLedger>,
    loyalty: LoyaltyService,
    engine: Arc<ReconcileEngine>,
    shutdown: ShutdownSignal,
}

async fn harness() -> Harness {
    let mock = MockAccrual::start().await;
    let ledger = Arc::new(MemoryLedger::new());
    let guard = Arc::new(BalanceGuard::new());
    let shutdown = ShutdownSignal::new();
    let retry = RetryPolicy::new(3, Duration::from_millis(10));

    let client = HttpAccrualClient::new(&mock.base_url(), Duration::from_secs(2)).unwrap();
    let engine = ReconcileEngine::new(
        ledger.clone(),
        Arc::new(client),
        guard.clone(),
        shutdown.clone(),
    )
    .with_retry(retry);
    let loyalty =
        LoyaltyService::new(ledger.clone(), guard, shutdown.clone()).with_retry(retry);

    Harness {
        mock,
        ledger,
        loyalty,
        engine: Arc::new(engine),
        shutdown,
    }
}

/// Insert an order uploaded `offset_secs` after a fixed epoch.
async fn seed_order(ledger: &MemoryLedger, owner: i64, number: &str, offset_secs: i64) {
    let mut order = Order::new(owner, OrderNumber::parse(number).unwrap());
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    order.uploaded_at = Timestamp::from_datetime(base + chrono::Duration::seconds(offset_secs));
    ledger.add_order(&order).await.unwrap();
}

#[tokio::test]
async fn test_processed_order_credits_balance() {
    let h = harness().await;
    let number = "4561261212345467";

    assert_eq!(
        h.loyalty.submit_order(1, number).await.unwrap(),
        OrderSubmission::Accepted
    );
    h.mock.script(number, MockReply::processed(number, "500"));

    let report = h.engine.process_batch(100, 30).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.committed, 1);
    assert_eq!(report.pause, Duration::ZERO);

    let orders = h.loyalty.list_orders(1).await.unwrap();
    assert_eq!(orders[0].status, OrderStatus::Processed);
    assert_eq!(orders[0].settled_accrual(), Some(Money::from_minor(50_000)));

    let balance = h.loyalty.balance(1).await.unwrap();
    assert_eq!(balance.current, Money::from_minor(50_000));
    assert_eq!(balance.withdrawn, Money::ZERO);

    // Resolved orders are not polled again
    let report = h.engine.process_batch(100, 30).await.unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(h.mock.requests().len(), 1);
}

#[tokio::test]
async fn test_intermediate_statuses_are_recorded_without_credit() {
    let h = harness().await;
    seed_order(&h.ledger, 1, "79927398713", 0).await;
    seed_order(&h.ledger, 1, "12345678903", 1).await;
    seed_order(&h.ledger, 1, "9278923470", 2).await;
    h.mock
        .script("79927398713", MockReply::status("79927398713", "PROCESSING"));
    h.mock
        .script("12345678903", MockReply::status("12345678903", "INVALID"));
    h.mock.script("9278923470", MockReply::NoContent);

    let report = h.engine.process_batch(100, 30).await.unwrap();
    assert_eq!(report.examined, 3);
    assert_eq!(report.committed, 2);

    let status_of = |number: &str| {
        let ledger = h.ledger.clone();
        let number = OrderNumber::parse(number).unwrap();
        async move { ledger.get_order(&number).await.unwrap().unwrap().status }
    };
    assert_eq!(status_of("79927398713").await, OrderStatus::Processing);
    assert_eq!(status_of("12345678903").await, OrderStatus::Invalid);
    assert_eq!(status_of("9278923470").await, OrderStatus::New);
    assert_eq!(h.loyalty.balance(1).await.unwrap().current, Money::ZERO);

    // INVALID is terminal, the other two stay in the work queue
    let report = h.engine.process_batch(100, 30).await.unwrap();
    assert_eq!(report.examined, 2);
}

#[tokio::test]
async fn test_server_error_commits_nothing() {
    let h = harness().await;
    seed_order(&h.ledger, 1, "79927398713", 0).await;
    seed_order(&h.ledger, 2, "12345678903", 1).await;
    h.mock
        .script("79927398713", MockReply::processed("79927398713", "100"));
    h.mock.script("12345678903", MockReply::Status(500));

    let err = h.engine.process_batch(100, 30).await.unwrap_err();
    match err {
        ReconcileError::Lookup { order, .. } => assert_eq!(order, "12345678903"),
        other => panic!("expected lookup error, got {:?}", other),
    }

    assert_eq!(h.ledger.apply_calls(), 0);
    assert_eq!(h.loyalty.balance(1).await.unwrap().current, Money::ZERO);
    let first = h
        .ledger
        .get_order(&OrderNumber::parse("79927398713").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.status, OrderStatus::New);

    // Recovery on the next round picks both orders up again
    h.mock
        .script("12345678903", MockReply::processed("12345678903", "20.5"));
    let report = h.engine.process_batch(100, 30).await.unwrap();
    assert_eq!(report.committed, 2);
    assert_eq!(h.loyalty.balance(1).await.unwrap().current, Money::from_minor(10_000));
    assert_eq!(h.loyalty.balance(2).await.unwrap().current, Money::from_minor(2_050));
}

#[tokio::test]
async fn test_last_rate_limit_pause_wins() {
    let h = harness().await;
    seed_order(&h.ledger, 1, "79927398713", 0).await;
    seed_order(&h.ledger, 1, "12345678903", 1).await;
    seed_order(&h.ledger, 1, "9278923470", 2).await;
    h.mock.script("79927398713", MockReply::TooMany(Some("30")));
    h.mock.script("12345678903", MockReply::TooMany(Some("5")));
    h.mock
        .script("9278923470", MockReply::processed("9278923470", "7"));

    // One lookup at a time: replies arrive in upload order
    let report = h.engine.process_batch(100, 1).await.unwrap();
    assert_eq!(report.pause, Duration::from_secs(5));
    assert_eq!(report.committed, 1);
    assert_eq!(h.loyalty.balance(1).await.unwrap().current, Money::from_minor(700));

    let order_seq: Vec<String> = h.mock.requests().into_iter().map(|(n, _)| n).collect();
    assert_eq!(order_seq, ["79927398713", "12345678903", "9278923470"]);
}

#[tokio::test]
async fn test_batch_limit_takes_oldest_first() {
    let h = harness().await;
    seed_order(&h.ledger, 1, "12345678903", 5).await;
    seed_order(&h.ledger, 1, "79927398713", 0).await;

    let report = h.engine.process_batch(1, 30).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(h.mock.requests()[0].0, "79927398713");
}

#[tokio::test]
async fn test_scheduler_drives_rounds_until_shutdown() {
    let h = harness().await;
    let number = "4561261212345467";
    h.loyalty.submit_order(7, number).await.unwrap();
    h.mock.script(number, MockReply::processed(number, "42"));

    let config = PollConfig {
        batch_limit: 10,
        send_limit: 2,
        poll_interval: Duration::from_millis(50),
    };
    let scheduler = Arc::new(PollScheduler::new(
        h.engine.clone(),
        config,
        h.shutdown.clone(),
    ));
    let runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run().await })
    };

    let credited = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if h.loyalty.balance(7).await.unwrap().current == Money::from_minor(4_200) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(credited.is_ok(), "scheduler never committed the accrual");

    h.shutdown.request_shutdown();
    tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .expect("scheduler did not stop")
        .unwrap();
    assert_eq!(scheduler.state(), SchedulerState::ShuttingDown);
}
