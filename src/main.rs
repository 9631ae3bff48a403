//! Loyalty Ledger service
//!
//! ```text
//! ┌───────────┐    ┌─────────────────┐
//! │  Gateway  │───▶│ LoyaltyService  │──┐
//! │  (axum)   │    └─────────────────┘  │   ┌───────────────┐
//! └───────────┘             │ guard     ├──▶│ PgLedgerStore │
//! ┌───────────┐    ┌─────────────────┐  │   └───────────────┘
//! │ Scheduler │───▶│ ReconcileEngine │──┘
//! └───────────┘    └─────────────────┘
//!                           │
//!                           ▼
//!                  accrual service (HTTP)
//! ```

use anyhow::{Context, Result};
use std::sync::Arc;

use loyalty_ledger::accrual::HttpAccrualClient;
use loyalty_ledger::config::AppConfig;
use loyalty_ledger::db::Database;
use loyalty_ledger::gateway::{self, state::AppState};
use loyalty_ledger::logging::init_logging;
use loyalty_ledger::user_auth::UserAuthService;
use loyalty_ledger::{
    BalanceGuard, LoyaltyService, PollScheduler, ReconcileEngine, ShutdownSignal,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env).with_context(|| format!("loading config for '{}'", env))?;
    let _log_guard = init_logging(&config);

    tracing::info!(
        env = %env,
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        profile = env!("BUILD_PROFILE"),
        "Loyalty ledger starting"
    );

    let db = Database::connect(&config.postgres_url)
        .await
        .context("connecting to PostgreSQL")?;
    let store = Arc::new(db.ledger_store());
    store.init_schema().await.context("initializing schema")?;

    let shutdown = ShutdownSignal::new();
    let guard = Arc::new(BalanceGuard::new());

    let accrual = HttpAccrualClient::new(&config.accrual.base_url, config.request_timeout())
        .context("building accrual client")?;
    let engine = Arc::new(ReconcileEngine::new(
        store.clone(),
        Arc::new(accrual),
        guard.clone(),
        shutdown.clone(),
    ));
    let scheduler = PollScheduler::new(engine, config.poll_config(), shutdown.clone());
    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    let loyalty = Arc::new(LoyaltyService::new(store.clone(), guard, shutdown.clone()));
    let auth = Arc::new(UserAuthService::new(
        store,
        shutdown.clone(),
        config.auth.jwt_secret.clone(),
        config.token_ttl(),
    ));
    let state = Arc::new(AppState::new(loyalty, auth));
    let addr = config.listen_addr()?;
    let server_task = tokio::spawn(gateway::run_server(addr, state, shutdown.clone()));

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            return;
        }
        tracing::info!("Shutdown signal received");
        signal.request_shutdown();
    });

    // A server that fails to bind must take the process down
    let server_result = server_task.await.context("gateway task panicked")?;
    shutdown.request_shutdown();
    scheduler_task.await.context("scheduler task panicked")?;
    db.close().await;

    server_result.context("gateway failed")?;
    tracing::info!("Loyalty ledger stopped");
    Ok(())
}
