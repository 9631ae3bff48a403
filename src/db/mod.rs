//! Database connection management

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::ledger::PgLedgerStore;

/// Pool size; the scheduler and every HTTP request share it
const MAX_CONNECTIONS: u32 = 50;

/// PostgreSQL database connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!(
            max_connections = MAX_CONNECTIONS,
            "PostgreSQL connection pool established"
        );
        Ok(Self { pool })
    }

    /// Ledger and user store over this pool
    pub fn ledger_store(&self) -> PgLedgerStore {
        PgLedgerStore::new(self.pool.clone())
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close every pooled connection; in-flight queries finish first.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL connection pool closed");
    }
}
