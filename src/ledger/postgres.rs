//! PostgreSQL ledger store
//!
//! Amounts are stored as BIGINT minor units; statuses as their uppercase
//! names. Every query goes through the shared `PgPool`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::error::{LedgerError, PG_CONNECTION_EXCEPTION_CLASS};
use super::types::{AccrualUpdate, Balance, Order, OrderStatus, Withdrawal};
use super::LedgerStore;
use crate::core_types::UserId;
use crate::money::{Money, Timestamp};
use crate::order_number::OrderNumber;
use crate::user_auth::store::{User, UserStore};

/// Schema statements, applied in order by [`PgLedgerStore::init_schema`].
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id            BIGSERIAL PRIMARY KEY,
        login         TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        number      TEXT PRIMARY KEY,
        user_id     BIGINT NOT NULL REFERENCES users(id),
        status      TEXT NOT NULL DEFAULT 'NEW',
        accrual     BIGINT DEFAULT 0,
        uploaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_orders_user ON orders (user_id)",
    r#"
    CREATE INDEX IF NOT EXISTS idx_orders_unresolved ON orders (uploaded_at)
        WHERE status IN ('NEW', 'PROCESSING', 'REGISTERED')
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS withdrawals (
        order_number TEXT PRIMARY KEY,
        user_id      BIGINT NOT NULL REFERENCES users(id),
        amount       BIGINT NOT NULL CHECK (amount > 0),
        processed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_withdrawals_user ON withdrawals (user_id)",
];

/// Bound as `TEXT[]` for `status = ANY(..)` filters
fn unresolved_statuses() -> Vec<&'static str> {
    OrderStatus::UNRESOLVED.iter().map(OrderStatus::as_str).collect()
}

/// Ledger and user persistence backed by PostgreSQL
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn init_schema(&self) -> Result<(), LedgerError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!(tables = 3, "Ledger schema ready");
        Ok(())
    }

    fn row_to_order(row: &PgRow) -> Result<Order, LedgerError> {
        let number: String = row.try_get("number")?;
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<OrderStatus>()
            .map_err(|e| LedgerError::Corrupt(format!("order {}: {}", number, e)))?;
        let accrual: Option<i64> = row.try_get("accrual")?;
        let uploaded_at: DateTime<Utc> = row.try_get("uploaded_at")?;

        Ok(Order {
            owner: row.try_get("user_id")?,
            number: OrderNumber::from_trusted(number),
            status,
            accrual: accrual.map(Money::from_minor),
            uploaded_at: Timestamp::from_datetime(uploaded_at),
        })
    }

    fn row_to_withdrawal(row: &PgRow) -> Result<Withdrawal, LedgerError> {
        let processed_at: DateTime<Utc> = row.try_get("processed_at")?;
        Ok(Withdrawal {
            owner: row.try_get("user_id")?,
            order: OrderNumber::from_trusted(row.try_get("order_number")?),
            amount: Money::from_minor(row.try_get("amount")?),
            processed_at: Timestamp::from_datetime(processed_at),
        })
    }
}

/// Transient PostgreSQL failures: I/O, pool exhaustion, SQLSTATE class 08.
pub fn is_transient(err: &LedgerError) -> bool {
    match err {
        LedgerError::Unavailable(_) => true,
        LedgerError::Database(e) => match e {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
            sqlx::Error::Database(db) => db
                .code()
                .is_some_and(|code| code.starts_with(PG_CONNECTION_EXCEPTION_CLASS)),
            _ => false,
        },
        _ => false,
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn add_order(&self, order: &Order) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO orders (number, user_id, status, accrual, uploaded_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order.number.as_str())
        .bind(order.owner)
        .bind(order.status.as_str())
        .bind(order.accrual.map(Money::minor))
        .bind(order.uploaded_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::from_insert(e, order.number.as_str()))?;
        Ok(())
    }

    async fn get_order(&self, number: &OrderNumber) -> Result<Option<Order>, LedgerError> {
        let row = sqlx::query(
            "SELECT number, user_id, status, accrual, uploaded_at FROM orders WHERE number = $1",
        )
        .bind(number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn list_orders(&self, owner: UserId) -> Result<Vec<Order>, LedgerError> {
        let rows = sqlx::query(
            "SELECT number, user_id, status, accrual, uploaded_at FROM orders WHERE user_id = $1",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_order).collect()
    }

    async fn list_unresolved_orders(&self, limit: usize) -> Result<Vec<Order>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT number, user_id, status, accrual, uploaded_at
            FROM orders
            WHERE status = ANY($1)
            ORDER BY uploaded_at ASC
            LIMIT $2
            "#,
        )
        .bind(unresolved_statuses())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_order).collect()
    }

    async fn get_withdrawal(
        &self,
        order: &OrderNumber,
    ) -> Result<Option<Withdrawal>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT order_number, user_id, amount, processed_at
            FROM withdrawals
            WHERE order_number = $1
            "#,
        )
        .bind(order.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_withdrawal).transpose()
    }

    async fn list_withdrawals(&self, owner: UserId) -> Result<Vec<Withdrawal>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT order_number, user_id, amount, processed_at
            FROM withdrawals
            WHERE user_id = $1
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_withdrawal).collect()
    }

    async fn balance(&self, owner: UserId) -> Result<Balance, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE((SELECT SUM(accrual) FROM orders
                          WHERE user_id = $1 AND status = 'PROCESSED'), 0)::BIGINT AS accrued,
                COALESCE((SELECT SUM(amount) FROM withdrawals
                          WHERE user_id = $1), 0)::BIGINT AS withdrawn
            "#,
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await?;

        let accrued: i64 = row.try_get("accrued")?;
        let withdrawn: i64 = row.try_get("withdrawn")?;
        Ok(Balance::from_totals(
            Money::from_minor(accrued),
            Money::from_minor(withdrawn),
        ))
    }

    async fn add_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO withdrawals (order_number, user_id, amount, processed_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(withdrawal.order.as_str())
        .bind(withdrawal.owner)
        .bind(withdrawal.amount.minor())
        .bind(withdrawal.processed_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::from_insert(e, withdrawal.order.as_str()))?;
        Ok(())
    }

    async fn apply_accruals(&self, updates: &[AccrualUpdate]) -> Result<usize, LedgerError> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut applied = 0usize;
        for update in updates {
            // Terminal rows are excluded so a late reply can never rewrite them
            let result = sqlx::query(
                r#"
                UPDATE orders
                SET status = $1, accrual = $2
                WHERE number = $3 AND status = ANY($4)
                "#,
            )
            .bind(update.status.as_str())
            .bind(update.amount.minor())
            .bind(update.number.as_str())
            .bind(unresolved_statuses())
            .execute(&mut *tx)
            .await?;
            applied += result.rows_affected() as usize;
        }
        tx.commit().await?;

        tracing::debug!(requested = updates.len(), applied, "Accrual updates committed");
        Ok(applied)
    }

    fn is_retryable(&self, err: &LedgerError) -> bool {
        is_transient(err)
    }
}

#[async_trait]
impl UserStore for PgLedgerStore {
    async fn add_user(&self, login: &str, password_hash: &str) -> Result<User, LedgerError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (login, password_hash) VALUES ($1, $2) RETURNING id",
        )
        .bind(login)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LedgerError::from_insert(e, login))?;

        Ok(User {
            id,
            login: login.to_string(),
            password_hash: password_hash.to_string(),
        })
    }

    async fn get_user_by_login(&self, login: &str) -> Result<Option<User>, LedgerError> {
        let row = sqlx::query("SELECT id, login, password_hash FROM users WHERE login = $1")
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(User {
                id: row.try_get("id")?,
                login: row.try_get("login")?,
                password_hash: row.try_get("password_hash")?,
            })),
            None => Ok(None),
        }
    }

    fn is_retryable(&self, err: &LedgerError) -> bool {
        is_transient(err)
    }
}
