//! Credit engine: append-only ledger with a reconciled cached balance.
//! Grants land as a lot (a uuid `lot_id`) with its own expiry; spends
//! are resolved FIFO against unexpired lots, oldest expiry first.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::CreditAccount;
use crate::utils::CoreError;

#[derive(Clone)]
pub struct CreditEngine {
    pool: SqlitePool,
}

impl CreditEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_or_create_account(&self, user_id: &str) -> Result<CreditAccount, CoreError> {
        let mut tx = self.pool.begin().await?;
        let account = get_or_create_account_tx(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(account)
    }

    /// Recompute the cached balance as the sum of unexpired ledger
    /// entries and persist it. The ledger is authoritative; this is a
    /// reconciliation of the cache, not a second source of truth.
    pub async fn recalculate_effective_balance(&self, user_id: &str, now: DateTime<Utc>) -> Result<i64, CoreError> {
        let mut tx = self.pool.begin().await?;
        let balance = recalculate_effective_balance_tx(&mut tx, user_id, now).await?;
        tx.commit().await?;
        Ok(balance)
    }

    /// Grant this user's monthly plan credits as a fresh lot expiring at
    /// the end of their current billing period. Idempotent per `source`:
    /// a repeated grant for the same billing period is a no-op.
    pub async fn grant_monthly(
        &self,
        user_id: &str,
        monthly_credits: i64,
        current_period_end: DateTime<Utc>,
        source: &str,
    ) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await?;
        let lot_id = Uuid::new_v4().to_string();

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO credit_ledger (user_id, lot_id, event_type, delta, source, job_id, expires_at) \
             VALUES (?, ?, 'grant_monthly', ?, ?, NULL, ?)",
        )
        .bind(user_id)
        .bind(&lot_id)
        .bind(monthly_credits)
        .bind(source)
        .bind(current_period_end)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() > 0 {
            let account = get_or_create_account_tx(&mut tx, user_id).await?;
            let new_balance = account.balance + monthly_credits;
            set_balance_tx(&mut tx, user_id, new_balance).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Grant a fixed top-up, expiring after the configured number of
    /// days from now. Idempotent per `source`.
    pub async fn grant_topup(&self, user_id: &str, credits: i64, expiry_days: i64, source: &str) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await?;
        let lot_id = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + chrono::Duration::days(expiry_days);

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO credit_ledger (user_id, lot_id, event_type, delta, source, job_id, expires_at) \
             VALUES (?, ?, 'topup', ?, ?, NULL, ?)",
        )
        .bind(user_id)
        .bind(&lot_id)
        .bind(credits)
        .bind(source)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() > 0 {
            let account = get_or_create_account_tx(&mut tx, user_id).await?;
            let new_balance = account.balance + credits;
            set_balance_tx(&mut tx, user_id, new_balance).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Spend `amount` credits against `user_id`'s unexpired lots, oldest
    /// expiry first, recording one ledger entry per lot touched.
    /// Returns `CoreError::InsufficientCredits` and writes nothing if the
    /// effective balance can't cover the amount.
    pub async fn spend(&self, user_id: &str, amount: i64, job_id: i64, source: &str) -> Result<(), CoreError> {
        if amount <= 0 {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let effective = recalculate_effective_balance_tx(&mut tx, user_id, now).await?;
        if effective < amount {
            return Err(CoreError::InsufficientCredits);
        }

        let lots: Vec<(String, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT lot_id, expires_at FROM credit_ledger \
             WHERE user_id = ? AND delta > 0 AND lot_id IS NOT NULL \
             AND (expires_at IS NULL OR expires_at > ?) \
             ORDER BY expires_at IS NULL, expires_at ASC, created_at ASC, id ASC",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        let mut remaining = amount;
        for (lot_id, expires_at) in lots {
            if remaining <= 0 {
                break;
            }

            let lot_total: (i64,) = sqlx::query_as(
                "SELECT COALESCE(SUM(delta), 0) FROM credit_ledger WHERE user_id = ? AND lot_id = ?",
            )
            .bind(user_id)
            .bind(&lot_id)
            .fetch_one(&mut *tx)
            .await?;

            if lot_total.0 <= 0 {
                continue;
            }

            let use_amount = lot_total.0.min(remaining);
            sqlx::query(
                "INSERT INTO credit_ledger (user_id, lot_id, event_type, delta, source, job_id, expires_at) \
                 VALUES (?, ?, 'spend', ?, ?, ?, ?)",
            )
            .bind(user_id)
            .bind(&lot_id)
            .bind(-use_amount)
            .bind(source)
            .bind(job_id)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;

            remaining -= use_amount;
        }

        if remaining != 0 {
            return Err(CoreError::InsufficientCredits);
        }

        set_balance_tx(&mut tx, user_id, effective - amount).await?;
        tx.commit().await?;
        Ok(())
    }
}

async fn get_or_create_account_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: &str,
) -> Result<CreditAccount, CoreError> {
    if let Some(account) = sqlx::query_as::<_, CreditAccount>("SELECT * FROM credit_accounts WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?
    {
        return Ok(account);
    }

    sqlx::query("INSERT OR IGNORE INTO credit_accounts (user_id, balance) VALUES (?, 0)")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

    let account = sqlx::query_as::<_, CreditAccount>("SELECT * FROM credit_accounts WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(account)
}

async fn set_balance_tx(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, user_id: &str, balance: i64) -> Result<(), CoreError> {
    sqlx::query("UPDATE credit_accounts SET balance = ?, updated_at = CURRENT_TIMESTAMP WHERE user_id = ?")
        .bind(balance)
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn recalculate_effective_balance_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<i64, CoreError> {
    get_or_create_account_tx(tx, user_id).await?;

    let total: (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(delta), 0) FROM credit_ledger \
         WHERE user_id = ? AND (expires_at IS NULL OR expires_at > ?)",
    )
    .bind(user_id)
    .bind(now)
    .fetch_one(&mut **tx)
    .await?;

    set_balance_tx(tx, user_id, total.0).await?;
    Ok(total.0)
}
