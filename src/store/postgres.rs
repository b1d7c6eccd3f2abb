//! PostgreSQL implementation of the storage collaborator.
//!
//! Each unit of work wraps one `sqlx::Transaction`. Row locks are taken with
//! `SELECT ... FOR UPDATE` and released when the transaction ends, so every
//! read-modify-write on an account balance is serialized by the database.
//! Lock waits are bounded by the session `lock_timeout` configured in
//! `db::create_pool`.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use super::{LedgerStore, StoreError, UnitOfWork};
use crate::db::DbPool;
use crate::models::account::{Account, AccountStatus, NewAccount};
use crate::models::entry::{LedgerEntry, NewLedgerEntry};

/// SQLSTATE raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

const ACCOUNT_COLUMNS: &str = "id, user_id, account_number, account_type, balance_cents, \
     currency, status, created_at, updated_at";

const ENTRY_COLUMNS: &str = "id, account_id, kind, amount_cents, currency, description, \
     reference, status, counter_account_id, processed_at, created_at";

/// Classify a sqlx error into the store taxonomy.
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let constraint = db_err.constraint().unwrap_or_default().to_string();
            return StoreError::UniqueViolation(constraint);
        }
        if db_err.code().as_deref() == Some(LOCK_NOT_AVAILABLE) {
            return StoreError::LockTimeout;
        }
    }
    StoreError::Database(err)
}

/// Ledger store backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: DbPool,
}

impl PgLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Unit = PgUnitOfWork;

    async fn begin(&self) -> Result<PgUnitOfWork, StoreError> {
        let tx = self.pool.begin().await.map_err(classify)?;
        Ok(PgUnitOfWork { tx })
    }

    async fn find_account(&self, account_id: i64) -> Result<Option<Account>, StoreError> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)
    }

    async fn list_accounts(&self, user_id: i64) -> Result<Vec<Account>, StoreError> {
        sqlx::query_as::<_, Account>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM accounts
            WHERE user_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn insert_account(&self, account: &NewAccount) -> Result<Account, StoreError> {
        sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO accounts (user_id, account_number, account_type, currency, balance_cents, status)
            VALUES ($1, $2, $3, $4, 0, 'active')
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(account.user_id)
        .bind(&account.account_number)
        .bind(account.account_type.as_str())
        .bind(&account.currency)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    async fn find_entry(&self, entry_id: i64) -> Result<Option<LedgerEntry>, StoreError> {
        sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = $1"
        ))
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)
    }

    async fn list_entries(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        sqlx::query_as::<_, LedgerEntry>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries
            WHERE account_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn list_user_entries(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        sqlx::query_as::<_, LedgerEntry>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries
            WHERE account_id IN (
                SELECT id FROM accounts WHERE user_id = $1 AND deleted_at IS NULL
            )
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }
}

/// A unit of work bound to one open database transaction.
///
/// Dropping it without committing rolls the transaction back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_accounts(&mut self, account_ids: &[i64]) -> Result<Vec<Account>, StoreError> {
        let mut locked = Vec::with_capacity(account_ids.len());
        // One statement per row so the lock order is exactly the caller's order
        for &account_id in account_ids {
            let account = sqlx::query_as::<_, Account>(&format!(
                r#"
                SELECT {ACCOUNT_COLUMNS}
                FROM accounts
                WHERE id = $1 AND deleted_at IS NULL
                FOR UPDATE
                "#
            ))
            .bind(account_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(classify)?;

            if let Some(account) = account {
                locked.push(account);
            }
        }
        Ok(locked)
    }

    async fn insert_entry(&mut self, entry: &NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        sqlx::query_as::<_, LedgerEntry>(&format!(
            r#"
            INSERT INTO ledger_entries (
                account_id,
                kind,
                amount_cents,
                currency,
                description,
                reference,
                status,
                counter_account_id,
                processed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(entry.account_id)
        .bind(entry.kind.as_str())
        .bind(entry.amount_cents)
        .bind(&entry.currency)
        .bind(&entry.description)
        .bind(&entry.reference)
        .bind(entry.status.as_str())
        .bind(entry.counter_account_id)
        .bind(entry.processed_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(classify)
    }

    async fn update_balance(
        &mut self,
        account_id: i64,
        balance_cents: i64,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE accounts SET balance_cents = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(balance_cents)
        .bind(account_id)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?
        .rows_affected();

        if updated != 1 {
            return Err(StoreError::Unavailable(format!(
                "balance update touched {updated} rows for account {account_id}"
            )));
        }
        Ok(())
    }

    async fn update_status(
        &mut self,
        account_id: i64,
        status: AccountStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE accounts SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(account_id)
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn soft_delete_account(&mut self, account_id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE accounts SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(account_id)
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(classify)
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(classify)
    }
}
