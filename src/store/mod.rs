//! Storage collaborator for the ledger core.
//!
//! The ledger never talks to a database handle directly. Every operation is
//! handed a `LedgerStore` and opens its own `UnitOfWork`: an atomic,
//! isolated sequence of reads and writes that is committed or rolled back as
//! a whole. Row locks taken through `lock_accounts` are held until the unit
//! ends.
//!
//! Two implementations are provided:
//! - `postgres::PgLedgerStore`: production store over a sqlx pool
//! - `memory::MemoryLedgerStore`: in-process store used by tests and local runs

use async_trait::async_trait;

use crate::models::account::{Account, AccountStatus, NewAccount};
use crate::models::entry::{LedgerEntry, NewLedgerEntry};

pub mod memory;
pub mod postgres;

/// Name of the unique constraint on ledger entry references.
pub const ENTRY_REFERENCE_CONSTRAINT: &str = "ledger_entries_reference_key";

/// Name of the unique constraint on account numbers.
pub const ACCOUNT_NUMBER_CONSTRAINT: &str = "accounts_account_number_key";

/// Storage-layer failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write. Holds the constraint name.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A row lock could not be acquired within the configured lock timeout.
    #[error("timed out waiting for a row lock")]
    LockTimeout,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Any other backend failure (connection loss, injected fault, ...).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_unique_violation_of(&self, constraint: &str) -> bool {
        matches!(self, StoreError::UniqueViolation(name) if name == constraint)
    }
}

/// Entry point to the backing store.
///
/// Reads on this trait run outside any unit of work and take no locks; they
/// may observe a slightly stale snapshot.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Unit: UnitOfWork;

    /// Open a new unit of work.
    async fn begin(&self) -> Result<Self::Unit, StoreError>;

    /// Non-deleted account by id.
    async fn find_account(&self, account_id: i64) -> Result<Option<Account>, StoreError>;

    /// Non-deleted accounts owned by `user_id`, newest first.
    async fn list_accounts(&self, user_id: i64) -> Result<Vec<Account>, StoreError>;

    /// Insert an account with zero balance and `active` status.
    async fn insert_account(&self, account: &NewAccount) -> Result<Account, StoreError>;

    async fn find_entry(&self, entry_id: i64) -> Result<Option<LedgerEntry>, StoreError>;

    /// Entries of one account, newest first.
    async fn list_entries(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Entries on every non-deleted account owned by `user_id`, newest first.
    async fn list_user_entries(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError>;
}

/// One atomic, isolated unit of work.
///
/// Dropping a unit without calling `commit` discards every write made
/// through it and releases its locks.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Acquire exclusive row locks on the given accounts, one at a time and
    /// in the order given, and return the locked snapshots in that order.
    /// Missing or deleted accounts are skipped.
    async fn lock_accounts(&mut self, account_ids: &[i64]) -> Result<Vec<Account>, StoreError>;

    async fn insert_entry(&mut self, entry: &NewLedgerEntry) -> Result<LedgerEntry, StoreError>;

    /// Overwrite the balance of a locked account.
    async fn update_balance(&mut self, account_id: i64, balance_cents: i64)
    -> Result<(), StoreError>;

    async fn update_status(
        &mut self,
        account_id: i64,
        status: AccountStatus,
    ) -> Result<(), StoreError>;

    /// Soft-delete a locked account.
    async fn soft_delete_account(&mut self, account_id: i64) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
