//! In-process implementation of the storage collaborator.
//!
//! Semantics mirror the PostgreSQL store closely enough to exercise the
//! ledger's concurrency and rollback behavior:
//! - every account row has its own async mutex, held by a unit of work from
//!   `lock_accounts` until commit, rollback or drop
//! - writes are staged inside the unit and applied in one step at commit
//! - entry references are unique across committed and staged entries
//!
//! Faults can be injected to drive failure paths in tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    ACCOUNT_NUMBER_CONSTRAINT, ENTRY_REFERENCE_CONSTRAINT, LedgerStore, StoreError, UnitOfWork,
};
use crate::models::account::{Account, AccountStatus, NewAccount};
use crate::models::entry::{LedgerEntry, NewLedgerEntry};

#[derive(Debug, Clone)]
struct AccountRow {
    account: Account,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Tables {
    accounts: BTreeMap<i64, AccountRow>,
    entries: Vec<LedgerEntry>,
    next_account_id: i64,
}

#[derive(Debug, Default)]
struct Faults {
    failing_reference_suffix: Option<String>,
    duplicate_references: u32,
    failing_commits: u32,
}

#[derive(Debug, Default)]
struct Inner {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
    faults: Mutex<Faults>,
    next_entry_id: AtomicI64,
    units_begun: AtomicU64,
}

impl Inner {
    async fn row_lock(&self, account_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.row_locks.lock().await;
        locks.entry(account_id).or_default().clone()
    }
}

/// Ledger store that keeps every table in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    inner: Arc<Inner>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of units of work opened so far.
    pub fn units_begun(&self) -> u64 {
        self.inner.units_begun.load(Ordering::SeqCst)
    }

    /// Make every entry insert whose reference ends with `suffix` fail.
    pub async fn fail_entry_inserts_ending_with(&self, suffix: &str) {
        self.inner.faults.lock().await.failing_reference_suffix = Some(suffix.to_string());
    }

    /// Report the next `times` entry inserts as reference collisions.
    pub async fn report_duplicate_references(&self, times: u32) {
        self.inner.faults.lock().await.duplicate_references = times;
    }

    /// Make the next `times` commits fail without applying anything.
    pub async fn fail_commits(&self, times: u32) {
        self.inner.faults.lock().await.failing_commits = times;
    }

    pub async fn clear_faults(&self) {
        *self.inner.faults.lock().await = Faults::default();
    }

    /// Every committed entry, in commit order.
    pub async fn all_entries(&self) -> Vec<LedgerEntry> {
        self.inner.tables.lock().await.entries.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type Unit = MemoryUnitOfWork;

    async fn begin(&self) -> Result<MemoryUnitOfWork, StoreError> {
        self.inner.units_begun.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryUnitOfWork {
            inner: Arc::clone(&self.inner),
            held: HashMap::new(),
            snapshots: HashMap::new(),
            staged_entries: Vec::new(),
            deleted: Vec::new(),
        })
    }

    async fn find_account(&self, account_id: i64) -> Result<Option<Account>, StoreError> {
        let tables = self.inner.tables.lock().await;
        Ok(tables
            .accounts
            .get(&account_id)
            .filter(|row| row.deleted_at.is_none())
            .map(|row| row.account.clone()))
    }

    async fn list_accounts(&self, user_id: i64) -> Result<Vec<Account>, StoreError> {
        let tables = self.inner.tables.lock().await;
        let mut accounts: Vec<Account> = tables
            .accounts
            .values()
            .filter(|row| row.deleted_at.is_none() && row.account.user_id == user_id)
            .map(|row| row.account.clone())
            .collect();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(accounts)
    }

    async fn insert_account(&self, new: &NewAccount) -> Result<Account, StoreError> {
        let mut tables = self.inner.tables.lock().await;
        if tables
            .accounts
            .values()
            .any(|row| row.account.account_number == new.account_number)
        {
            return Err(StoreError::UniqueViolation(ACCOUNT_NUMBER_CONSTRAINT.to_string()));
        }

        tables.next_account_id += 1;
        let now = Utc::now();
        let account = Account {
            id: tables.next_account_id,
            user_id: new.user_id,
            account_number: new.account_number.clone(),
            account_type: new.account_type,
            balance_cents: 0,
            currency: new.currency.clone(),
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        };
        tables.accounts.insert(
            account.id,
            AccountRow {
                account: account.clone(),
                deleted_at: None,
            },
        );
        Ok(account)
    }

    async fn find_entry(&self, entry_id: i64) -> Result<Option<LedgerEntry>, StoreError> {
        let tables = self.inner.tables.lock().await;
        Ok(tables.entries.iter().find(|e| e.id == entry_id).cloned())
    }

    async fn list_entries(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let tables = self.inner.tables.lock().await;
        let skip = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let take = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(tables
            .entries
            .iter()
            .rev()
            .filter(|e| e.account_id == account_id)
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }

    async fn list_user_entries(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let tables = self.inner.tables.lock().await;
        let skip = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let take = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        let owned = |account_id: i64| {
            tables
                .accounts
                .get(&account_id)
                .is_some_and(|row| row.deleted_at.is_none() && row.account.user_id == user_id)
        };
        Ok(tables
            .entries
            .iter()
            .rev()
            .filter(|e| owned(e.account_id))
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }
}

/// A unit of work over the in-memory tables.
///
/// Holds the row locks it acquired and the writes it staged. Nothing is
/// visible to other units until `commit`.
pub struct MemoryUnitOfWork {
    inner: Arc<Inner>,
    held: HashMap<i64, OwnedMutexGuard<()>>,
    /// Locked rows including this unit's staged balance/status changes
    snapshots: HashMap<i64, Account>,
    staged_entries: Vec<LedgerEntry>,
    deleted: Vec<i64>,
}

impl MemoryUnitOfWork {
    fn locked_snapshot(&mut self, account_id: i64) -> Result<&mut Account, StoreError> {
        self.snapshots.get_mut(&account_id).ok_or_else(|| {
            StoreError::Unavailable(format!("account {account_id} is not locked by this unit"))
        })
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_accounts(&mut self, account_ids: &[i64]) -> Result<Vec<Account>, StoreError> {
        let mut locked = Vec::with_capacity(account_ids.len());
        for &account_id in account_ids {
            if !self.held.contains_key(&account_id) {
                let exists = self.inner.tables.lock().await.accounts.contains_key(&account_id);
                if !exists {
                    continue;
                }
                let guard = self.inner.row_lock(account_id).await.lock_owned().await;
                self.held.insert(account_id, guard);

                // Read after the lock is held so the snapshot is current
                let tables = self.inner.tables.lock().await;
                if let Some(row) = tables.accounts.get(&account_id) {
                    if row.deleted_at.is_none() {
                        self.snapshots.insert(account_id, row.account.clone());
                    }
                }
            }
            if let Some(account) = self.snapshots.get(&account_id) {
                if !self.deleted.contains(&account_id) {
                    locked.push(account.clone());
                }
            }
        }
        Ok(locked)
    }

    async fn insert_entry(&mut self, entry: &NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        {
            let mut faults = self.inner.faults.lock().await;
            if faults.duplicate_references > 0 {
                faults.duplicate_references -= 1;
                return Err(StoreError::UniqueViolation(ENTRY_REFERENCE_CONSTRAINT.to_string()));
            }
            if let Some(suffix) = &faults.failing_reference_suffix {
                if entry.reference.ends_with(suffix.as_str()) {
                    return Err(StoreError::Unavailable(format!(
                        "injected insert failure for {}",
                        entry.reference
                    )));
                }
            }
        }

        let taken = self.staged_entries.iter().any(|e| e.reference == entry.reference)
            || self
                .inner
                .tables
                .lock()
                .await
                .entries
                .iter()
                .any(|e| e.reference == entry.reference);
        if taken {
            return Err(StoreError::UniqueViolation(ENTRY_REFERENCE_CONSTRAINT.to_string()));
        }

        let stored = LedgerEntry {
            id: self.inner.next_entry_id.fetch_add(1, Ordering::SeqCst) + 1,
            account_id: entry.account_id,
            kind: entry.kind,
            amount_cents: entry.amount_cents,
            currency: entry.currency.clone(),
            description: entry.description.clone(),
            reference: entry.reference.clone(),
            status: entry.status,
            counter_account_id: entry.counter_account_id,
            processed_at: entry.processed_at,
            created_at: Utc::now(),
        };
        self.staged_entries.push(stored.clone());
        Ok(stored)
    }

    async fn update_balance(
        &mut self,
        account_id: i64,
        balance_cents: i64,
    ) -> Result<(), StoreError> {
        if balance_cents < 0 {
            return Err(StoreError::Unavailable(format!(
                "balance of account {account_id} would become negative"
            )));
        }
        let account = self.locked_snapshot(account_id)?;
        account.balance_cents = balance_cents;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn update_status(
        &mut self,
        account_id: i64,
        status: AccountStatus,
    ) -> Result<(), StoreError> {
        let account = self.locked_snapshot(account_id)?;
        account.status = status;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn soft_delete_account(&mut self, account_id: i64) -> Result<(), StoreError> {
        self.locked_snapshot(account_id)?;
        self.deleted.push(account_id);
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        {
            let mut faults = self.inner.faults.lock().await;
            if faults.failing_commits > 0 {
                faults.failing_commits -= 1;
                return Err(StoreError::Unavailable("injected commit failure".to_string()));
            }
        }

        let mut tables = self.inner.tables.lock().await;
        for entry in &self.staged_entries {
            if tables.entries.iter().any(|e| e.reference == entry.reference) {
                return Err(StoreError::UniqueViolation(ENTRY_REFERENCE_CONSTRAINT.to_string()));
            }
        }

        let now = Utc::now();
        for (account_id, snapshot) in &self.snapshots {
            if let Some(row) = tables.accounts.get_mut(account_id) {
                row.account = snapshot.clone();
                if self.deleted.contains(account_id) {
                    row.deleted_at = Some(now);
                }
            }
        }
        tables.entries.extend(self.staged_entries.iter().cloned());
        // Row locks in `self.held` are released when `self` drops
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
