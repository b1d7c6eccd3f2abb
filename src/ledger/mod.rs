//! Ledger core: the only code allowed to mutate account balances.
//!
//! Components, leaf first:
//! - `reference`: collision-resistant transaction references
//! - `guard`: account eligibility rules
//! - `entry`: ledger entry construction
//! - `transactor`: single-account mutations in one unit of work
//! - `transfer`: two-legged transfers in one unit of work
//!
//! The core holds no global state. Every call receives the store it works
//! against, and all coordination between concurrent callers happens through
//! the store's row locks.

pub mod entry;
pub mod error;
pub mod guard;
pub mod reference;
pub mod transactor;
pub mod transfer;

pub use self::error::{GuardError, LedgerError, Side};
pub use self::transfer::transfer;

use crate::models::account::BalanceView;
use crate::models::entry::{EntryKind, LedgerEntry};
use crate::store::LedgerStore;

/// Largest page `account_history` returns.
pub const MAX_HISTORY_PAGE: i64 = 100;

/// Apply a debit or credit to an account. See `transactor::apply`.
pub async fn apply_entry<S: LedgerStore>(
    store: &S,
    principal: i64,
    account_id: i64,
    kind: EntryKind,
    amount_cents: i64,
    description: &str,
) -> Result<LedgerEntry, LedgerError> {
    transactor::apply(store, principal, account_id, kind, amount_cents, description).await
}

/// Current balance of an account. Lock-free read.
pub async fn get_balance<S: LedgerStore>(
    store: &S,
    account_id: i64,
) -> Result<BalanceView, LedgerError> {
    let account = store
        .find_account(account_id)
        .await?
        .ok_or(LedgerError::AccountNotFound(account_id))?;

    Ok(BalanceView {
        account_id: account.id,
        balance_cents: account.balance_cents,
        currency: account.currency,
    })
}

pub async fn find_entry<S: LedgerStore>(
    store: &S,
    entry_id: i64,
) -> Result<LedgerEntry, LedgerError> {
    store
        .find_entry(entry_id)
        .await?
        .ok_or(LedgerError::EntryNotFound(entry_id))
}

/// Entries of one account, newest first. `limit` is clamped to
/// `1..=MAX_HISTORY_PAGE` and a negative `offset` is treated as zero.
pub async fn account_history<S: LedgerStore>(
    store: &S,
    account_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<LedgerEntry>, LedgerError> {
    let limit = limit.clamp(1, MAX_HISTORY_PAGE);
    let offset = offset.max(0);
    Ok(store.list_entries(account_id, limit, offset).await?)
}

/// Entries across every open account of `user_id`, newest first. Paging is
/// clamped like `account_history`.
pub async fn user_history<S: LedgerStore>(
    store: &S,
    user_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<LedgerEntry>, LedgerError> {
    let limit = limit.clamp(1, MAX_HISTORY_PAGE);
    let offset = offset.max(0);
    Ok(store.list_user_entries(user_id, limit, offset).await?)
}

/// Result of recomputing a balance from entry history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceCheck {
    pub account_id: i64,
    pub recorded_cents: i64,
    pub derived_cents: i64,
}

impl BalanceCheck {
    pub fn is_consistent(&self) -> bool {
        self.recorded_cents == self.derived_cents
    }
}

/// Recompute an account's balance from its completed entries and compare it
/// with the denormalized balance field.
///
/// Reads outside any unit of work, so it is only exact while the account is
/// quiescent.
pub async fn verify_balance<S: LedgerStore>(
    store: &S,
    account_id: i64,
) -> Result<BalanceCheck, LedgerError> {
    let account = store
        .find_account(account_id)
        .await?
        .ok_or(LedgerError::AccountNotFound(account_id))?;

    let mut derived_cents: i64 = 0;
    let mut offset = 0;
    loop {
        let page = store
            .list_entries(account_id, MAX_HISTORY_PAGE, offset)
            .await?;
        for entry in &page {
            derived_cents = derived_cents
                .checked_add(entry.signed_amount())
                .ok_or(LedgerError::BalanceOverflow(account_id))?;
        }
        if (page.len() as i64) < MAX_HISTORY_PAGE {
            break;
        }
        offset += MAX_HISTORY_PAGE;
    }

    let check = BalanceCheck {
        account_id,
        recorded_cents: account.balance_cents,
        derived_cents,
    };
    if !check.is_consistent() {
        tracing::error!(
            account_id,
            recorded = check.recorded_cents,
            derived = check.derived_cents,
            "balance does not match entry history"
        );
    }
    Ok(check)
}
