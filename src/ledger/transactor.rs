//! Single-account ledger mutations.
//!
//! # Process
//!
//! 1. Open a unit of work and lock the account row
//! 2. Run the account guard against the locked snapshot
//! 3. Compute the new balance
//! 4. Insert the entry and write the balance
//! 5. Commit (or roll back on any error)
//!
//! # Atomicity Guarantees
//!
//! The entry and the balance change become visible together at commit or
//! not at all. A reference collision rolls the whole unit back and the
//! operation is retried once with a fresh reference.

use std::future::Future;

use chrono::Utc;

use super::entry::new_entry;
use super::error::LedgerError;
use super::guard::{AccountGuard, Action};
use super::reference;
use crate::models::entry::{EntryKind, LedgerEntry};
use crate::store::{LedgerStore, UnitOfWork};

/// Reject non-positive amounts.
pub(crate) fn validate_amount(amount_cents: i64) -> Result<(), LedgerError> {
    if amount_cents <= 0 {
        return Err(LedgerError::InvalidAmount(amount_cents));
    }
    Ok(())
}

/// Finish a unit of work: commit on success, roll back on failure.
///
/// The original error is returned after rollback even if the rollback itself
/// fails; the store discards uncommitted work when the connection or unit is
/// dropped.
pub(crate) async fn settle<U, T>(unit: U, outcome: Result<T, LedgerError>) -> Result<T, LedgerError>
where
    U: UnitOfWork,
{
    match outcome {
        Ok(value) => {
            if let Err(e) = unit.commit().await {
                tracing::error!(error = %e, "commit failed, outcome of the unit of work is unknown");
                return Err(LedgerError::PersistenceFailed(e));
            }
            Ok(value)
        }
        Err(err) => {
            if let Err(e) = unit.rollback().await {
                tracing::warn!(error = %e, "rollback failed");
            }
            tracing::warn!(error = %err, "unit of work rolled back");
            Err(err)
        }
    }
}

/// Run `op` with a fresh reference, retrying once with another reference if
/// the first one collides.
pub(crate) async fn with_fresh_reference<T, F, Fut>(mut op: F) -> Result<T, LedgerError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let first = reference::generate()?;
    match op(first.clone()).await {
        Err(LedgerError::ReferenceCollision(_)) => {
            tracing::warn!(reference = %first, "reference collision, retrying with a fresh reference");
            let second = reference::generate()?;
            match op(second.clone()).await {
                Err(LedgerError::ReferenceCollision(_)) => {
                    Err(LedgerError::ReferenceCollision(second))
                }
                other => other,
            }
        }
        other => other,
    }
}

/// Apply one debit or credit to an account owned by `principal`.
///
/// # Errors
///
/// - `InvalidAmount` / `UnsupportedKind`: rejected before any unit begins
/// - `AccountNotFound`: no such (non-deleted) account
/// - `Guard(..)`: not owned, inactive, or insufficient funds at lock time
/// - `BalanceOverflow`: the credit would overflow the balance
/// - `ReferenceCollision`: two consecutive references collided
/// - `PersistenceFailed`: storage failure; the unit was rolled back
#[tracing::instrument(skip(store, description))]
pub async fn apply<S: LedgerStore>(
    store: &S,
    principal: i64,
    account_id: i64,
    kind: EntryKind,
    amount_cents: i64,
    description: &str,
) -> Result<LedgerEntry, LedgerError> {
    validate_amount(amount_cents)?;
    let action = match kind {
        EntryKind::Debit => Action::Debit,
        EntryKind::Credit => Action::Credit,
        EntryKind::Transfer => return Err(LedgerError::UnsupportedKind(kind)),
    };
    let guard = AccountGuard::new(principal);

    let entry = with_fresh_reference(|reference| async move {
        let mut unit = store.begin().await?;
        let outcome = apply_in_unit(
            &mut unit,
            &guard,
            account_id,
            kind,
            action,
            amount_cents,
            description,
            reference,
        )
        .await;
        settle(unit, outcome).await
    })
    .await?;

    tracing::info!(reference = %entry.reference, entry_id = entry.id, "ledger entry committed");
    Ok(entry)
}

#[allow(clippy::too_many_arguments)]
async fn apply_in_unit<U: UnitOfWork>(
    unit: &mut U,
    guard: &AccountGuard,
    account_id: i64,
    kind: EntryKind,
    action: Action,
    amount_cents: i64,
    description: &str,
    reference: String,
) -> Result<LedgerEntry, LedgerError> {
    // Lock first: everything below reads the locked snapshot
    let account = unit
        .lock_accounts(&[account_id])
        .await?
        .into_iter()
        .next()
        .ok_or(LedgerError::AccountNotFound(account_id))?;

    guard.check_eligible(&account, action, amount_cents)?;

    let new_balance = match action {
        Action::Credit => account.balance_cents.checked_add(amount_cents),
        _ => account.balance_cents.checked_sub(amount_cents),
    }
    .ok_or(LedgerError::BalanceOverflow(account.id))?;

    let entry = new_entry(
        account.id,
        kind,
        amount_cents,
        &account.currency,
        description,
        reference,
        None,
    )
    .processed_at(Utc::now());

    let stored = unit.insert_entry(&entry).await?;
    unit.update_balance(account.id, new_balance).await?;

    Ok(stored)
}
