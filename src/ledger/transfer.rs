//! Two-sided transfers.
//!
//! Both legs are written in one unit of work:
//!
//! 1. Lock both accounts, lower id first, whichever side is the source
//! 2. Guard the source for an outgoing leg and the destination for an
//!    incoming leg (no ownership check on the destination)
//! 3. Insert the debit leg (`<ref>-OUT`) and the credit leg (`<ref>-IN`)
//!    with one shared processed timestamp
//! 4. Write both balances
//! 5. Commit, or roll back so that neither leg nor either balance changes
//!
//! The fixed lock order means two transfers over the same pair of accounts
//! in opposite directions queue on the same first lock instead of
//! deadlocking.

use chrono::Utc;

use super::entry::new_entry;
use super::error::{GuardError, LedgerError};
use super::guard::{AccountGuard, Action};
use super::transactor::{settle, validate_amount, with_fresh_reference};
use crate::models::entry::{EntryKind, INCOMING_SUFFIX, OUTGOING_SUFFIX, TransferResult};
use crate::store::{LedgerStore, UnitOfWork};

/// Order in which the two accounts of a transfer are locked.
pub fn lock_order(from_account_id: i64, to_account_id: i64) -> [i64; 2] {
    if from_account_id <= to_account_id {
        [from_account_id, to_account_id]
    } else {
        [to_account_id, from_account_id]
    }
}

/// Move `amount_cents` from an account owned by `principal` to any active
/// account.
///
/// # Errors
///
/// - `InvalidAmount`, `SameAccount`: rejected before any unit begins
/// - `AccountNotFound`: the source does not exist
/// - `Guard(DestinationNotFound)`: the destination does not exist
/// - `Guard(NotOwned)`: the source belongs to someone else
/// - `Guard(Inactive { side, .. })`: either side is not active
/// - `Guard(InsufficientFunds)`: the source balance does not cover the amount
/// - `CurrencyMismatch`: the accounts hold different currencies
/// - `ReferenceCollision`, `PersistenceFailed`: see `transactor::apply`
#[tracing::instrument(skip(store, description))]
pub async fn transfer<S: LedgerStore>(
    store: &S,
    principal: i64,
    from_account_id: i64,
    to_account_id: i64,
    amount_cents: i64,
    description: &str,
) -> Result<TransferResult, LedgerError> {
    validate_amount(amount_cents)?;
    if from_account_id == to_account_id {
        return Err(LedgerError::SameAccount);
    }
    let guard = AccountGuard::new(principal);

    let result = with_fresh_reference(|root| async move {
        let mut unit = store.begin().await?;
        let outcome = transfer_in_unit(
            &mut unit,
            &guard,
            from_account_id,
            to_account_id,
            amount_cents,
            description,
            root,
        )
        .await;
        settle(unit, outcome).await
    })
    .await?;

    tracing::info!(
        reference = %result.transfer_reference,
        debit_entry_id = result.debit_entry.id,
        credit_entry_id = result.credit_entry.id,
        "transfer committed"
    );
    Ok(result)
}

async fn transfer_in_unit<U: UnitOfWork>(
    unit: &mut U,
    guard: &AccountGuard,
    from_account_id: i64,
    to_account_id: i64,
    amount_cents: i64,
    description: &str,
    root: String,
) -> Result<TransferResult, LedgerError> {
    let locked = unit
        .lock_accounts(&lock_order(from_account_id, to_account_id))
        .await?;

    let source = locked
        .iter()
        .find(|a| a.id == from_account_id)
        .cloned()
        .ok_or(LedgerError::AccountNotFound(from_account_id))?;
    let destination = locked
        .iter()
        .find(|a| a.id == to_account_id)
        .cloned()
        .ok_or(GuardError::DestinationNotFound(to_account_id))?;

    guard.check_eligible(&source, Action::TransferOut, amount_cents)?;
    guard.check_eligible(&destination, Action::TransferIn, amount_cents)?;

    if source.currency != destination.currency {
        return Err(LedgerError::CurrencyMismatch {
            from: source.currency,
            to: destination.currency,
        });
    }

    let source_balance = source
        .balance_cents
        .checked_sub(amount_cents)
        .ok_or(LedgerError::BalanceOverflow(source.id))?;
    let destination_balance = destination
        .balance_cents
        .checked_add(amount_cents)
        .ok_or(LedgerError::BalanceOverflow(destination.id))?;

    let processed_at = Utc::now();
    let debit_leg = new_entry(
        source.id,
        EntryKind::Debit,
        amount_cents,
        &source.currency,
        description,
        format!("{root}{OUTGOING_SUFFIX}"),
        Some(destination.id),
    )
    .processed_at(processed_at);
    let credit_leg = new_entry(
        destination.id,
        EntryKind::Credit,
        amount_cents,
        &destination.currency,
        description,
        format!("{root}{INCOMING_SUFFIX}"),
        Some(source.id),
    )
    .processed_at(processed_at);

    let debit_entry = unit.insert_entry(&debit_leg).await?;
    let credit_entry = unit.insert_entry(&credit_leg).await?;
    unit.update_balance(source.id, source_balance).await?;
    unit.update_balance(destination.id, destination_balance).await?;

    Ok(TransferResult {
        transfer_reference: root,
        debit_entry,
        credit_entry,
        amount_cents,
        from_account_id: source.id,
        to_account_id: destination.id,
        recipient_user_id: destination.user_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_order_is_ascending_regardless_of_direction() {
        assert_eq!(lock_order(3, 8), [3, 8]);
        assert_eq!(lock_order(8, 3), [3, 8]);
    }
}
