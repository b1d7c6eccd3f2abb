//! Account lifecycle: opening, listing, status changes and closing.
//!
//! Status changes and closing go through a unit of work holding the account
//! row lock, so they serialize with in-flight ledger mutations instead of
//! racing them.

use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::ledger::transactor::settle;
use crate::ledger::{GuardError, LedgerError};
use crate::models::account::{Account, AccountStatus, AccountType, NewAccount};
use crate::store::{ACCOUNT_NUMBER_CONSTRAINT, LedgerStore, UnitOfWork};

/// Generate an account number: type prefix followed by 12 hex characters.
pub fn generate_account_number(account_type: AccountType) -> Result<String, LedgerError> {
    let mut bytes = [0u8; 6];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| LedgerError::EntropyUnavailable(e.to_string()))?;
    Ok(format!("{}{}", account_type.number_prefix(), hex::encode(bytes)))
}

/// Normalize and validate an ISO 4217 style currency code.
pub fn normalize_currency(currency: &str) -> Result<String, LedgerError> {
    let code = currency.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(code.to_string())
    } else {
        Err(LedgerError::InvalidCurrency(currency.to_string()))
    }
}

/// Open a new account for `user_id` with zero balance and `active` status.
///
/// One retry with a fresh number if the generated account number is taken.
#[tracing::instrument(skip(store))]
pub async fn open_account<S: LedgerStore>(
    store: &S,
    user_id: i64,
    account_type: AccountType,
    currency: &str,
) -> Result<Account, LedgerError> {
    let currency = normalize_currency(currency)?;

    let mut retried = false;
    loop {
        let new_account = NewAccount {
            user_id,
            account_number: generate_account_number(account_type)?,
            account_type,
            currency: currency.clone(),
        };
        match store.insert_account(&new_account).await {
            Ok(account) => {
                tracing::info!(account_id = account.id, "account opened");
                return Ok(account);
            }
            Err(e) if !retried && e.is_unique_violation_of(ACCOUNT_NUMBER_CONSTRAINT) => {
                tracing::warn!("account number collision, retrying");
                retried = true;
            }
            Err(e) => return Err(LedgerError::PersistenceFailed(e)),
        }
    }
}

pub async fn list_accounts<S: LedgerStore>(
    store: &S,
    user_id: i64,
) -> Result<Vec<Account>, LedgerError> {
    Ok(store.list_accounts(user_id).await?)
}

/// Account owned by `user_id`. Accounts of other users are reported as not
/// found so their existence is not revealed.
pub async fn find_owned_account<S: LedgerStore>(
    store: &S,
    user_id: i64,
    account_id: i64,
) -> Result<Account, LedgerError> {
    store
        .find_account(account_id)
        .await?
        .filter(|account| account.user_id == user_id)
        .ok_or(LedgerError::AccountNotFound(account_id))
}

/// Change the status of an account owned by `user_id`.
#[tracing::instrument(skip(store))]
pub async fn set_status<S: LedgerStore>(
    store: &S,
    user_id: i64,
    account_id: i64,
    status: AccountStatus,
) -> Result<Account, LedgerError> {
    let mut unit = store.begin().await?;
    let outcome = async {
        let mut account = lock_owned(&mut unit, user_id, account_id).await?;
        unit.update_status(account_id, status).await?;
        account.status = status;
        Ok::<_, LedgerError>(account)
    }
    .await;
    let account = settle(unit, outcome).await?;

    tracing::info!(%status, "account status changed");
    Ok(account)
}

/// Soft-delete an account owned by `user_id`. Only empty accounts can be
/// closed.
#[tracing::instrument(skip(store))]
pub async fn close_account<S: LedgerStore>(
    store: &S,
    user_id: i64,
    account_id: i64,
) -> Result<(), LedgerError> {
    let mut unit = store.begin().await?;
    let outcome = async {
        let account = lock_owned(&mut unit, user_id, account_id).await?;
        if account.balance_cents != 0 {
            return Err(LedgerError::NonZeroBalance(account_id));
        }
        unit.soft_delete_account(account_id).await?;
        Ok::<_, LedgerError>(())
    }
    .await;
    settle(unit, outcome).await?;

    tracing::info!("account closed");
    Ok(())
}

async fn lock_owned<U: UnitOfWork>(
    unit: &mut U,
    user_id: i64,
    account_id: i64,
) -> Result<Account, LedgerError> {
    let account = unit
        .lock_accounts(&[account_id])
        .await?
        .into_iter()
        .next()
        .ok_or(LedgerError::AccountNotFound(account_id))?;
    if account.user_id != user_id {
        return Err(GuardError::NotOwned(account_id).into());
    }
    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryLedgerStore;

    #[test]
    fn account_number_has_type_prefix_and_twelve_hex_chars() {
        let number = generate_account_number(AccountType::Savings).unwrap();
        let body = number.strip_prefix("SAV").unwrap();
        assert_eq!(body.len(), 12);
        assert!(body.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn currency_codes_are_three_uppercase_letters() {
        assert_eq!(normalize_currency(" USD ").unwrap(), "USD");
        assert!(matches!(
            normalize_currency("usd"),
            Err(LedgerError::InvalidCurrency(_))
        ));
        assert!(normalize_currency("EURO").is_err());
    }

    #[tokio::test]
    async fn opened_account_starts_empty_and_active() {
        let store = MemoryLedgerStore::new();
        let account = open_account(&store, 1, AccountType::Checking, "EUR")
            .await
            .unwrap();

        assert_eq!(account.balance_cents, 0);
        assert_eq!(account.status, AccountStatus::Active);
        assert!(account.account_number.starts_with("ACC"));
        assert_eq!(list_accounts(&store, 1).await.unwrap(), vec![account]);
        assert!(list_accounts(&store, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_users_accounts_are_not_found() {
        let store = MemoryLedgerStore::new();
        let account = open_account(&store, 1, AccountType::Checking, "EUR")
            .await
            .unwrap();

        assert!(matches!(
            find_owned_account(&store, 2, account.id).await,
            Err(LedgerError::AccountNotFound(_))
        ));
        assert!(matches!(
            set_status(&store, 2, account.id, AccountStatus::Frozen).await,
            Err(LedgerError::Guard(GuardError::NotOwned(_)))
        ));
    }

    #[tokio::test]
    async fn status_change_is_persisted() {
        let store = MemoryLedgerStore::new();
        let account = open_account(&store, 1, AccountType::Savings, "EUR")
            .await
            .unwrap();

        let frozen = set_status(&store, 1, account.id, AccountStatus::Frozen)
            .await
            .unwrap();
        assert_eq!(frozen.status, AccountStatus::Frozen);
        assert_eq!(
            store.find_account(account.id).await.unwrap().unwrap().status,
            AccountStatus::Frozen
        );
    }
}
