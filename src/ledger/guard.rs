//! Account eligibility checks.
//!
//! The guard is pure validation over a point-in-time account snapshot. The
//! ledger runs it on the snapshot returned by `UnitOfWork::lock_accounts`,
//! inside the same unit of work that performs the mutation, so the checked
//! state cannot change before commit.

use super::error::{GuardError, Side};
use crate::models::account::Account;

/// What the caller intends to do with the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Debit,
    Credit,
    /// Debited side of a transfer
    TransferOut,
    /// Credited side of a transfer; may belong to another user
    TransferIn,
}

impl Action {
    fn side(self) -> Side {
        match self {
            Action::Debit | Action::Credit => Side::Account,
            Action::TransferOut => Side::Source,
            Action::TransferIn => Side::Destination,
        }
    }

    fn requires_ownership(self) -> bool {
        !matches!(self, Action::TransferIn)
    }

    fn moves_funds_out(self) -> bool {
        matches!(self, Action::Debit | Action::TransferOut)
    }
}

/// Eligibility rules evaluated on behalf of one requesting user.
#[derive(Debug, Clone, Copy)]
pub struct AccountGuard {
    principal: i64,
}

impl AccountGuard {
    pub fn new(principal: i64) -> Self {
        Self { principal }
    }

    /// Check that `account` may take part in `action` for `amount_cents`.
    ///
    /// Rules, in order, stopping at the first failure:
    /// 1. the account belongs to the principal (skipped for `TransferIn`)
    /// 2. the account is active
    /// 3. for debits and outgoing legs, the balance covers the amount
    pub fn check_eligible(
        &self,
        account: &Account,
        action: Action,
        amount_cents: i64,
    ) -> Result<(), GuardError> {
        if action.requires_ownership() && account.user_id != self.principal {
            return Err(GuardError::NotOwned(account.id));
        }

        if !account.is_active() {
            return Err(GuardError::Inactive {
                account_id: account.id,
                side: action.side(),
                status: account.status,
            });
        }

        if action.moves_funds_out() && account.balance_cents < amount_cents {
            return Err(GuardError::InsufficientFunds {
                account_id: account.id,
                balance_cents: account.balance_cents,
                amount_cents,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::account::{AccountStatus, AccountType};

    const OWNER: i64 = 7;

    fn account(user_id: i64, status: AccountStatus, balance_cents: i64) -> Account {
        let now = Utc::now();
        Account {
            id: 100,
            user_id,
            account_number: "ACC000000000001".to_string(),
            account_type: AccountType::Checking,
            balance_cents,
            currency: "EUR".to_string(),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn owned_active_funded_account_passes_every_action() {
        let guard = AccountGuard::new(OWNER);
        let acct = account(OWNER, AccountStatus::Active, 500);
        for action in [Action::Debit, Action::Credit, Action::TransferOut, Action::TransferIn] {
            assert_eq!(guard.check_eligible(&acct, action, 500), Ok(()));
        }
    }

    #[test]
    fn ownership_is_checked_first() {
        let guard = AccountGuard::new(OWNER);
        // Frozen and empty too, but ownership wins
        let acct = account(OWNER + 1, AccountStatus::Frozen, 0);
        assert_eq!(
            guard.check_eligible(&acct, Action::Debit, 10),
            Err(GuardError::NotOwned(100))
        );
    }

    #[test]
    fn incoming_leg_skips_ownership_but_not_status() {
        let guard = AccountGuard::new(OWNER);
        let foreign = account(OWNER + 1, AccountStatus::Active, 0);
        assert_eq!(guard.check_eligible(&foreign, Action::TransferIn, 10), Ok(()));

        let closed = account(OWNER + 1, AccountStatus::Closed, 0);
        assert_eq!(
            guard.check_eligible(&closed, Action::TransferIn, 10),
            Err(GuardError::Inactive {
                account_id: 100,
                side: Side::Destination,
                status: AccountStatus::Closed,
            })
        );
    }

    #[test]
    fn inactive_source_is_reported_as_source() {
        let guard = AccountGuard::new(OWNER);
        let acct = account(OWNER, AccountStatus::Frozen, 1_000);
        assert!(matches!(
            guard.check_eligible(&acct, Action::TransferOut, 1),
            Err(GuardError::Inactive { side: Side::Source, .. })
        ));
    }

    #[test]
    fn debits_need_sufficient_funds_and_credits_do_not() {
        let guard = AccountGuard::new(OWNER);
        let acct = account(OWNER, AccountStatus::Active, 99);
        assert_eq!(
            guard.check_eligible(&acct, Action::Debit, 100),
            Err(GuardError::InsufficientFunds {
                account_id: 100,
                balance_cents: 99,
                amount_cents: 100,
            })
        );
        assert!(guard.check_eligible(&acct, Action::TransferOut, 100).is_err());
        assert_eq!(guard.check_eligible(&acct, Action::Credit, 100), Ok(()));
    }
}
