//! Ledger error types.
//!
//! `GuardError` covers eligibility failures found by the account guard.
//! `LedgerError` is what every ledger operation returns; it wraps guard
//! failures unchanged and adds validation, collision and persistence
//! failures.

use std::fmt;

use thiserror::Error;

use crate::models::account::AccountStatus;
use crate::models::entry::EntryKind;
use crate::store::{ENTRY_REFERENCE_CONSTRAINT, StoreError};

/// Role an account plays in the operation being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The single account of a debit or credit
    Account,
    /// The debited side of a transfer
    Source,
    /// The credited side of a transfer
    Destination,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Account => "account",
            Side::Source => "source account",
            Side::Destination => "destination account",
        })
    }
}

/// Account eligibility failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("account {0} does not belong to the requesting user")]
    NotOwned(i64),

    #[error("{side} {account_id} is {status}")]
    Inactive {
        account_id: i64,
        side: Side,
        status: AccountStatus,
    },

    #[error(
        "insufficient funds in account {account_id}: balance {balance_cents}, requested {amount_cents}"
    )]
    InsufficientFunds {
        account_id: i64,
        balance_cents: i64,
        amount_cents: i64,
    },

    #[error("destination account {0} not found")]
    DestinationNotFound(i64),
}

/// Errors returned by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("entry kind {0} cannot be applied directly")]
    UnsupportedKind(EntryKind),

    #[error("cannot transfer to the same account")]
    SameAccount,

    #[error("currency mismatch: {from} account cannot pay into {to} account")]
    CurrencyMismatch { from: String, to: String },

    #[error("invalid currency code: {0}")]
    InvalidCurrency(String),

    // ========== Lookup Errors ==========
    #[error("account {0} not found")]
    AccountNotFound(i64),

    #[error("ledger entry {0} not found")]
    EntryNotFound(i64),

    // ========== Eligibility Errors ==========
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error("balance of account {0} would overflow")]
    BalanceOverflow(i64),

    #[error("account {0} still holds a balance and cannot be closed")]
    NonZeroBalance(i64),

    // ========== Infrastructure Errors ==========
    /// The generated reference was already taken, even after one retry.
    #[error("transaction reference collision: {0}")]
    ReferenceCollision(String),

    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    /// Storage failure. The unit of work was rolled back, or, when the
    /// failure happened during commit, its outcome is unknown.
    #[error("persistence failed: {0}")]
    PersistenceFailed(#[source] StoreError),
}

impl LedgerError {
    /// Malformed input, rejected before touching any account.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidAmount(_)
                | LedgerError::UnsupportedKind(_)
                | LedgerError::SameAccount
                | LedgerError::CurrencyMismatch { .. }
                | LedgerError::InvalidCurrency(_)
        )
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        if err.is_unique_violation_of(ENTRY_REFERENCE_CONSTRAINT) {
            return LedgerError::ReferenceCollision(ENTRY_REFERENCE_CONSTRAINT.to_string());
        }
        LedgerError::PersistenceFailed(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_unique_violation_becomes_collision() {
        let err = LedgerError::from(StoreError::UniqueViolation(
            ENTRY_REFERENCE_CONSTRAINT.to_string(),
        ));
        assert!(matches!(err, LedgerError::ReferenceCollision(_)));
    }

    #[test]
    fn other_store_failures_become_persistence_failures() {
        let err = LedgerError::from(StoreError::LockTimeout);
        assert!(matches!(err, LedgerError::PersistenceFailed(StoreError::LockTimeout)));

        let err = LedgerError::from(StoreError::UniqueViolation("accounts_pkey".to_string()));
        assert!(matches!(err, LedgerError::PersistenceFailed(_)));
    }

    #[test]
    fn inactive_message_names_the_side() {
        let err = GuardError::Inactive {
            account_id: 9,
            side: Side::Destination,
            status: AccountStatus::Frozen,
        };
        assert_eq!(err.to_string(), "destination account 9 is frozen");
    }

    #[test]
    fn validation_family() {
        assert!(LedgerError::SameAccount.is_validation());
        assert!(LedgerError::InvalidAmount(0).is_validation());
        assert!(!LedgerError::AccountNotFound(1).is_validation());
        assert!(!LedgerError::Guard(GuardError::NotOwned(1)).is_validation());
    }
}
