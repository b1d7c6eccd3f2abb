//! Account data models and API request/response types.
//!
//! This module defines:
//! - `Account`: Database entity representing a bank account
//! - `AccountType` / `AccountStatus`: the closed sets stored in text columns
//! - `NewAccount`: insert payload used by the account lifecycle service
//! - `BalanceView`: the read model returned by balance queries
//! - Request/response bodies for the account endpoints

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error returned when a stored or requested enum value is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Kind of bank account. Determines the account number prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Checking,
    Savings,
    Credit,
}

impl AccountType {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountType::Checking => "checking",
            AccountType::Savings => "savings",
            AccountType::Credit => "credit",
        }
    }

    /// Prefix of generated account numbers for this type.
    pub fn number_prefix(self) -> &'static str {
        match self {
            AccountType::Checking => "ACC",
            AccountType::Savings => "SAV",
            AccountType::Credit => "CRD",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checking" => Ok(AccountType::Checking),
            "savings" => Ok(AccountType::Savings),
            "credit" => Ok(AccountType::Credit),
            other => Err(ParseEnumError {
                kind: "account type",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for AccountType {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Lifecycle status of an account.
///
/// Only `Active` accounts accept debits, credits and transfers. Status
/// transitions are driven externally through the update endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Frozen => "frozen",
            AccountStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "frozen" => Ok(AccountStatus::Frozen),
            "closed" => Ok(AccountStatus::Closed),
            other => Err(ParseEnumError {
                kind: "account status",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for AccountStatus {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Represents an account record from the database.
///
/// # Database Table
///
/// Maps to the `accounts` table. Each account:
/// - Belongs to one user (via `user_id`)
/// - Has a balance stored in cents (to avoid floating-point errors)
///
/// # Balance Storage
///
/// `balance_cents` is a denormalized aggregate of the account's completed
/// ledger entries. It is only ever written inside a committed ledger unit of
/// work, never edited directly.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct Account {
    pub id: i64,

    /// Owner of the account, as resolved by the identity collaborator
    pub user_id: i64,

    /// Unique, human-facing account number (e.g. `ACC1f3a9c0b2d4e`)
    pub account_number: String,

    #[sqlx(try_from = "String")]
    pub account_type: AccountType,

    /// Current balance in cents. Must be >= 0 (CHECK constraint).
    pub balance_cents: i64,

    /// Currency code (ISO 4217, 3 letters)
    pub currency: String,

    #[sqlx(try_from = "String")]
    pub status: AccountStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Insert payload for a new account. Balance always starts at zero and
/// status at `active`.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub user_id: i64,
    pub account_number: String,
    pub account_type: AccountType,
    pub currency: String,
}

/// Point-in-time balance of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceView {
    pub account_id: i64,
    pub balance_cents: i64,
    pub currency: String,
}

/// Request body for opening a new account.
///
/// ```json
/// {
///   "account_type": "savings",
///   "currency": "EUR"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub account_type: AccountType,

    /// Currency code (defaults to "EUR" if not provided)
    #[serde(default = "default_currency")]
    pub currency: String,
}

/// Default currency value when not specified in request.
pub fn default_currency() -> String {
    "EUR".to_string()
}

/// Request body for changing an account's status.
#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    pub status: AccountStatus,
}

/// Response body for account endpoints. Hides the owner id.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: i64,
    pub account_number: String,
    pub account_type: AccountType,
    pub balance_cents: i64,
    pub currency: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            account_number: account.account_number,
            account_type: account.account_type,
            balance_cents: account.balance_cents,
            currency: account.currency,
            status: account.status,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_enums_round_trip_their_column_text() {
        for ty in [AccountType::Checking, AccountType::Savings, AccountType::Credit] {
            assert_eq!(ty.as_str().parse::<AccountType>(), Ok(ty));
        }
        for status in [AccountStatus::Active, AccountStatus::Frozen, AccountStatus::Closed] {
            assert_eq!(AccountStatus::try_from(status.to_string()), Ok(status));
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "suspended".parse::<AccountStatus>().unwrap_err();
        assert_eq!(err.kind, "account status");
        assert_eq!(err.value, "suspended");
    }

    #[test]
    fn number_prefix_follows_account_type() {
        assert_eq!(AccountType::Checking.number_prefix(), "ACC");
        assert_eq!(AccountType::Savings.number_prefix(), "SAV");
        assert_eq!(AccountType::Credit.number_prefix(), "CRD");
    }
}
