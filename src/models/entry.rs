//! Ledger entry data models and API request/response types.
//!
//! This module defines:
//! - `LedgerEntry`: Database entity representing one balance change
//! - `NewLedgerEntry`: insert payload produced by the entry factory
//! - `TransferResult`: the two legs of a committed transfer
//! - Request types for applying entries and transferring funds

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::ParseEnumError;

/// Suffix of the reference carried by the outgoing leg of a transfer.
pub const OUTGOING_SUFFIX: &str = "-OUT";

/// Suffix of the reference carried by the incoming leg of a transfer.
pub const INCOMING_SUFFIX: &str = "-IN";

/// Kind of ledger entry. The signed effect on the balance is derived from
/// the kind; amounts are always stored positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Debit,
    Credit,
    /// Written by earlier versions of the service for both transfer legs.
    /// Current transfers write `Debit`/`Credit` legs instead.
    Transfer,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Debit => "debit",
            EntryKind::Credit => "credit",
            EntryKind::Transfer => "transfer",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(EntryKind::Debit),
            "credit" => Ok(EntryKind::Credit),
            "transfer" => Ok(EntryKind::Transfer),
            other => Err(ParseEnumError {
                kind: "entry kind",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for EntryKind {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Settlement status of a ledger entry.
///
/// This service settles synchronously, so every entry it writes is
/// `Completed`. The other states exist for rows written by other producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
            EntryStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "completed" => Ok(EntryStatus::Completed),
            "failed" => Ok(EntryStatus::Failed),
            "cancelled" => Ok(EntryStatus::Cancelled),
            other => Err(ParseEnumError {
                kind: "entry status",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for EntryStatus {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Represents a ledger entry record from the database.
///
/// # Database Table
///
/// Maps to the `ledger_entries` table. Each entry:
/// - Belongs to exactly one account (`account_id`)
/// - Stores a positive amount in cents (never floats!)
/// - Has a globally unique `reference`
///
/// Once `status` is `completed` the row is immutable history. Corrections
/// are new entries.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub account_id: i64,

    #[sqlx(try_from = "String")]
    pub kind: EntryKind,

    /// Always positive (CHECK constraint)
    pub amount_cents: i64,

    pub currency: String,
    pub description: String,

    /// `TXN-<32 hex>` for single entries, `TXN-<32 hex>-OUT` / `-IN` for
    /// transfer legs
    pub reference: String,

    #[sqlx(try_from = "String")]
    pub status: EntryStatus,

    /// The other account of a transfer leg; `None` for plain entries
    pub counter_account_id: Option<i64>,

    /// When the entry was settled
    pub processed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Signed effect of this entry on its account balance.
    ///
    /// Entries that are not `completed` have no effect.
    pub fn signed_amount(&self) -> i64 {
        if self.status != EntryStatus::Completed {
            return 0;
        }
        match self.kind {
            EntryKind::Credit => self.amount_cents,
            EntryKind::Debit => -self.amount_cents,
            EntryKind::Transfer if self.reference.ends_with(OUTGOING_SUFFIX) => -self.amount_cents,
            EntryKind::Transfer => self.amount_cents,
        }
    }
}

/// Insert payload for a ledger entry, built by `ledger::entry::new_entry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub account_id: i64,
    pub kind: EntryKind,
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub reference: String,
    pub status: EntryStatus,
    pub counter_account_id: Option<i64>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl NewLedgerEntry {
    /// Stamp the settlement time.
    pub fn processed_at(mut self, at: DateTime<Utc>) -> Self {
        self.processed_at = Some(at);
        self
    }
}

/// Outcome of a committed transfer: both legs, written in one unit of work.
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    /// Shared reference root; the legs carry `-OUT` and `-IN` suffixes
    pub transfer_reference: String,
    pub debit_entry: LedgerEntry,
    pub credit_entry: LedgerEntry,
    pub amount_cents: i64,
    pub from_account_id: i64,
    pub to_account_id: i64,

    /// Owner of the destination account, used to notify the recipient.
    /// Never returned to the caller.
    #[serde(skip)]
    pub recipient_user_id: i64,
}

/// Request to apply a single debit or credit to an account.
///
/// ```json
/// {
///   "account_id": 42,
///   "kind": "credit",
///   "amount_cents": 100000,
///   "description": "Initial deposit"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct EntryRequest {
    pub account_id: i64,
    pub kind: EntryKind,
    pub amount_cents: i64,
    #[serde(default)]
    pub description: String,
}

/// Request to transfer money between accounts.
///
/// The destination may belong to another user.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount_cents: i64,
    #[serde(default)]
    pub description: String,
}

/// Paging parameters for account history.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_history_limit() -> i64 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: EntryKind, reference: &str, status: EntryStatus) -> LedgerEntry {
        LedgerEntry {
            id: 1,
            account_id: 1,
            kind,
            amount_cents: 250,
            currency: "EUR".to_string(),
            description: String::new(),
            reference: reference.to_string(),
            status,
            counter_account_id: None,
            processed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn signed_amount_follows_kind() {
        assert_eq!(entry(EntryKind::Credit, "TXN-a", EntryStatus::Completed).signed_amount(), 250);
        assert_eq!(entry(EntryKind::Debit, "TXN-a", EntryStatus::Completed).signed_amount(), -250);
    }

    #[test]
    fn legacy_transfer_legs_use_reference_suffix() {
        assert_eq!(
            entry(EntryKind::Transfer, "TXN-a-OUT", EntryStatus::Completed).signed_amount(),
            -250
        );
        assert_eq!(
            entry(EntryKind::Transfer, "TXN-a-IN", EntryStatus::Completed).signed_amount(),
            250
        );
    }

    #[test]
    fn unsettled_entries_have_no_effect() {
        assert_eq!(entry(EntryKind::Credit, "TXN-a", EntryStatus::Failed).signed_amount(), 0);
        assert_eq!(entry(EntryKind::Debit, "TXN-a", EntryStatus::Pending).signed_amount(), 0);
    }

    #[test]
    fn kind_parses_from_request_json() {
        let req: EntryRequest =
            serde_json::from_str(r#"{"account_id":7,"kind":"debit","amount_cents":10}"#).unwrap();
        assert_eq!(req.kind, EntryKind::Debit);
        assert!(req.description.is_empty());
    }
}
