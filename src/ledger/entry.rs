//! Ledger entry construction.

use crate::models::entry::{EntryKind, EntryStatus, NewLedgerEntry};

/// Build a ledger entry for immediate settlement.
///
/// Pure construction: no I/O. The entry is `completed` because this service
/// settles synchronously inside the same unit of work that writes it; the
/// caller stamps `processed_at` when it settles.
pub fn new_entry(
    account_id: i64,
    kind: EntryKind,
    amount_cents: i64,
    currency: &str,
    description: &str,
    reference: String,
    counter_account_id: Option<i64>,
) -> NewLedgerEntry {
    NewLedgerEntry {
        account_id,
        kind,
        amount_cents,
        currency: currency.to_string(),
        description: description.trim().to_string(),
        reference,
        status: EntryStatus::Completed,
        counter_account_id,
        processed_at: None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn builds_completed_unstamped_entry() {
        let entry = new_entry(
            3,
            EntryKind::Debit,
            1_250,
            "EUR",
            "  rent  ",
            "TXN-abc-OUT".to_string(),
            Some(4),
        );

        assert_eq!(entry.account_id, 3);
        assert_eq!(entry.kind, EntryKind::Debit);
        assert_eq!(entry.amount_cents, 1_250);
        assert_eq!(entry.description, "rent");
        assert_eq!(entry.status, EntryStatus::Completed);
        assert_eq!(entry.counter_account_id, Some(4));
        assert!(entry.processed_at.is_none());

        let now = Utc::now();
        assert_eq!(entry.processed_at(now).processed_at, Some(now));
    }
}
