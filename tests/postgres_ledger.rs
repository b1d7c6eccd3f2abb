//! End-to-end checks against a real PostgreSQL database.
//!
//! Run with `DATABASE_URL` pointing at a disposable database:
//!
//! ```text
//! cargo test --test postgres_ledger -- --ignored
//! ```

use futures::future::join_all;

use banking_ledger::config::Config;
use banking_ledger::db;
use banking_ledger::ledger::{self, GuardError, LedgerError};
use banking_ledger::models::account::AccountType;
use banking_ledger::models::entry::EntryKind;
use banking_ledger::services::account_service;
use banking_ledger::store::postgres::PgLedgerStore;
use banking_ledger::store::{LedgerStore, StoreError, UnitOfWork};

async fn store() -> PgLedgerStore {
    store_with(&[]).await
}

async fn store_with(extra: &[(&str, &str)]) -> PgLedgerStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let vars = std::iter::once(("DATABASE_URL".to_string(), url))
        .chain(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    let config = Config::from_vars(vars).unwrap();
    let pool = db::create_pool(&config).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    PgLedgerStore::new(pool)
}

/// User id unlikely to clash with earlier runs against the same database.
fn fresh_user() -> i64 {
    i64::from(rand::random::<u32>())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires DATABASE_URL"]
async fn postgres_transfers_are_atomic_and_serialized() {
    let store = store().await;
    let (alice, bob) = (fresh_user(), fresh_user());

    let a = account_service::open_account(&store, alice, AccountType::Checking, "EUR")
        .await
        .unwrap();
    let b = account_service::open_account(&store, bob, AccountType::Savings, "EUR")
        .await
        .unwrap();
    ledger::apply_entry(&store, alice, a.id, EntryKind::Credit, 10_000, "funding")
        .await
        .unwrap();
    ledger::apply_entry(&store, bob, b.id, EntryKind::Credit, 10_000, "funding")
        .await
        .unwrap();

    let transfers = (0..20).map(|i| {
        let store = &store;
        let (a_id, b_id) = (a.id, b.id);
        async move {
            if i % 2 == 0 {
                ledger::transfer(store, alice, a_id, b_id, 100, "ping").await
            } else {
                ledger::transfer(store, bob, b_id, a_id, 100, "pong").await
            }
        }
    });
    for result in join_all(transfers).await {
        result.unwrap();
    }

    let a_balance = ledger::get_balance(&store, a.id).await.unwrap().balance_cents;
    let b_balance = ledger::get_balance(&store, b.id).await.unwrap().balance_cents;
    assert_eq!(a_balance, 10_000);
    assert_eq!(b_balance, 10_000);
    assert!(ledger::verify_balance(&store, a.id).await.unwrap().is_consistent());
    assert!(ledger::verify_balance(&store, b.id).await.unwrap().is_consistent());

    let overdraft = ledger::transfer(&store, alice, a.id, b.id, 10_001, "too much").await;
    assert!(matches!(
        overdraft,
        Err(LedgerError::Guard(GuardError::InsufficientFunds { .. }))
    ));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn postgres_close_account_requires_zero_balance() {
    let store = store().await;
    let user = fresh_user();

    let account = account_service::open_account(&store, user, AccountType::Checking, "EUR")
        .await
        .unwrap();
    ledger::apply_entry(&store, user, account.id, EntryKind::Credit, 50, "funding")
        .await
        .unwrap();

    assert!(matches!(
        account_service::close_account(&store, user, account.id).await,
        Err(LedgerError::NonZeroBalance(_))
    ));

    ledger::apply_entry(&store, user, account.id, EntryKind::Debit, 50, "empty")
        .await
        .unwrap();
    account_service::close_account(&store, user, account.id)
        .await
        .unwrap();
    assert!(matches!(
        ledger::get_balance(&store, account.id).await,
        Err(LedgerError::AccountNotFound(_))
    ));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn postgres_lock_wait_times_out_without_side_effects() {
    let store = store_with(&[("LOCK_TIMEOUT_MS", "100")]).await;
    let user = fresh_user();

    let account = account_service::open_account(&store, user, AccountType::Checking, "EUR")
        .await
        .unwrap();
    ledger::apply_entry(&store, user, account.id, EntryKind::Credit, 700, "funding")
        .await
        .unwrap();

    // Another unit holds the row for longer than the lock timeout
    let mut holder = store.begin().await.unwrap();
    holder.lock_accounts(&[account.id]).await.unwrap();

    let blocked =
        ledger::apply_entry(&store, user, account.id, EntryKind::Debit, 200, "blocked").await;
    assert!(
        matches!(
            blocked,
            Err(LedgerError::PersistenceFailed(StoreError::LockTimeout))
        ),
        "unexpected result: {blocked:?}"
    );

    holder.rollback().await.unwrap();

    assert_eq!(
        ledger::get_balance(&store, account.id).await.unwrap().balance_cents,
        700
    );
    let history = ledger::account_history(&store, account.id, 50, 0).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(ledger::verify_balance(&store, account.id).await.unwrap().is_consistent());
}
