//! Database connection pool and migration management.
//!
//! This module provides utilities for:
//! - Creating a PostgreSQL connection pool whose sessions carry the ledger's
//!   lock and statement timeouts
//! - Running database migrations automatically

use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};

use crate::config::Config;

/// Type alias for PostgreSQL connection pool.
pub type DbPool = Pool<Postgres>;

/// Create a new PostgreSQL connection pool.
///
/// Every connection is opened with:
/// - `lock_timeout`: how long a unit of work waits for a row lock before the
///   statement fails (surfaced as `StoreError::LockTimeout`)
/// - `statement_timeout`: upper bound for any single statement
///
/// # Errors
///
/// Returns an error if the connection string is invalid or the server cannot
/// be reached.
pub async fn create_pool(config: &Config) -> Result<DbPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(&config.database_url)?.options([
        ("lock_timeout", format!("{}ms", config.lock_timeout_ms)),
        ("statement_timeout", format!("{}ms", config.statement_timeout_ms)),
    ]);

    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect_with(options)
        .await
}

/// Run database migrations from the `migrations/` directory.
///
/// Migrations are tracked in the `_sqlx_migrations` table, so each runs once.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    // The macro reads migrations at compile time from ./migrations directory
    sqlx::migrate!("./migrations").run(pool).await
}
