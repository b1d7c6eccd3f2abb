//! Banking ledger service.
//!
//! The `ledger` module is the core: it is the only code that changes account
//! balances, and it does so through the `store` traits so the same rules run
//! against PostgreSQL in production and an in-memory store in tests.
//! Everything else is the service shell around it.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
