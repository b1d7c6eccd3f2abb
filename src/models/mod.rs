//! Data models representing database entities and API bodies.

/// Bank account model
pub mod account;
/// API key lookup model
pub mod api_key;
/// Ledger entry model
pub mod entry;
