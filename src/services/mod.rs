//! Services around the ledger core.

/// Account opening, status changes and closing
pub mod account_service;
/// Bounded, retrying notification delivery
pub mod notification_service;
