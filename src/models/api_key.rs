//! API key model for resolving the calling user.
//!
//! Keys are stored as SHA-256 hashes. Issuing keys and password login live
//! outside this service; here a key only maps a bearer token to a user id.

use chrono::{DateTime, Utc};

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table with columns:
/// - `id`: Unique identifier
/// - `key_hash`: SHA-256 hash of the actual API key (64 hex characters)
/// - `user_id`: The user this key authenticates as
/// - `label`: Free-form name shown to operators
/// - `created_at`: When the key was created
/// - `is_active`: Whether the key is currently valid
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: i64,
    pub key_hash: String,
    pub user_id: i64,
    pub label: String,
    pub created_at: DateTime<Utc>,

    /// Inactive keys are rejected during authentication. This revokes access
    /// without deleting the record.
    pub is_active: bool,
}
