//! API key authentication middleware.
//!
//! Resolves the calling user for every protected request:
//! 1. Extract the API key from the Authorization header
//! 2. Hash it and look up the active key record
//! 3. Inject the resolved user as `AuthContext`
//! 4. Reject unknown or inactive keys with HTTP 401

use crate::{app::AppState, error::AppError, models::api_key::ApiKey};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

/// Authenticated caller, inserted into the request's extensions.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The principal every ledger call is made on behalf of
    pub user_id: i64,
}

/// Hex-encoded SHA-256 of a raw API key, as stored in `api_keys.key_hash`.
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// API key authentication middleware function.
///
/// # Headers
///
/// ```text
/// Authorization: Bearer abc123xyz
/// ```
///
/// # Returns
///
/// - `Ok(Response)` if authenticated successfully (calls next handler)
/// - `Err(AppError::InvalidApiKey)` if authentication fails (returns 401)
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::InvalidApiKey)?;

    let key_hash = hash_api_key(api_key);

    let record = sqlx::query_as::<_, ApiKey>(
        "SELECT id, key_hash, user_id, label, created_at, is_active
         FROM api_keys
         WHERE key_hash = $1 AND is_active = true",
    )
    .bind(&key_hash)
    .fetch_optional(state.store.pool())
    .await?
    .ok_or(AppError::InvalidApiKey)?;

    tracing::debug!(
        user_id = record.user_id,
        key_id = record.id,
        key_label = %record.label,
        "request authenticated"
    );

    request.extensions_mut().insert(AuthContext { user_id: record.user_id });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_hash_is_sha256_hex() {
        assert_eq!(
            hash_api_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
