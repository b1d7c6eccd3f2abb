//! HTTP error type and response mapping.
//!
//! Ledger and lifecycle failures arrive as `LedgerError`; this module decides
//! which status code and stable error code the client sees.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::ledger::{GuardError, LedgerError};

/// Application-wide error type returned by handlers and middleware.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Failure reported by the ledger core or the account lifecycle.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Database failure outside the ledger (authentication, health check).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing, invalid, or inactive.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Request body or parameters are invalid.
    #[error("Invalid request")]
    InvalidRequest(String),
}

/// Malformed or undecodable request bodies, including unknown enum values.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl AppError {
    /// (HTTP status, error code) for this error.
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "invalid_api_key"),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::Ledger(err) => classify_ledger(err),
        }
    }
}

fn classify_ledger(err: &LedgerError) -> (StatusCode, &'static str) {
    match err {
        LedgerError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "invalid_amount"),
        LedgerError::UnsupportedKind(_) => (StatusCode::BAD_REQUEST, "unsupported_kind"),
        LedgerError::SameAccount => (StatusCode::BAD_REQUEST, "same_account"),
        LedgerError::CurrencyMismatch { .. } => (StatusCode::BAD_REQUEST, "currency_mismatch"),
        LedgerError::InvalidCurrency(_) => (StatusCode::BAD_REQUEST, "invalid_currency"),

        // Accounts of other users are indistinguishable from missing ones
        LedgerError::AccountNotFound(_) | LedgerError::Guard(GuardError::NotOwned(_)) => {
            (StatusCode::NOT_FOUND, "account_not_found")
        }
        LedgerError::Guard(GuardError::DestinationNotFound(_)) => {
            (StatusCode::NOT_FOUND, "destination_not_found")
        }
        LedgerError::EntryNotFound(_) => (StatusCode::NOT_FOUND, "entry_not_found"),

        LedgerError::Guard(GuardError::Inactive { .. }) => {
            (StatusCode::CONFLICT, "account_inactive")
        }
        LedgerError::NonZeroBalance(_) => (StatusCode::CONFLICT, "non_zero_balance"),
        LedgerError::ReferenceCollision(_) => (StatusCode::CONFLICT, "reference_collision"),

        LedgerError::Guard(GuardError::InsufficientFunds { .. }) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_funds")
        }
        LedgerError::BalanceOverflow(_) => (StatusCode::UNPROCESSABLE_ENTITY, "balance_overflow"),

        LedgerError::EntropyUnavailable(_) | LedgerError::PersistenceFailed(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Server-side failures are logged here and answered with a generic message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();

        let message = match &self {
            AppError::InvalidRequest(msg) => msg.clone(),
            AppError::Ledger(LedgerError::Guard(GuardError::NotOwned(id))) => {
                LedgerError::AccountNotFound(*id).to_string()
            }
            _ if status.is_server_error() => {
                tracing::error!(error = %self, "request failed");
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Side;
    use crate::models::account::AccountStatus;
    use crate::store::StoreError;

    fn status_of(err: LedgerError) -> StatusCode {
        AppError::from(err).classify().0
    }

    #[test]
    fn validation_errors_are_bad_requests() {
        assert_eq!(status_of(LedgerError::InvalidAmount(0)), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(LedgerError::SameAccount), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(LedgerError::CurrencyMismatch {
                from: "EUR".to_string(),
                to: "USD".to_string()
            }),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn foreign_accounts_look_missing() {
        assert_eq!(status_of(LedgerError::AccountNotFound(4)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(GuardError::NotOwned(4).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(LedgerError::Guard(GuardError::NotOwned(4))).classify().1,
            AppError::from(LedgerError::AccountNotFound(4)).classify().1
        );
    }

    #[test]
    fn state_conflicts_and_funds() {
        let inactive = GuardError::Inactive {
            account_id: 1,
            side: Side::Source,
            status: AccountStatus::Frozen,
        };
        assert_eq!(status_of(inactive.into()), StatusCode::CONFLICT);
        assert_eq!(status_of(LedgerError::NonZeroBalance(1)), StatusCode::CONFLICT);

        let funds = GuardError::InsufficientFunds {
            account_id: 1,
            balance_cents: 10,
            amount_cents: 20,
        };
        assert_eq!(status_of(funds.into()), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn infrastructure_failures_are_internal() {
        assert_eq!(
            status_of(LedgerError::PersistenceFailed(StoreError::LockTimeout)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::InvalidApiKey.classify(),
            (StatusCode::UNAUTHORIZED, "invalid_api_key")
        );
    }
}
