//! Ledger entry and transfer HTTP handlers.
//!
//! - POST /api/v1/entries - Apply a debit or credit
//! - GET /api/v1/entries - Entries across all of the caller's accounts
//! - GET /api/v1/entries/{id} - Get one entry
//! - POST /api/v1/transfers - Transfer between two accounts
//!
//! Notifications are queued only after the ledger call has committed.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    app::AppState,
    error::AppError,
    handlers::ApiJson,
    ledger::{self, LedgerError},
    middleware::auth::AuthContext,
    models::entry::{EntryRequest, HistoryQuery, LedgerEntry, TransferRequest, TransferResult},
    services::{account_service, notification_service::NotificationJob},
};

/// Apply a debit or credit to one of the caller's accounts.
///
/// # Request Body
///
/// ```json
/// {
///   "account_id": 42,
///   "kind": "credit",
///   "amount_cents": 10000,
///   "description": "Deposit"
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: the committed entry
/// - **400**: non-positive amount or `kind` other than debit/credit
/// - **404**: account not found or not owned
/// - **409**: account not active
/// - **422**: insufficient funds for a debit
pub async fn create_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(request): ApiJson<EntryRequest>,
) -> Result<(StatusCode, Json<LedgerEntry>), AppError> {
    let entry = ledger::apply_entry(
        &state.store,
        auth.user_id,
        request.account_id,
        request.kind,
        request.amount_cents,
        &request.description,
    )
    .await?;

    state.notify([NotificationJob::for_entry(auth.user_id, &entry)]);

    Ok((StatusCode::CREATED, Json(entry)))
}

/// Entries on every open account of the caller, newest first. Transfer legs
/// appear only for the side the caller owns.
///
/// # Query Parameters
///
/// - `limit`: page size, 1 to 100 (default 50)
/// - `offset`: entries to skip (default 0)
pub async fn list_entries(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<LedgerEntry>>, AppError> {
    let entries =
        ledger::user_history(&state.store, auth.user_id, query.limit, query.offset).await?;
    Ok(Json(entries))
}

/// Get a single entry. Entries on accounts of other users answer 404.
pub async fn get_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entry_id): Path<i64>,
) -> Result<Json<LedgerEntry>, AppError> {
    let entry = ledger::find_entry(&state.store, entry_id).await?;
    account_service::find_owned_account(&state.store, auth.user_id, entry.account_id)
        .await
        .map_err(|e| match e {
            LedgerError::AccountNotFound(_) => LedgerError::EntryNotFound(entry_id),
            other => other,
        })?;

    Ok(Json(entry))
}

/// Transfer money from one of the caller's accounts to any active account.
///
/// # Request Body
///
/// ```json
/// {
///   "from_account_id": 42,
///   "to_account_id": 77,
///   "amount_cents": 2500,
///   "description": "Rent share"
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: both legs and the shared transfer reference
/// - **400**: non-positive amount, same account, or currency mismatch
/// - **404**: source not owned, or either account missing
/// - **409**: either account not active
/// - **422**: insufficient funds on the source
pub async fn create_transfer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(request): ApiJson<TransferRequest>,
) -> Result<(StatusCode, Json<TransferResult>), AppError> {
    let result = ledger::transfer(
        &state.store,
        auth.user_id,
        request.from_account_id,
        request.to_account_id,
        request.amount_cents,
        &request.description,
    )
    .await?;

    state.notify(NotificationJob::for_transfer(auth.user_id, &result));

    Ok((StatusCode::CREATED, Json(result)))
}
