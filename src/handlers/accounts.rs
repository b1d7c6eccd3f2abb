//! Account HTTP handlers.
//!
//! - POST /api/v1/accounts - Open a new account
//! - GET /api/v1/accounts - List the caller's accounts
//! - GET /api/v1/accounts/{id} - Get one account
//! - PATCH /api/v1/accounts/{id} - Change account status
//! - DELETE /api/v1/accounts/{id} - Close an empty account
//! - GET /api/v1/accounts/{id}/balance - Current balance
//! - GET /api/v1/accounts/{id}/entries - Entry history, newest first
//!
//! Every handler resolves the account through the caller's ownership first;
//! accounts of other users answer 404.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    app::AppState,
    error::AppError,
    handlers::ApiJson,
    ledger,
    middleware::auth::AuthContext,
    models::{
        account::{AccountResponse, BalanceView, CreateAccountRequest, UpdateAccountRequest},
        entry::{HistoryQuery, LedgerEntry},
    },
    services::account_service,
};

/// Open a new account.
///
/// # Request Body
///
/// ```json
/// {
///   "account_type": "checking",
///   "currency": "EUR"  // optional, defaults to EUR
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: the new account, balance 0, status `active`
/// - **400**: unknown account type or malformed currency
pub async fn create_account(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(request): ApiJson<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), AppError> {
    let account = account_service::open_account(
        &state.store,
        auth.user_id,
        request.account_type,
        &request.currency,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(account.into())))
}

pub async fn list_accounts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<AccountResponse>>, AppError> {
    let accounts = account_service::list_accounts(&state.store, auth.user_id).await?;
    Ok(Json(accounts.into_iter().map(Into::into).collect()))
}

/// Get a specific account by ID.
///
/// Returns 404 if the account doesn't exist, was closed, or belongs to
/// another user.
pub async fn get_account(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(account_id): Path<i64>,
) -> Result<Json<AccountResponse>, AppError> {
    let account =
        account_service::find_owned_account(&state.store, auth.user_id, account_id).await?;
    Ok(Json(account.into()))
}

/// Change an account's status (`active`, `frozen`, `closed`).
///
/// The change waits for in-flight mutations on the account to finish and
/// applies to every mutation that starts afterwards.
pub async fn update_account(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(account_id): Path<i64>,
    ApiJson(request): ApiJson<UpdateAccountRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    let account =
        account_service::set_status(&state.store, auth.user_id, account_id, request.status)
            .await?;
    Ok(Json(account.into()))
}

/// Close an account. Only accounts with a zero balance can be closed
/// (409 otherwise).
pub async fn close_account(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(account_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    account_service::close_account(&state.store, auth.user_id, account_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_balance(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(account_id): Path<i64>,
) -> Result<Json<BalanceView>, AppError> {
    account_service::find_owned_account(&state.store, auth.user_id, account_id).await?;
    let balance = ledger::get_balance(&state.store, account_id).await?;
    Ok(Json(balance))
}

/// Entry history of an account.
///
/// # Query Parameters
///
/// - `limit`: page size, 1 to 100 (default 50)
/// - `offset`: entries to skip (default 0)
pub async fn list_entries(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(account_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<LedgerEntry>>, AppError> {
    account_service::find_owned_account(&state.store, auth.user_id, account_id).await?;
    let entries =
        ledger::account_history(&state.store, account_id, query.limit, query.offset).await?;
    Ok(Json(entries))
}
