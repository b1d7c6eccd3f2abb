//! Shared application state and the HTTP router.

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::auth::auth_middleware;
use crate::services::notification_service::{NotificationJob, Notifier};
use crate::store::postgres::PgLedgerStore;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: PgLedgerStore,

    /// `None` when no notification webhook is configured
    pub notifier: Option<Notifier>,
}

impl AppState {
    pub fn new(store: PgLedgerStore, notifier: Option<Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Queue notification jobs for an operation that has already committed.
    /// Queueing failures are logged and never reach the caller.
    pub fn notify<I>(&self, jobs: I)
    where
        I: IntoIterator<Item = NotificationJob>,
    {
        let Some(notifier) = &self.notifier else {
            return;
        };
        for job in jobs {
            if let Err(e) = notifier.submit(job) {
                tracing::warn!(error = %e, "notification dropped");
            }
        }
    }
}

/// Build the router: public health check plus the authenticated API.
pub fn router(state: AppState) -> Router {
    let authenticated_routes = Router::new()
        // Account lifecycle
        .route(
            "/api/v1/accounts",
            post(handlers::accounts::create_account).get(handlers::accounts::list_accounts),
        )
        .route(
            "/api/v1/accounts/{id}",
            get(handlers::accounts::get_account)
                .patch(handlers::accounts::update_account)
                .delete(handlers::accounts::close_account),
        )
        .route(
            "/api/v1/accounts/{id}/balance",
            get(handlers::accounts::get_balance),
        )
        .route(
            "/api/v1/accounts/{id}/entries",
            get(handlers::accounts::list_entries),
        )
        // Ledger mutations
        .route(
            "/api/v1/entries",
            post(handlers::entries::create_entry).get(handlers::entries::list_entries),
        )
        .route("/api/v1/entries/{id}", get(handlers::entries::get_entry))
        .route("/api/v1/transfers", post(handlers::entries::create_transfer))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
