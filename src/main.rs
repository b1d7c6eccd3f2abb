//! Banking ledger service - main application entry point.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Start the notification worker if a webhook is configured
//! 4. Build the HTTP router and serve on the configured port

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use banking_ledger::{
    app::{self, AppState},
    config::Config,
    db,
    services::notification_service::{Notifier, WebhookSink},
    store::postgres::PgLedgerStore,
};

/// First retry delay for notification delivery; doubles per attempt.
const NOTIFICATION_BASE_BACKOFF: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config).await?;
    tracing::info!(
        max_connections = config.database_max_connections,
        "Database pool created"
    );

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let notifier = match config.webhook() {
        Some(webhook) => {
            let sink = WebhookSink::new(&webhook.url, &webhook.secret)?;
            let (notifier, _worker) = Notifier::spawn(
                sink,
                config.notification_queue_capacity,
                config.notification_max_attempts,
                NOTIFICATION_BASE_BACKOFF,
            );
            tracing::info!(
                capacity = config.notification_queue_capacity,
                "Notification worker started"
            );
            Some(notifier)
        }
        None => {
            tracing::info!("No notification webhook configured, notifications disabled");
            None
        }
    };

    let state = AppState::new(PgLedgerStore::new(pool), notifier);
    let router = app::router(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
