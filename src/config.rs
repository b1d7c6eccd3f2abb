//! Application configuration management.
//!
//! Configuration is read from environment variables with the `envy` crate,
//! which deserializes them into a type-safe struct. A `.env` file is loaded
//! first when present.

use serde::Deserialize;

/// Configuration failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT`: HTTP server port, defaults to 3000
/// - `DATABASE_MAX_CONNECTIONS`: pool size, defaults to 5
/// - `LOCK_TIMEOUT_MS`: row lock wait bound, defaults to 5000
/// - `STATEMENT_TIMEOUT_MS`: statement bound, defaults to 30000
/// - `NOTIFICATION_WEBHOOK_URL` / `NOTIFICATION_WEBHOOK_SECRET`: optional,
///   set both to enable notification delivery
/// - `NOTIFICATION_QUEUE_CAPACITY`: defaults to 1024
/// - `NOTIFICATION_MAX_ATTEMPTS`: defaults to 5
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,

    #[serde(default)]
    pub notification_webhook_url: Option<String>,

    #[serde(default)]
    pub notification_webhook_secret: Option<String>,

    #[serde(default = "default_queue_capacity")]
    pub notification_queue_capacity: usize,

    #[serde(default = "default_max_attempts")]
    pub notification_max_attempts: u32,
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_statement_timeout_ms() -> u64 {
    30_000
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_attempts() -> u32 {
    5
}

/// Webhook target for notification delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Tries to load a `.env` file first (does nothing if not found).
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing, cannot be parsed,
    /// or form an invalid combination.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from explicit `(NAME, value)` pairs.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Config>(vars)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database_max_connections == 0 {
            return Err(ConfigError::Invalid(
                "DATABASE_MAX_CONNECTIONS must be greater than zero".to_string(),
            ));
        }
        if self.notification_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "NOTIFICATION_QUEUE_CAPACITY must be greater than zero".to_string(),
            ));
        }
        if self.notification_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "NOTIFICATION_MAX_ATTEMPTS must be greater than zero".to_string(),
            ));
        }
        match (&self.notification_webhook_url, &self.notification_webhook_secret) {
            (Some(_), None) | (None, Some(_)) => Err(ConfigError::Invalid(
                "NOTIFICATION_WEBHOOK_URL and NOTIFICATION_WEBHOOK_SECRET must be set together"
                    .to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Webhook target, when notification delivery is enabled.
    pub fn webhook(&self) -> Option<WebhookConfig> {
        match (&self.notification_webhook_url, &self.notification_webhook_secret) {
            (Some(url), Some(secret)) => Some(WebhookConfig {
                url: url.clone(),
                secret: secret.clone(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = Config::from_vars(vars(&[("DATABASE_URL", "postgres://localhost/ledger")]))
            .unwrap();

        assert_eq!(config.server_port, 3000);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.lock_timeout_ms, 5_000);
        assert_eq!(config.statement_timeout_ms, 30_000);
        assert_eq!(config.notification_queue_capacity, 1024);
        assert_eq!(config.notification_max_attempts, 5);
        assert!(config.webhook().is_none());
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let err = Config::from_vars(vars(&[("SERVER_PORT", "8080")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env(_)));
    }

    #[test]
    fn webhook_requires_url_and_secret_together() {
        let err = Config::from_vars(vars(&[
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("NOTIFICATION_WEBHOOK_URL", "https://hooks.example.com/ledger"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let config = Config::from_vars(vars(&[
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("NOTIFICATION_WEBHOOK_URL", "https://hooks.example.com/ledger"),
            ("NOTIFICATION_WEBHOOK_SECRET", "s3cret"),
        ]))
        .unwrap();
        assert_eq!(
            config.webhook(),
            Some(WebhookConfig {
                url: "https://hooks.example.com/ledger".to_string(),
                secret: "s3cret".to_string(),
            })
        );
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let err = Config::from_vars(vars(&[
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("NOTIFICATION_QUEUE_CAPACITY", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
