//! Notification delivery for committed ledger operations.
//!
//! Jobs are submitted to a bounded queue after a ledger unit of work has
//! committed and are drained by a single worker task that hands them to a
//! `NotificationSink`.
//!
//! # Delivery Contract
//!
//! At-least-once within the retry budget: a job is retried with exponential
//! backoff until the sink acknowledges it or `max_attempts` is used up, in
//! which case it is logged as dead-lettered. Consumers deduplicate by the
//! job `id`. Jobs still queued when the process exits are lost.
//!
//! # Webhook Signatures
//!
//! `WebhookSink` signs each body with HMAC-SHA256 and sends
//! `X-Webhook-Signature: sha256=<hex>` and `X-Webhook-Event-Id: <job id>`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::entry::{EntryKind, LedgerEntry, TransferResult};

type HmacSha256 = Hmac<Sha256>;

/// Upper bound for the delay between two delivery attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// One message to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationJob {
    /// Deduplication key for consumers
    pub id: Uuid,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    /// Reference of the ledger entry or transfer the job is about
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

impl NotificationJob {
    pub fn new(user_id: i64, title: &str, message: String, reference: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            message,
            reference: reference.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Job for the owner of an account after a debit or credit.
    pub fn for_entry(user_id: i64, entry: &LedgerEntry) -> Self {
        let title = match entry.kind {
            EntryKind::Credit => "Account credited",
            _ => "Account debited",
        };
        let message = format!(
            "{} of {} {} on account {}",
            entry.kind,
            format_cents(entry.amount_cents),
            entry.currency,
            entry.account_id
        );
        Self::new(user_id, title, message, &entry.reference)
    }

    /// Jobs for the sender and the recipient of a transfer.
    pub fn for_transfer(sender_user_id: i64, transfer: &TransferResult) -> [Self; 2] {
        let amount = format_cents(transfer.amount_cents);
        let currency = &transfer.debit_entry.currency;
        [
            Self::new(
                sender_user_id,
                "Transfer sent",
                format!(
                    "{amount} {currency} sent from account {} to account {}",
                    transfer.from_account_id, transfer.to_account_id
                ),
                &transfer.debit_entry.reference,
            ),
            Self::new(
                transfer.recipient_user_id,
                "Transfer received",
                format!(
                    "{amount} {currency} received on account {} from account {}",
                    transfer.to_account_id, transfer.from_account_id
                ),
                &transfer.credit_entry.reference,
            ),
        ]
    }
}

/// Render minor units as a decimal amount, e.g. `1050` as `10.50`.
fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Failure to hand one job to its destination.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("endpoint answered with status {0}")]
    Rejected(u16),

    #[error("failed to serialize notification: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure to enqueue a job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification queue is full")]
    QueueFull,

    #[error("notification worker has stopped")]
    Closed,
}

/// Invalid webhook target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid webhook url: {0}")]
pub struct InvalidWebhookUrl(pub String);

/// Destination of notification jobs.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn deliver(&self, job: &NotificationJob) -> Result<(), DeliveryError>;
}

/// Delivers jobs as signed JSON POST requests.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    secret: String,
}

impl WebhookSink {
    /// # Errors
    ///
    /// Returns an error if the URL is not acceptable (see
    /// `validate_webhook_url`) or the HTTP client cannot be built.
    pub fn new(url: &str, secret: &str) -> Result<Self, InvalidWebhookUrl> {
        validate_webhook_url(url)?;
        // 5 seconds per request, so a slow endpoint cannot stall the queue
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| InvalidWebhookUrl(format!("HTTP client error: {e}")))?;
        Ok(Self {
            client,
            url: url.to_string(),
            secret: secret.to_string(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, job: &NotificationJob) -> Result<(), DeliveryError> {
        let body = serde_json::to_string(job)?;
        let signature = generate_signature(&self.secret, &body);

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Signature", signature)
            .header("X-Webhook-Event-Id", job.id.to_string())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Generate HMAC-SHA256 signature for a webhook body.
///
/// # Format
///
/// `sha256=<hex_encoded_hmac>`
pub fn generate_signature(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(payload.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Validate webhook URL format.
///
/// # Rules
///
/// - Must be valid URL
/// - Must be HTTPS (HTTP allowed for localhost only)
/// - Maximum 2048 characters
pub fn validate_webhook_url(url: &str) -> Result<(), InvalidWebhookUrl> {
    if url.len() > 2048 {
        return Err(InvalidWebhookUrl("URL exceeds 2048 characters".to_string()));
    }

    let parsed =
        url::Url::parse(url).map_err(|_| InvalidWebhookUrl("Invalid URL format".to_string()))?;

    match parsed.scheme() {
        "https" => Ok(()),
        "http" => match parsed.host_str() {
            Some("localhost") | Some("127.0.0.1") => Ok(()),
            _ => Err(InvalidWebhookUrl(
                "HTTP is only allowed for localhost. Use HTTPS for production.".to_string(),
            )),
        },
        _ => Err(InvalidWebhookUrl("URL must use HTTP or HTTPS".to_string())),
    }
}

/// Delay before retry number `attempt` (1-based).
fn backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(MAX_BACKOFF).min(MAX_BACKOFF)
}

/// Handle to the notification queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::Sender<NotificationJob>,
}

impl Notifier {
    /// Create the queue and spawn its worker on the current tokio runtime.
    ///
    /// The worker exits once every `Notifier` clone is dropped and the queue
    /// is drained.
    pub fn spawn<K: NotificationSink>(
        sink: K,
        capacity: usize,
        max_attempts: u32,
        base_backoff: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let worker = tokio::spawn(run_worker(Arc::new(sink), rx, max_attempts, base_backoff));
        (Self { tx }, worker)
    }

    /// Enqueue a job without waiting.
    pub fn submit(&self, job: NotificationJob) -> Result<(), NotifyError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotifyError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => NotifyError::Closed,
        })
    }
}

async fn run_worker<K: NotificationSink>(
    sink: Arc<K>,
    mut rx: mpsc::Receiver<NotificationJob>,
    max_attempts: u32,
    base_backoff: Duration,
) {
    while let Some(job) = rx.recv().await {
        deliver_with_retry(sink.as_ref(), &job, max_attempts, base_backoff).await;
    }
    tracing::debug!("notification queue closed, worker exiting");
}

async fn deliver_with_retry<K: NotificationSink>(
    sink: &K,
    job: &NotificationJob,
    max_attempts: u32,
    base_backoff: Duration,
) -> bool {
    for attempt in 1..=max_attempts {
        match sink.deliver(job).await {
            Ok(()) => {
                tracing::debug!(job_id = %job.id, attempt, "notification delivered");
                return true;
            }
            Err(e) if attempt < max_attempts => {
                let delay = backoff(base_backoff, attempt);
                tracing::warn!(job_id = %job.id, attempt, error = %e, ?delay, "notification delivery failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(
                    job_id = %job.id,
                    user_id = job.user_id,
                    reference = %job.reference,
                    attempts = max_attempts,
                    error = %e,
                    "notification dead-lettered"
                );
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::sync::Mutex;

    use super::*;

    /// Fails the first `failures` deliveries, then records jobs.
    #[derive(Default)]
    struct FlakySink {
        failures: AtomicU32,
        delivered: Mutex<Vec<NotificationJob>>,
        attempts: AtomicU32,
    }

    impl FlakySink {
        fn failing(times: u32) -> Self {
            Self {
                failures: AtomicU32::new(times),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl NotificationSink for Arc<FlakySink> {
        async fn deliver(&self, job: &NotificationJob) -> Result<(), DeliveryError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(DeliveryError::Rejected(503));
            }
            self.delivered.lock().await.push(job.clone());
            Ok(())
        }
    }

    fn job() -> NotificationJob {
        NotificationJob::new(1, "Account credited", "credit of 1.00 EUR".to_string(), "TXN-1")
    }

    #[test]
    fn signature_is_prefixed_hex_hmac() {
        let sig = generate_signature("secret", r#"{"a":1}"#);
        let hex_part = sig.strip_prefix("sha256=").unwrap();
        assert_eq!(hex_part.len(), 64);
        assert_eq!(sig, generate_signature("secret", r#"{"a":1}"#));
        assert_ne!(sig, generate_signature("other", r#"{"a":1}"#));
    }

    #[test]
    fn webhook_url_rules() {
        assert!(validate_webhook_url("https://hooks.example.com/ledger").is_ok());
        assert!(validate_webhook_url("http://localhost:9000/hook").is_ok());
        assert!(validate_webhook_url("http://hooks.example.com/ledger").is_err());
        assert!(validate_webhook_url("ftp://hooks.example.com").is_err());
        assert!(validate_webhook_url("not a url").is_err());
        let long = format!("https://example.com/{}", "a".repeat(2048));
        assert!(validate_webhook_url(&long).is_err());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff(base, 1), Duration::from_millis(100));
        assert_eq!(backoff(base, 2), Duration::from_millis(200));
        assert_eq!(backoff(base, 4), Duration::from_millis(800));
        assert_eq!(backoff(base, 40), MAX_BACKOFF);
    }

    #[test]
    fn cents_render_with_two_decimals() {
        assert_eq!(format_cents(1050), "10.50");
        assert_eq!(format_cents(7), "0.07");
        assert_eq!(format_cents(-250), "-2.50");
    }

    #[tokio::test]
    async fn flaky_sink_is_retried_until_delivered() {
        let sink = Arc::new(FlakySink::failing(2));
        let delivered =
            deliver_with_retry(&sink, &job(), 5, Duration::from_millis(1)).await;

        assert!(delivered);
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(sink.delivered.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn job_is_dead_lettered_after_max_attempts() {
        let sink = Arc::new(FlakySink::failing(10));
        let delivered =
            deliver_with_retry(&sink, &job(), 3, Duration::from_millis(1)).await;

        assert!(!delivered);
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
        assert!(sink.delivered.lock().await.is_empty());
    }

    #[tokio::test]
    async fn queued_jobs_are_drained_by_the_worker() {
        let sink = Arc::new(FlakySink::failing(1));
        let (notifier, worker) =
            Notifier::spawn(Arc::clone(&sink), 8, 3, Duration::from_millis(1));

        let first = job();
        let second = job();
        notifier.submit(first.clone()).unwrap();
        notifier.submit(second.clone()).unwrap();
        drop(notifier);
        worker.await.unwrap();

        let delivered = sink.delivered.lock().await;
        assert_eq!(*delivered, vec![first, second]);
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let notifier = Notifier { tx };

        notifier.submit(job()).unwrap();
        assert_eq!(notifier.submit(job()), Err(NotifyError::QueueFull));
    }

    #[tokio::test]
    async fn stopped_worker_is_reported() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let notifier = Notifier { tx };

        assert_eq!(notifier.submit(job()), Err(NotifyError::Closed));
    }
}
