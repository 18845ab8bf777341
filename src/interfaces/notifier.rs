//! Notifier interface.
//!
//! A notifier announces newly observed records, or a one-time welcome, to a
//! human-facing channel. Implementations retry internally (see
//! `utils::retry::RetryPolicy`) before surfacing an error, and abort as soon
//! as the cancellation token fires.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::record::Record;

/// Errors that can occur when delivering notifications.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Delivery was interrupted by shutdown.
    #[error("Notification cancelled")]
    Cancelled,

    /// Some messages were not delivered after exhausting retries.
    #[error("{failed} of {total} notifications not delivered: {last_error}")]
    Delivery {
        failed: usize,
        total: usize,
        last_error: String,
    },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Channel answered with a non-success status.
    #[error("Channel rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Delivers notifications about the listing.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Announce newly observed records as one batch.
    async fn notify_new(
        &self,
        cancel: &CancellationToken,
        records: &[Record],
    ) -> Result<(), NotifyError>;

    /// Announce that watching has started, with the number of records
    /// currently on the listing.
    async fn notify_welcome(
        &self,
        cancel: &CancellationToken,
        count: usize,
    ) -> Result<(), NotifyError>;

    /// Channel name for logging.
    fn name(&self) -> &str;
}
