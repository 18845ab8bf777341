//! Record source interface.
//!
//! A source fetches the listing page and extracts the records currently on
//! it. It holds no state between calls.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::record::Record;

/// Errors from fetching or extracting the listing.
///
/// The scheduler does not distinguish between variants: every failure means
/// "try again next tick".
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Listing request failed with status {0}")]
    Status(u16),

    #[error("Failed to parse listing: {0}")]
    Parse(String),

    #[error("Invalid selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },

    #[error("Listing fetch timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Listing fetch cancelled")]
    Cancelled,
}

/// Produces the current ordered sequence of records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch and extract the listing.
    ///
    /// Implementations should return promptly with `FetchError::Cancelled`
    /// once `cancel` fires.
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<Record>, FetchError>;

    /// Source name for logging.
    fn name(&self) -> &str;
}
