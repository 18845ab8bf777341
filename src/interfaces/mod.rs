//! Abstract interfaces for listing-watch components.
//!
//! These traits define the contracts for:
//! - Record sources (fetch and extract the current listing)
//! - Notifiers (announce new records to a human-facing channel)

pub mod notifier;
pub mod source;

pub use notifier::{Notifier, NotifyError};
pub use source::{FetchError, RecordSource};
