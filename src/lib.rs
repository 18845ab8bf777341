//! listing-watch - watches a listing page and announces new entries.
//!
//! Each cycle fetches the listing, reconciles it against a persisted
//! snapshot of previously seen records, announces additions through the
//! configured notification channels and saves the snapshot.

pub mod config;
pub mod interfaces;
pub mod notify;
pub mod record;
pub mod services;
pub mod sources;
pub mod storage;
pub mod utils;
