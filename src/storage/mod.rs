//! Storage implementations.

pub mod snapshot_store;

pub use snapshot_store::{
    record_key, SnapshotStore, StoreIoError, StoredValue, FIRST_RUN_KEY, RECORD_KEY_PREFIX,
};
