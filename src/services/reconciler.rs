//! Diff between the current observation and stored history.
//!
//! `reconcile` converges the snapshot store onto the current listing:
//! unseen ids are registered, ids that vanished upstream are dropped.
//! Only additions are reported back; removals are silent.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::record::Record;
use crate::storage::SnapshotStore;

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Records that should be announced, in listing order.
    ///
    /// Always empty on the first run.
    pub new_records: Vec<Record>,
    /// Records inserted into the store, announced or not.
    pub registered: usize,
    /// Ids removed from the store.
    pub removed: Vec<String>,
    /// Entries dropped because their id already appeared earlier in the listing.
    pub duplicates: usize,
    /// Distinct ids in the current listing.
    pub observed: usize,
}

impl Reconciliation {
    /// Whether the pass mutated the store.
    pub fn is_change(&self) -> bool {
        self.registered > 0 || !self.removed.is_empty()
    }
}

/// Reconcile `current` against `store`.
///
/// On the first run every unseen record is registered but none is returned
/// as new. A record already in the store is left untouched even if its
/// fields changed.
pub fn reconcile(
    current: &[Record],
    store: &mut SnapshotStore<Record>,
    first_run: bool,
) -> Reconciliation {
    let mut outcome = Reconciliation::default();
    let mut current_ids: HashSet<&str> = HashSet::with_capacity(current.len());

    for record in current {
        if !current_ids.insert(record.id.as_str()) {
            outcome.duplicates += 1;
            debug!(id = %record.id, "Duplicate record id in listing, keeping first");
            continue;
        }

        if store.record(&record.id).is_some() {
            continue;
        }

        store.put_record(&record.id, record.clone());
        outcome.registered += 1;
        info!(
            id = %record.id,
            name = %record.name,
            group = %record.group,
            link = %record.link,
            remote = record.remote,
            "Record registered"
        );

        if !first_run {
            outcome.new_records.push(record.clone());
        }
    }

    for id in store.record_ids() {
        if current_ids.contains(id.as_str()) {
            continue;
        }

        if let Some(gone) = store.remove_record(&id) {
            info!(
                id = %id,
                name = %gone.name,
                group = %gone.group,
                link = %gone.link,
                "Record removed upstream"
            );
        }
        outcome.removed.push(id);
    }

    outcome.observed = current_ids.len();
    outcome
}
