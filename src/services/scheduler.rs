//! Watch scheduler.
//!
//! Drives the fetch, reconcile, notify, persist cycle on a fixed interval.
//! Cycles never overlap: the next tick is awaited only once the previous
//! cycle, including persistence, has finished.
//!
//! ## Cycle
//!
//! 1. Read the first-run flag from the store
//! 2. Fetch the listing, bounded by `fetch_timeout`; a failure ends the cycle
//!    without touching the store
//! 3. Reconcile the listing against the store
//! 4. First run: send the welcome message and clear the flag. Otherwise
//!    announce the new records, if any
//! 5. Persist the store if it changed since the last successful save
//!
//! Cancellation interrupts the fetch, a notification backoff, or the wait for
//! the next tick. Whatever was already applied to the in-memory store is saved
//! once on the way out.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::reconciler::{reconcile, Reconciliation};
use crate::interfaces::{FetchError, Notifier, NotifyError, RecordSource};
use crate::record::Record;
use crate::storage::SnapshotStore;

/// Scheduler settings, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between the start of consecutive cycles.
    pub interval: Duration,
    /// Upper bound for one fetch.
    pub fetch_timeout: Duration,
    /// Backing file of the snapshot store.
    pub state_file: PathBuf,
    /// Accept an empty listing. When false, an empty fetch fails the cycle.
    pub allow_empty: bool,
}

/// Where the scheduler currently is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Fetching,
    Reconciling,
    Notifying,
    Persisting,
    Cancelled,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Fetching => "fetching",
            CyclePhase::Reconciling => "reconciling",
            CyclePhase::Notifying => "notifying",
            CyclePhase::Persisting => "persisting",
            CyclePhase::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// How a single cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Fetch failed or timed out; the store was not touched.
    FetchFailed,
    /// First run: records registered silently, welcome message attempted.
    Welcomed { observed: usize },
    /// New records were passed to the notifier.
    Notified { new: usize, delivered: bool },
    /// Nothing to announce. Removals may still have been applied.
    Unchanged,
    /// Cancellation observed before the cycle completed.
    Cancelled,
}

/// Periodic listing watcher.
pub struct Scheduler {
    config: SchedulerConfig,
    store: SnapshotStore<Record>,
    source: Arc<dyn RecordSource>,
    notifier: Arc<dyn Notifier>,
    phase: CyclePhase,
    persisted_revision: u64,
}

impl Scheduler {
    /// Create a scheduler around an already loaded store.
    ///
    /// The store's current contents are taken to match its backing file.
    pub fn new(
        config: SchedulerConfig,
        store: SnapshotStore<Record>,
        source: Arc<dyn RecordSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let persisted_revision = store.revision();
        Self {
            config,
            store,
            source,
            notifier,
            phase: CyclePhase::Idle,
            persisted_revision,
        }
    }

    pub fn store(&self) -> &SnapshotStore<Record> {
        &self.store
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Run cycles until `cancel` fires, then save the store one last time.
    ///
    /// The first cycle starts immediately. Returns the final store.
    pub async fn run(mut self, cancel: CancellationToken) -> SnapshotStore<Record> {
        info!(
            source = %self.source.name(),
            notifier = %self.notifier.name(),
            interval = ?self.config.interval,
            fetch_timeout = ?self.config.fetch_timeout,
            state_file = %self.config.state_file.display(),
            records = self.store.record_count(),
            first_run = self.store.first_run(),
            "Starting listing watch"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.run_cycle(&cancel).await == CycleOutcome::Cancelled {
                break;
            }
        }

        self.set_phase(CyclePhase::Cancelled);
        self.shutdown_save().await;
        info!(records = self.store.record_count(), "Listing watch stopped");

        self.store
    }

    /// Execute one full cycle.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> CycleOutcome {
        if cancel.is_cancelled() {
            self.set_phase(CyclePhase::Cancelled);
            return CycleOutcome::Cancelled;
        }

        let first_run = self.store.first_run();

        self.set_phase(CyclePhase::Fetching);
        let records = match self.fetch(cancel).await {
            Ok(records) => records,
            Err(FetchError::Cancelled) => {
                self.set_phase(CyclePhase::Cancelled);
                return CycleOutcome::Cancelled;
            }
            Err(e) => {
                warn!(source = %self.source.name(), error = %e, "Fetch failed, skipping cycle");
                self.set_phase(CyclePhase::Idle);
                return CycleOutcome::FetchFailed;
            }
        };

        if records.is_empty() && !self.config.allow_empty {
            warn!(
                source = %self.source.name(),
                "Listing came back empty, skipping cycle"
            );
            self.set_phase(CyclePhase::Idle);
            return CycleOutcome::FetchFailed;
        }

        self.set_phase(CyclePhase::Reconciling);
        let reconciliation = reconcile(&records, &mut self.store, first_run);
        debug!(
            observed = reconciliation.observed,
            registered = reconciliation.registered,
            removed = reconciliation.removed.len(),
            duplicates = reconciliation.duplicates,
            "Listing reconciled"
        );

        self.set_phase(CyclePhase::Notifying);
        let outcome = if first_run {
            self.welcome(cancel, &reconciliation).await
        } else {
            self.announce(cancel, reconciliation).await
        };

        if outcome == CycleOutcome::Cancelled {
            self.set_phase(CyclePhase::Cancelled);
            return outcome;
        }

        self.set_phase(CyclePhase::Persisting);
        self.persist().await;

        self.set_phase(CyclePhase::Idle);
        outcome
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<Record>, FetchError> {
        let timeout = self.config.fetch_timeout;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = tokio::time::timeout(timeout, self.source.fetch(cancel)) => {
                result.unwrap_or(Err(FetchError::Timeout(timeout)))
            }
        }
    }

    /// First-run path. The flag is cleared whether or not the welcome
    /// message went out, so a failing channel cannot cause repeated welcomes.
    async fn welcome(
        &mut self,
        cancel: &CancellationToken,
        reconciliation: &Reconciliation,
    ) -> CycleOutcome {
        let observed = reconciliation.observed;

        match self.notifier.notify_welcome(cancel, observed).await {
            Ok(()) => info!(observed = observed, "First run, existing records registered"),
            Err(NotifyError::Cancelled) => return CycleOutcome::Cancelled,
            Err(e) => error!(
                notifier = %self.notifier.name(),
                observed = observed,
                error = %e,
                "Welcome notification failed"
            ),
        }

        self.store.set_first_run(false);
        CycleOutcome::Welcomed { observed }
    }

    async fn announce(
        &mut self,
        cancel: &CancellationToken,
        reconciliation: Reconciliation,
    ) -> CycleOutcome {
        let new_records = reconciliation.new_records;
        if new_records.is_empty() {
            debug!(observed = reconciliation.observed, "No new records");
            return CycleOutcome::Unchanged;
        }

        let new = new_records.len();
        info!(count = new, "New records found");

        let delivered = match self.notifier.notify_new(cancel, &new_records).await {
            Ok(()) => true,
            Err(NotifyError::Cancelled) => return CycleOutcome::Cancelled,
            Err(e) => {
                error!(
                    notifier = %self.notifier.name(),
                    count = new,
                    error = %e,
                    "Failed to announce new records"
                );
                false
            }
        };

        CycleOutcome::Notified { new, delivered }
    }

    /// Save the store if it changed since the last successful save.
    ///
    /// Failures are logged; the delta stays pending for the next attempt.
    async fn persist(&mut self) {
        let revision = self.store.revision();
        if revision == self.persisted_revision {
            debug!("Store unchanged, nothing to persist");
            return;
        }

        match self.store.save(&self.config.state_file).await {
            Ok(()) => {
                self.persisted_revision = revision;
                debug!(
                    file = %self.config.state_file.display(),
                    entries = self.store.len(),
                    "Store persisted"
                );
            }
            Err(e) => error!(error = %e, "Failed to persist store"),
        }
    }

    async fn shutdown_save(&mut self) {
        match self.store.save(&self.config.state_file).await {
            Ok(()) => {
                self.persisted_revision = self.store.revision();
                info!(
                    file = %self.config.state_file.display(),
                    entries = self.store.len(),
                    "Store saved on shutdown"
                );
            }
            Err(e) => error!(error = %e, "Failed to save store on shutdown"),
        }
    }

    fn set_phase(&mut self, phase: CyclePhase) {
        if self.phase != phase {
            debug!(from = %self.phase, to = %phase, "Cycle phase");
            self.phase = phase;
        }
    }
}
