//! Shared fakes for integration tests.
//!
//! `ScriptedSource` replays a fixed sequence of fetch results and
//! `RecordingNotifier` keeps every call it receives.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use listing_watch::interfaces::{FetchError, Notifier, NotifyError, RecordSource};
use listing_watch::record::Record;
use listing_watch::services::{Scheduler, SchedulerConfig};
use listing_watch::storage::SnapshotStore;

pub fn record(id: &str) -> Record {
    Record {
        id: id.to_string(),
        name: format!("Vacancy {}", id),
        group: "Backend".to_string(),
        link: format!("https://example.com/about/vacancies/{}", id),
        remote: false,
        observed_at: Utc::now(),
    }
}

pub fn records(ids: &[&str]) -> Vec<Record> {
    ids.iter().map(|id| record(id)).collect()
}

/// Source returning queued results in order.
///
/// Once the queue is drained it cancels `on_drained` (if set) and reports
/// `FetchError::Cancelled`.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<Record>, FetchError>>>,
    on_drained: Option<CancellationToken>,
    fetches: Mutex<usize>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Vec<Record>, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            on_drained: None,
            fetches: Mutex::new(0),
        }
    }

    pub fn listings(listings: Vec<Vec<Record>>) -> Self {
        Self::new(listings.into_iter().map(Ok).collect())
    }

    pub fn cancel_when_drained(mut self, cancel: CancellationToken) -> Self {
        self.on_drained = Some(cancel);
        self
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl RecordSource for ScriptedSource {
    async fn fetch(&self, _cancel: &CancellationToken) -> Result<Vec<Record>, FetchError> {
        *self.fetches.lock().unwrap() += 1;

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => {
                if let Some(cancel) = &self.on_drained {
                    cancel.cancel();
                }
                Err(FetchError::Cancelled)
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Welcome(usize),
    New(Vec<String>),
}

/// Notifier recording every call, optionally failing them all.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<Call>>,
    fail: bool,
    block: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Notifier that waits for cancellation on every call, like a channel
    /// stuck in retry backoff.
    pub fn blocking() -> Self {
        Self {
            block: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn announced_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::New(ids) => Some(ids),
                Call::Welcome(_) => None,
            })
            .flatten()
            .collect()
    }

    async fn outcome(&self, cancel: &CancellationToken) -> Result<(), NotifyError> {
        if self.block {
            cancel.cancelled().await;
            return Err(NotifyError::Cancelled);
        }
        if self.fail {
            return Err(NotifyError::Rejected {
                status: 500,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_new(
        &self,
        cancel: &CancellationToken,
        records: &[Record],
    ) -> Result<(), NotifyError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::New(records.iter().map(|r| r.id.clone()).collect()));
        self.outcome(cancel).await
    }

    async fn notify_welcome(
        &self,
        cancel: &CancellationToken,
        count: usize,
    ) -> Result<(), NotifyError> {
        self.calls.lock().unwrap().push(Call::Welcome(count));
        self.outcome(cancel).await
    }

    fn name(&self) -> &str {
        "recording"
    }
}

pub fn scheduler_config(state_file: &Path) -> SchedulerConfig {
    SchedulerConfig {
        interval: Duration::from_millis(10),
        fetch_timeout: Duration::from_secs(5),
        state_file: state_file.to_path_buf(),
        allow_empty: false,
    }
}

pub fn scheduler(
    state_file: &Path,
    store: SnapshotStore<Record>,
    source: Arc<ScriptedSource>,
    notifier: Arc<RecordingNotifier>,
) -> Scheduler {
    Scheduler::new(scheduler_config(state_file), store, source, notifier)
}
