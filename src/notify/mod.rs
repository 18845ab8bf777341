//! Notification channels.
//!
//! Every channel implements `Notifier` and routes each outgoing message
//! through the shared `RetryPolicy`, so retry semantics are identical across
//! channels:
//!
//! - `SlackNotifier` - Slack incoming webhook
//! - `TelegramNotifier` - Telegram Bot API
//! - `LogNotifier` - writes announcements to the log only
//! - `FanoutNotifier` - delivers to several channels

mod slack;
mod telegram;

pub use slack::SlackNotifier;
pub use telegram::TelegramNotifier;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{NotifyChannel, NotifyConfig};
use crate::interfaces::{Notifier, NotifyError};
use crate::record::Record;
use crate::utils::retry::{RetryError, RetryPolicy};

impl From<RetryError<NotifyError>> for NotifyError {
    fn from(err: RetryError<NotifyError>) -> Self {
        match err {
            RetryError::Cancelled => NotifyError::Cancelled,
            RetryError::Exhausted { last, .. } => match last {
                NotifyError::Cancelled => NotifyError::Cancelled,
                other => NotifyError::Delivery {
                    failed: 1,
                    total: 1,
                    last_error: other.to_string(),
                },
            },
        }
    }
}

/// Send one message per record, each under `policy`.
///
/// A record whose message cannot be delivered does not stop the others.
/// Cancellation aborts the whole batch immediately.
pub(crate) async fn deliver_each<'a, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    channel: &str,
    records: &'a [Record],
    send: F,
) -> Result<(), NotifyError>
where
    F: Fn(&'a Record) -> Fut,
    Fut: Future<Output = Result<(), NotifyError>>,
{
    let mut failed = 0;
    let mut last_error = None;

    for record in records {
        match policy.run(cancel, channel, || send(record)).await {
            Ok(()) => {
                debug!(channel = %channel, id = %record.id, "Record announced");
            }
            Err(RetryError::Cancelled) => return Err(NotifyError::Cancelled),
            Err(RetryError::Exhausted { attempts, last }) => {
                error!(
                    channel = %channel,
                    id = %record.id,
                    attempts = attempts,
                    error = %last,
                    "Failed to announce record"
                );
                failed += 1;
                last_error = Some(last.to_string());
            }
        }
    }

    match last_error {
        Some(last_error) => Err(NotifyError::Delivery {
            failed,
            total: records.len(),
            last_error,
        }),
        None => Ok(()),
    }
}

/// Build the notifier described by `config`.
///
/// Several channels are wrapped in a `FanoutNotifier`.
pub fn build_notifier(
    config: &NotifyConfig,
    retry: RetryPolicy,
) -> Result<Arc<dyn Notifier>, NotifyError> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    for channel in &config.channels {
        let notifier: Arc<dyn Notifier> = match channel {
            NotifyChannel::Log => Arc::new(LogNotifier),
            NotifyChannel::Slack => Arc::new(SlackNotifier::new(
                &config.slack.webhook_url,
                &config.listing_url,
                retry.clone(),
                timeout,
            )?),
            NotifyChannel::Telegram => Arc::new(TelegramNotifier::new(
                &config.telegram,
                &config.listing_url,
                retry.clone(),
                timeout,
            )?),
        };
        info!(channel = %notifier.name(), "Notification channel enabled");
        notifiers.push(notifier);
    }

    match notifiers.len() {
        0 => Err(NotifyError::Config(
            "no notification channel configured".to_string(),
        )),
        1 => Ok(notifiers.remove(0)),
        _ => Ok(Arc::new(FanoutNotifier::new(notifiers))),
    }
}

/// Notifier that delivers to every inner channel.
///
/// All channels are attempted; the first error is reported.
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn notify_new(
        &self,
        cancel: &CancellationToken,
        records: &[Record],
    ) -> Result<(), NotifyError> {
        let mut first_error: Option<NotifyError> = None;

        for notifier in &self.notifiers {
            match notifier.notify_new(cancel, records).await {
                Ok(()) => {}
                Err(NotifyError::Cancelled) => return Err(NotifyError::Cancelled),
                Err(e) => {
                    error!(channel = %notifier.name(), error = %e, "Notification channel failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn notify_welcome(
        &self,
        cancel: &CancellationToken,
        count: usize,
    ) -> Result<(), NotifyError> {
        let mut first_error: Option<NotifyError> = None;

        for notifier in &self.notifiers {
            match notifier.notify_welcome(cancel, count).await {
                Ok(()) => {}
                Err(NotifyError::Cancelled) => return Err(NotifyError::Cancelled),
                Err(e) => {
                    error!(channel = %notifier.name(), error = %e, "Notification channel failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "fanout"
    }
}

/// Notifier that only logs. Useful as a dry run.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_new(
        &self,
        cancel: &CancellationToken,
        records: &[Record],
    ) -> Result<(), NotifyError> {
        for record in records {
            if cancel.is_cancelled() {
                return Err(NotifyError::Cancelled);
            }
            info!(
                id = %record.id,
                name = %record.name,
                group = %record.group,
                link = %record.link,
                remote = record.remote,
                "New record"
            );
        }
        Ok(())
    }

    async fn notify_welcome(
        &self,
        cancel: &CancellationToken,
        count: usize,
    ) -> Result<(), NotifyError> {
        if cancel.is_cancelled() {
            return Err(NotifyError::Cancelled);
        }
        info!(count = count, "Watching listing");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;

    use super::*;

    fn record(id: &str) -> Record {
        Record {
            id: id.to_string(),
            name: id.to_uppercase(),
            group: "Backend".to_string(),
            link: format!("https://example.com/v/{}", id),
            remote: false,
            observed_at: Utc::now(),
        }
    }

    struct CountingNotifier {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingNotifier {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify_new(
            &self,
            _cancel: &CancellationToken,
            _records: &[Record],
        ) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotifyError::Config("broken".to_string()))
            } else {
                Ok(())
            }
        }

        async fn notify_welcome(
            &self,
            cancel: &CancellationToken,
            _count: usize,
        ) -> Result<(), NotifyError> {
            self.notify_new(cancel, &[]).await
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_fanout_attempts_every_channel() {
        let failing = Arc::new(CountingNotifier::new(true));
        let working = Arc::new(CountingNotifier::new(false));
        let fanout = FanoutNotifier::new(vec![
            Arc::clone(&failing) as Arc<dyn Notifier>,
            Arc::clone(&working) as Arc<dyn Notifier>,
        ]);

        let result = fanout
            .notify_new(&CancellationToken::new(), &[record("a")])
            .await;

        assert!(matches!(result, Err(NotifyError::Config(_))));
        assert_eq!(failing.calls(), 1);
        assert_eq!(working.calls(), 1);
    }

    #[tokio::test]
    async fn test_deliver_each_continues_after_failure() {
        let records = vec![record("a"), record("b"), record("c")];
        let sent = AtomicUsize::new(0);

        let result = deliver_each(
            &RetryPolicy::immediate(2),
            &CancellationToken::new(),
            "test",
            &records,
            |record| {
                let fail = record.id == "b";
                if !fail {
                    sent.fetch_add(1, Ordering::SeqCst);
                }
                async move {
                    if fail {
                        Err(NotifyError::Rejected {
                            status: 500,
                            body: "nope".to_string(),
                        })
                    } else {
                        Ok(())
                    }
                }
            },
        )
        .await;

        assert_eq!(sent.load(Ordering::SeqCst), 2);
        match result {
            Err(NotifyError::Delivery { failed, total, .. }) => {
                assert_eq!(failed, 1);
                assert_eq!(total, 3);
            }
            other => panic!("expected delivery error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deliver_each_stops_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = deliver_each(
            &RetryPolicy::immediate(2),
            &cancel,
            "test",
            &[record("a")],
            |_| async { Ok(()) },
        )
        .await;

        assert!(matches!(result, Err(NotifyError::Cancelled)));
    }

    #[tokio::test]
    async fn test_log_notifier_respects_cancel() {
        let cancel = CancellationToken::new();
        assert!(LogNotifier.notify_welcome(&cancel, 3).await.is_ok());

        cancel.cancel();
        assert!(matches!(
            LogNotifier.notify_new(&cancel, &[record("a")]).await,
            Err(NotifyError::Cancelled)
        ));
    }

    #[test]
    fn test_build_notifier_requires_channel() {
        let config = NotifyConfig {
            channels: vec![],
            ..Default::default()
        };
        assert!(build_notifier(&config, RetryPolicy::default()).is_err());
    }

    #[test]
    fn test_build_single_log_channel() {
        let config = NotifyConfig::default();
        let notifier = build_notifier(&config, RetryPolicy::default()).unwrap();
        assert_eq!(notifier.name(), "log");
    }
}
