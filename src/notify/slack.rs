//! Slack incoming-webhook notifier.
//!
//! Posts Block Kit messages: one per new record, plus a one-time welcome
//! message pointing at the full listing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::deliver_each;
use crate::interfaces::{Notifier, NotifyError};
use crate::record::Record;
use crate::utils::retry::RetryPolicy;

const NEW_RECORD_COLOR: &str = "#75FB4C";
const WELCOME_COLOR: &str = "#5C9DDB";

/// Slack webhook notifier.
pub struct SlackNotifier {
    client: Client,
    webhook_url: String,
    listing_url: String,
    retry: RetryPolicy,
}

impl SlackNotifier {
    /// Create a notifier posting to `webhook_url`.
    pub fn new(
        webhook_url: &str,
        listing_url: &str,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        if webhook_url.is_empty() {
            return Err(NotifyError::Config(
                "Slack webhook URL not configured".to_string(),
            ));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            webhook_url: webhook_url.to_string(),
            listing_url: listing_url.to_string(),
            retry,
        })
    }

    /// Message announcing one record.
    pub fn record_message(record: &Record) -> Value {
        let marker = if record.remote {
            ":globe_with_meridians:"
        } else {
            ":house:"
        };

        json!({
            "attachments": [{
                "color": NEW_RECORD_COLOR,
                "blocks": [
                    {
                        "type": "header",
                        "text": { "type": "plain_text", "text": "New listing published", "emoji": true }
                    },
                    {
                        "type": "section",
                        "text": {
                            "type": "mrkdwn",
                            "text": format!("`{}`\n{} {}", record.name, marker, record.group)
                        }
                    },
                    {
                        "type": "actions",
                        "elements": [{
                            "type": "button",
                            "text": { "type": "plain_text", "text": "Open listing" },
                            "url": record.link,
                            "style": "primary"
                        }]
                    }
                ]
            }]
        })
    }

    /// Message sent once when watching starts.
    pub fn welcome_message(count: usize, listing_url: &str) -> Value {
        let mut blocks = vec![
            json!({
                "type": "header",
                "text": { "type": "plain_text", "text": "Listing watch started", "emoji": true }
            }),
            json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        "There are currently {} entries on the listing. \
                         From now on only newly published ones will be announced here.",
                        count
                    )
                }
            }),
        ];

        if !listing_url.is_empty() {
            blocks.push(json!({
                "type": "actions",
                "elements": [{
                    "type": "button",
                    "text": { "type": "plain_text", "text": "Browse all entries" },
                    "url": listing_url,
                    "style": "primary"
                }]
            }));
        }

        json!({
            "attachments": [{
                "color": WELCOME_COLOR,
                "blocks": blocks
            }]
        })
    }

    /// Post one message to the webhook.
    async fn post(&self, message: &Value) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("Slack message posted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, body = %body, "Slack webhook rejected message");
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify_new(
        &self,
        cancel: &CancellationToken,
        records: &[Record],
    ) -> Result<(), NotifyError> {
        deliver_each(&self.retry, cancel, self.name(), records, |record| async move {
            self.post(&Self::record_message(record)).await
        })
        .await?;

        info!(count = records.len(), "Records announced on Slack");
        Ok(())
    }

    async fn notify_welcome(
        &self,
        cancel: &CancellationToken,
        count: usize,
    ) -> Result<(), NotifyError> {
        let message = Self::welcome_message(count, &self.listing_url);
        self.retry
            .run(cancel, self.name(), || self.post(&message))
            .await?;

        info!(count = count, "Welcome message posted to Slack");
        Ok(())
    }

    fn name(&self) -> &str {
        "slack"
    }
}
