//! Telegram Bot API notifier.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::deliver_each;
use crate::config::TelegramConfig;
use crate::interfaces::{Notifier, NotifyError};
use crate::record::Record;
use crate::utils::retry::RetryPolicy;

/// Notifier sending plain-text messages through `sendMessage`.
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: i64,
    listing_url: String,
    retry: RetryPolicy,
}

impl TelegramNotifier {
    pub fn new(
        config: &TelegramConfig,
        listing_url: &str,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        if config.token.is_empty() {
            return Err(NotifyError::Config(
                "Telegram bot token not configured".to_string(),
            ));
        }
        if config.chat_id == 0 {
            return Err(NotifyError::Config(
                "Telegram chat id not configured".to_string(),
            ));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_base.trim_end_matches('/'),
                config.token
            ),
            chat_id: config.chat_id,
            listing_url: listing_url.to_string(),
            retry,
        })
    }

    /// Request body announcing one record.
    pub fn record_message(chat_id: i64, record: &Record) -> Value {
        let place = if record.remote { "Remote" } else { "On site" };
        json!({
            "chat_id": chat_id,
            "text": format!(
                "New listing: {}\n{} ({})\n{}",
                record.name, record.group, place, record.link
            ),
            "disable_web_page_preview": true
        })
    }

    /// Request body sent once when watching starts.
    pub fn welcome_message(chat_id: i64, count: usize, listing_url: &str) -> Value {
        let mut body = json!({
            "chat_id": chat_id,
            "text": format!(
                "Listing watch started. There are currently {} entries on the listing; \
                 only newly published ones will be announced here.",
                count
            )
        });

        if !listing_url.is_empty() {
            body["reply_markup"] = json!({
                "inline_keyboard": [[{ "text": "Browse all entries", "url": listing_url }]]
            });
        }

        body
    }

    async fn send(&self, body: &Value) -> Result<(), NotifyError> {
        let response = self.client.post(&self.endpoint).json(body).send().await?;

        let status = response.status();
        if status.is_success() {
            debug!(chat_id = self.chat_id, "Telegram message sent");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        warn!(
            chat_id = self.chat_id,
            status = %status,
            body = %text,
            "Telegram rejected message"
        );
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body: text.chars().take(200).collect(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_new(
        &self,
        cancel: &CancellationToken,
        records: &[Record],
    ) -> Result<(), NotifyError> {
        deliver_each(&self.retry, cancel, self.name(), records, |record| async move {
            self.send(&Self::record_message(self.chat_id, record)).await
        })
        .await?;

        info!(count = records.len(), chat_id = self.chat_id, "Records announced on Telegram");
        Ok(())
    }

    async fn notify_welcome(
        &self,
        cancel: &CancellationToken,
        count: usize,
    ) -> Result<(), NotifyError> {
        let body = Self::welcome_message(self.chat_id, count, &self.listing_url);
        self.retry
            .run(cancel, self.name(), || self.send(&body))
            .await?;

        info!(count = count, chat_id = self.chat_id, "Welcome message sent to Telegram");
        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(api_base: &str) -> TelegramConfig {
        TelegramConfig {
            token: "123:abc".to_string(),
            chat_id: -42,
            api_base: api_base.to_string(),
        }
    }

    fn record(id: &str) -> Record {
        Record {
            id: id.to_string(),
            name: "Data engineer".to_string(),
            group: "Analytics".to_string(),
            link: format!("https://example.com/vacancies/{}", id),
            remote: false,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_requires_token_and_chat() {
        let mut missing_token = config("https://api.telegram.org");
        missing_token.token.clear();
        assert!(TelegramNotifier::new(
            &missing_token,
            "",
            RetryPolicy::default(),
            Duration::from_secs(1)
        )
        .is_err());

        let mut missing_chat = config("https://api.telegram.org");
        missing_chat.chat_id = 0;
        assert!(TelegramNotifier::new(
            &missing_chat,
            "",
            RetryPolicy::default(),
            Duration::from_secs(1)
        )
        .is_err());
    }

    #[test]
    fn test_welcome_has_keyboard_when_listing_known() {
        let body = TelegramNotifier::welcome_message(1, 3, "https://example.com/vacancies");
        assert_eq!(
            body["reply_markup"]["inline_keyboard"][0][0]["url"],
            "https://example.com/vacancies"
        );

        let bare = TelegramNotifier::welcome_message(1, 3, "");
        assert!(bare.get("reply_markup").is_none());
    }

    #[tokio::test]
    async fn test_sends_to_bot_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({ "chat_id": -42 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new(
            &config(&server.uri()),
            "",
            RetryPolicy::immediate(1),
            Duration::from_secs(5),
        )
        .unwrap();

        notifier
            .notify_new(&CancellationToken::new(), &[record("de")])
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        assert!(body["text"]
            .as_str()
            .unwrap()
            .contains("https://example.com/vacancies/de"));
    }

    #[tokio::test]
    async fn test_rejected_message_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new(
            &config(&server.uri()),
            "",
            RetryPolicy::immediate(2),
            Duration::from_secs(5),
        )
        .unwrap();

        let result = notifier
            .notify_welcome(&CancellationToken::new(), 1)
            .await;

        assert!(matches!(result, Err(NotifyError::Delivery { .. })));
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }
}
