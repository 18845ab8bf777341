//! Listing page source using reqwest + scraper.
//!
//! Fetches a single static HTML page and extracts one record per element
//! matched by the item selector. The record link comes from the item's own
//! `href`, or from the first anchor inside it.
//!
//! The page URL is `base_url` and `path` joined by a single `/`, and a
//! root-relative `href` is appended to `base_url` as is, so a base with a
//! path prefix (`https://example.com/ru`) keeps that prefix.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::config::ScrapeConfig;
use crate::interfaces::{FetchError, RecordSource};
use crate::record::Record;

const USER_AGENT: &str = concat!("listing-watch/", env!("CARGO_PKG_VERSION"));

/// Compiled selectors for one listing layout.
struct ListingSelectors {
    item: Selector,
    name: Selector,
    group: Selector,
    anchor: Selector,
}

fn parse_selector(selector: &str) -> Result<Selector, FetchError> {
    Selector::parse(selector).map_err(|e| FetchError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Source reading records from an HTML listing page.
pub struct HtmlListingSource {
    client: Client,
    /// `base_url` without trailing slashes.
    base: String,
    page_url: Url,
    selectors: ListingSelectors,
    remote_prefix: String,
}

impl HtmlListingSource {
    /// Build a source from scrape configuration.
    ///
    /// Fails if the URLs or selectors are invalid.
    pub fn new(config: &ScrapeConfig) -> Result<Self, FetchError> {
        let base = config.base_url.trim().trim_end_matches('/').to_string();
        Url::parse(&base).map_err(|e| FetchError::Parse(format!("invalid base_url: {}", e)))?;

        let page_url = Url::parse(&format!(
            "{}/{}",
            base,
            config.path.trim().trim_start_matches('/')
        ))
        .map_err(|e| FetchError::Parse(format!("invalid listing path: {}", e)))?;

        let selectors = ListingSelectors {
            item: parse_selector(&config.item_selector)?,
            name: parse_selector(&config.name_selector)?,
            group: parse_selector(&config.group_selector)?,
            anchor: parse_selector("a[href]")?,
        };

        let client = Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            client,
            base,
            page_url,
            selectors,
            remote_prefix: config.remote_prefix.clone(),
        })
    }

    /// URL of the watched page.
    pub fn page_url(&self) -> &Url {
        &self.page_url
    }

    /// Extract records from listing markup, in document order.
    pub fn parse_listing(&self, html: &str) -> Vec<Record> {
        let document = Html::parse_document(html);

        document
            .select(&self.selectors.item)
            .filter_map(|item| self.parse_item(item))
            .collect()
    }

    fn parse_item(&self, item: ElementRef<'_>) -> Option<Record> {
        let href = item.value().attr("href").or_else(|| {
            item.select(&self.selectors.anchor)
                .next()
                .and_then(|anchor| anchor.value().attr("href"))
        });

        let Some(href) = href else {
            warn!("Listing item without link, skipping");
            return None;
        };

        let link = match self.resolve_link(href.trim()) {
            Ok(link) => link,
            Err(e) => {
                warn!(href = %href, error = %e, "Listing item with invalid link, skipping");
                return None;
            }
        };

        let name = first_text(item, &self.selectors.name);
        let group = first_text(item, &self.selectors.group);

        let record = Record::from_link(&link, name, group, &self.remote_prefix);
        if record.is_none() {
            warn!(link = %link, "Listing item link has no id segment, skipping");
        }
        record
    }

    /// Absolute links are kept, root-relative ones are appended to the base,
    /// anything else is resolved against the page URL.
    fn resolve_link(&self, href: &str) -> Result<Url, url::ParseError> {
        match Url::parse(href) {
            Ok(link) => Ok(link),
            Err(url::ParseError::RelativeUrlWithoutBase) if href.starts_with("//") => {
                self.page_url.join(href)
            }
            Err(url::ParseError::RelativeUrlWithoutBase) if href.starts_with('/') => {
                Url::parse(&format!("{}{}", self.base, href))
            }
            Err(url::ParseError::RelativeUrlWithoutBase) => self.page_url.join(href),
            Err(e) => Err(e),
        }
    }

    async fn fetch_page(&self) -> Result<String, FetchError> {
        let response = self.client.get(self.page_url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}

fn first_text(item: ElementRef<'_>, selector: &Selector) -> String {
    item.select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl RecordSource for HtmlListingSource {
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<Record>, FetchError> {
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            body = self.fetch_page() => body?,
        };

        let records = self.parse_listing(&body);
        debug!(url = %self.page_url, count = records.len(), "Listing parsed");
        Ok(records)
    }

    fn name(&self) -> &str {
        "html"
    }
}
