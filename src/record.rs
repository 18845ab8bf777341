//! Listing record model.
//!
//! A `Record` is one entry observed on the watched listing page. Its `id` is
//! derived from the canonical link path and is the only stable key; every
//! other field may change between observations without the record being
//! considered new.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// One observed listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier: last path segment of the record link.
    pub id: String,
    /// Display name of the entry.
    pub name: String,
    /// Team or category label.
    pub group: String,
    /// Absolute URL of the entry.
    pub link: String,
    /// Whether the group marks the entry as remote.
    pub remote: bool,
    /// When this observation was extracted. Not stable across observations.
    pub observed_at: DateTime<Utc>,
}

impl Record {
    /// Build a record from its link, deriving the id.
    ///
    /// Returns `None` when the link has no usable path segment.
    pub fn from_link(
        link: &Url,
        name: impl Into<String>,
        group: impl Into<String>,
        remote_prefix: &str,
    ) -> Option<Self> {
        let id = id_from_link(link)?;
        let group = normalize_group(&group.into());
        let remote = !remote_prefix.is_empty() && group.starts_with(remote_prefix);

        Some(Self {
            id,
            name: name.into().trim().to_string(),
            group,
            link: link.to_string(),
            remote,
            observed_at: Utc::now(),
        })
    }
}

/// Derive a record id from the last non-empty path segment of a link.
pub fn id_from_link(link: &Url) -> Option<String> {
    link.path_segments()?
        .rfind(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Normalize a group label: trim and collapse spacing around `/` separators.
pub fn normalize_group(raw: &str) -> String {
    raw.split('/')
        .map(|part| part.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" / ")
}
