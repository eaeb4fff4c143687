//! URL inventory models.
//!
//! Every page of a market's site is tracked as a [`UrlRecord`] that moves
//! through a small lifecycle: discovered as `pending`, then terminally
//! `fetched`, `failed` or `skipped` (duplicate content).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an inventoried URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlStatus {
    Pending,
    Fetched,
    Failed,
    Skipped,
}

impl UrlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetched => "fetched",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "fetched" => Some(Self::Fetched),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Whether the URL has reached a final state for this fetch cycle.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// How a page's markup was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Markup served directly over HTTP.
    Static,
    /// Markup captured from a headless browser after scripts ran.
    Rendered,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Rendered => "rendered",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "static" => Some(Self::Static),
            "rendered" => Some(Self::Rendered),
            _ => None,
        }
    }
}

/// A URL found while walking a site's sitemaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredUrl {
    pub url: String,
    /// Sitemap the URL was listed in.
    pub discovered_from: String,
    pub lastmod: Option<String>,
}

impl DiscoveredUrl {
    pub fn new(url: impl Into<String>, discovered_from: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            discovered_from: discovered_from.into(),
            lastmod: None,
        }
    }

    pub fn with_lastmod(mut self, lastmod: Option<String>) -> Self {
        self.lastmod = lastmod;
        self
    }
}

/// One row of the URL inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlRecord {
    pub id: i64,
    pub market: String,
    pub url: String,
    pub discovered_from: String,
    pub sitemap_lastmod: Option<String>,
    pub status: UrlStatus,
    pub render_mode: Option<RenderMode>,
    pub http_status: Option<u16>,
    pub final_url: Option<String>,
    pub canonical_url: Option<String>,
    pub content_hash: Option<String>,
    /// Earliest fetched record sharing this record's content hash.
    pub duplicate_of_id: Option<i64>,
    pub error_message: Option<String>,
    /// Content store pointer for the cached markup.
    pub html_path: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub html_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UrlRecord {
    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of_id.is_some()
    }

    pub fn is_cached(&self) -> bool {
        self.html_path.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Per-market status counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryStats {
    pub market: String,
    pub total: u64,
    pub pending: u64,
    pub fetched: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Count of records captured with a given render mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderStat {
    pub market: String,
    pub render_mode: RenderMode,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            UrlStatus::Pending,
            UrlStatus::Fetched,
            UrlStatus::Failed,
            UrlStatus::Skipped,
        ] {
            assert_eq!(UrlStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(UrlStatus::from_str("fetching"), None);
        assert!(!UrlStatus::Pending.is_terminal());
        assert!(UrlStatus::Skipped.is_terminal());
    }

    #[test]
    fn render_mode_parses_known_values_only() {
        assert_eq!(RenderMode::from_str("rendered"), Some(RenderMode::Rendered));
        assert_eq!(RenderMode::from_str("headless"), None);
    }
}
