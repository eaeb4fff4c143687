//! Inventory building from robots.txt and sitemaps.
//!
//! Sitemap indexes are walked with an explicit work queue so that deep or
//! cyclic index graphs cannot blow the stack; every sitemap URL is fetched at
//! most once and the walk is capped at [`MAX_SITEMAPS`] fetches.

pub mod sitemap;

pub use sitemap::{deduplicate_urls, normalize_url, parse_robots, parse_sitemap, SitemapDocument};

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{DiscoveredUrl, InventoryStats};
use crate::repository::{InventoryRepository, RepositoryError};
use crate::scrapers::HttpClient;

/// Upper bound on sitemap documents fetched per discovery run.
pub const MAX_SITEMAPS: usize = 100;

/// Delay before each sitemap fetch below the seed level.
pub const SITEMAP_POLITENESS: Duration = Duration::from_millis(50);

/// Errors from inventory discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Source of sitemap and robots.txt documents.
#[async_trait]
pub trait SitemapFetcher: Send + Sync {
    /// Fetch a document body; non-2xx responses are errors.
    async fn fetch_text(&self, url: &str) -> Result<String, DiscoveryError>;
}

#[async_trait]
impl SitemapFetcher for HttpClient {
    async fn fetch_text(&self, url: &str) -> Result<String, DiscoveryError> {
        let response = self.get(url).await?;
        if !response.is_success() {
            return Err(DiscoveryError::Status {
                url: url.to_string(),
                status: response.status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

/// Outcome of building a market's inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryBuildResult {
    pub market: String,
    pub base_url: String,
    /// Entries read from sitemaps before deduplication.
    pub discovered: usize,
    /// Distinct normalized URLs.
    pub unique: usize,
    pub inserted: usize,
    pub updated: usize,
    pub stats: InventoryStats,
}

/// Discovers a site's pages from its sitemaps and upserts them.
pub struct InventoryBuilder<F> {
    fetcher: F,
    politeness: Duration,
}

impl<F: SitemapFetcher> InventoryBuilder<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            politeness: SITEMAP_POLITENESS,
        }
    }

    /// Override the delay between nested sitemap fetches.
    pub fn with_politeness(mut self, delay: Duration) -> Self {
        self.politeness = delay;
        self
    }

    /// Sitemap seeds from robots.txt, or `{base}/sitemap.xml`.
    async fn seeds(&self, base: &str) -> Vec<String> {
        let robots_url = format!("{}/robots.txt", base);
        debug!("Checking robots.txt at {}", robots_url);

        let listed = match self.fetcher.fetch_text(&robots_url).await {
            Ok(text) => parse_robots(&text),
            Err(e) => {
                debug!("robots.txt unavailable: {}", e);
                Vec::new()
            }
        };

        if listed.is_empty() {
            vec![format!("{}/sitemap.xml", base)]
        } else {
            listed
        }
    }

    /// Walk every sitemap reachable from the site's seeds, returning raw
    /// entries in document order.
    async fn crawl(&self, base_url: &str) -> Vec<DiscoveredUrl> {
        let base = base_url.trim_end_matches('/');
        let seeds = self.seeds(base).await;

        let mut found = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        // Stack of (sitemap URL, depth); children are pushed in reverse so
        // they pop in document order.
        let mut pending: Vec<(String, usize)> =
            seeds.into_iter().rev().map(|s| (s, 0)).collect();

        while let Some((sitemap_url, depth)) = pending.pop() {
            let sitemap_url = sitemap_url.trim().to_string();
            if sitemap_url.is_empty() || visited.contains(&sitemap_url) {
                continue;
            }
            if visited.len() >= MAX_SITEMAPS {
                warn!(
                    "Sitemap limit of {} reached; {} sitemaps left unvisited",
                    MAX_SITEMAPS,
                    pending.len() + 1
                );
                break;
            }
            visited.insert(sitemap_url.clone());

            if depth > 0 && !self.politeness.is_zero() {
                tokio::time::sleep(self.politeness).await;
            }

            debug!("Fetching sitemap: {}", sitemap_url);
            let xml = match self.fetcher.fetch_text(&sitemap_url).await {
                Ok(xml) => xml,
                Err(e) => {
                    warn!("Skipping sitemap {}: {}", sitemap_url, e);
                    continue;
                }
            };

            match parse_sitemap(&xml) {
                SitemapDocument::Index(children) => {
                    debug!("{} is an index with {} sitemaps", sitemap_url, children.len());
                    for child in children.into_iter().rev() {
                        if !visited.contains(child.trim()) {
                            pending.push((child, depth + 1));
                        }
                    }
                }
                SitemapDocument::UrlSet(entries) => {
                    debug!("{} lists {} URLs", sitemap_url, entries.len());
                    found.extend(entries.into_iter().map(|entry| {
                        DiscoveredUrl::new(entry.loc, sitemap_url.clone())
                            .with_lastmod(entry.lastmod)
                    }));
                }
                SitemapDocument::Unknown => {
                    debug!("{} is not a sitemap; ignoring", sitemap_url);
                }
            }
        }

        found
    }

    /// Discover the site's distinct page URLs.
    pub async fn discover(&self, base_url: &str) -> Vec<DiscoveredUrl> {
        deduplicate_urls(self.crawl(base_url).await)
    }

    /// Discover pages and upsert them into the market's inventory.
    pub async fn build(
        &self,
        repo: &InventoryRepository,
        market: &str,
        base_url: &str,
    ) -> Result<InventoryBuildResult, DiscoveryError> {
        let raw = self.crawl(base_url).await;
        let discovered = raw.len();
        let unique = deduplicate_urls(raw);

        let upsert = repo.upsert_discovered(market, &unique)?;
        let stats = repo.stats(market)?;

        info!(
            "Inventory for {}: {} discovered, {} unique, {} new",
            market,
            discovered,
            unique.len(),
            upsert.inserted
        );

        Ok(InventoryBuildResult {
            market: market.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            discovered,
            unique: unique.len(),
            inserted: upsert.inserted,
            updated: upsert.updated,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serves canned documents and records every request.
    struct StaticFetcher {
        docs: HashMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl StaticFetcher {
        fn new(docs: &[(&str, &str)]) -> Self {
            Self {
                docs: docs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SitemapFetcher for StaticFetcher {
        async fn fetch_text(&self, url: &str) -> Result<String, DiscoveryError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.docs.get(url).cloned().ok_or_else(|| DiscoveryError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn urlset(urls: &[&str]) -> String {
        let body: String = urls
            .iter()
            .map(|u| format!("<url><loc>{}</loc></url>", u))
            .collect();
        format!("<urlset>{}</urlset>", body)
    }

    #[tokio::test]
    async fn falls_back_to_sitemap_xml() {
        let page = urlset(&["https://example.com/a/", "https://example.com/b"]);
        let fetcher = StaticFetcher::new(&[("https://example.com/sitemap.xml", page.as_str())]);
        let builder = InventoryBuilder::new(fetcher).with_politeness(Duration::ZERO);

        let urls = builder.discover("https://example.com/").await;
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].url, "https://example.com/a");
        assert_eq!(urls[0].discovered_from, "https://example.com/sitemap.xml");
    }

    #[tokio::test]
    async fn walks_index_once_and_skips_failures() {
        let robots = "Sitemap: https://example.com/index.xml\n";
        let index = "<sitemapindex>\
            <sitemap><loc>https://example.com/one.xml</loc></sitemap>\
            <sitemap><loc>https://example.com/missing.xml</loc></sitemap>\
            <sitemap><loc>https://example.com/index.xml</loc></sitemap>\
            <sitemap><loc>https://example.com/two.xml</loc></sitemap>\
            </sitemapindex>";
        let one = urlset(&["https://example.com/a", "https://example.com/shared"]);
        let two = urlset(&["https://example.com/SHARED/", "https://example.com/c"]);
        let fetcher = StaticFetcher::new(&[
            ("https://example.com/robots.txt", robots),
            ("https://example.com/index.xml", index),
            ("https://example.com/one.xml", one.as_str()),
            ("https://example.com/two.xml", two.as_str()),
        ]);
        let builder = InventoryBuilder::new(fetcher).with_politeness(Duration::ZERO);

        let urls = builder.discover("https://example.com").await;
        let found: Vec<&str> = urls.iter().map(|u| u.url.as_str()).collect();
        assert_eq!(
            found,
            vec![
                "https://example.com/a",
                "https://example.com/shared",
                "https://example.com/c"
            ]
        );
        assert_eq!(urls[1].discovered_from, "https://example.com/one.xml");

        // Index fetched once despite listing itself; children in document order.
        assert_eq!(
            builder.fetcher.requests(),
            vec![
                "https://example.com/robots.txt",
                "https://example.com/index.xml",
                "https://example.com/one.xml",
                "https://example.com/missing.xml",
                "https://example.com/two.xml",
            ]
        );
    }

    #[tokio::test]
    async fn traversal_is_capped() {
        // A chain of indexes longer than the cap.
        let docs: Vec<(String, String)> = (0..MAX_SITEMAPS + 10)
            .map(|i| {
                (
                    format!("https://example.com/s{}.xml", i),
                    format!(
                        "<sitemapindex><sitemap><loc>https://example.com/s{}.xml</loc></sitemap></sitemapindex>",
                        i + 1
                    ),
                )
            })
            .collect();
        let mut refs: Vec<(&str, &str)> =
            docs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        refs.push(("https://example.com/robots.txt", "Sitemap: https://example.com/s0.xml"));
        let builder = InventoryBuilder::new(StaticFetcher::new(&refs)).with_politeness(Duration::ZERO);

        assert!(builder.discover("https://example.com").await.is_empty());
        // robots.txt plus the capped number of sitemaps.
        assert_eq!(builder.fetcher.requests().len(), MAX_SITEMAPS + 1);
    }

    #[tokio::test]
    async fn build_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let repo = InventoryRepository::new(&dir.path().join("cutool.db")).unwrap();
        let page = urlset(&["https://example.com/a", "https://example.com/a/", "https://example.com/b"]);
        let fetcher = StaticFetcher::new(&[("https://example.com/sitemap.xml", page.as_str())]);
        let builder = InventoryBuilder::new(fetcher).with_politeness(Duration::ZERO);

        let first = builder.build(&repo, "UK", "https://example.com").await.unwrap();
        assert_eq!(first.discovered, 3);
        assert_eq!(first.unique, 2);
        assert_eq!(first.inserted, 2);
        assert_eq!(first.stats.total, 2);

        let second = builder.build(&repo, "UK", "https://example.com").await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 2);
        assert_eq!(second.stats.total, 2);
        assert_eq!(second.stats.pending, 2);
    }
}
