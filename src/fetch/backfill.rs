//! Cache backfill for pages fetched before the content store existed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{FetchError, PageSource};
use crate::models::UrlRecord;
use crate::repository::InventoryRepository;
use crate::scrapers::IntervalLimiter;
use crate::storage::ContentStore;

/// Backfill settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    pub market: String,
    pub concurrency: usize,
    pub request_interval: Duration,
    pub batch_size: usize,
    /// Skip rows marked as duplicates.
    pub unique_only: bool,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            market: "UK".to_string(),
            concurrency: 3,
            request_interval: Duration::from_millis(1000),
            batch_size: 200,
            unique_only: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillStats {
    pub processed: usize,
    pub cached: usize,
    pub failed: usize,
}

/// Fetches and caches markup for `fetched` rows that have no cache pointer.
pub struct CacheBackfill<S> {
    config: BackfillConfig,
    repo: Arc<InventoryRepository>,
    store: Arc<ContentStore>,
    source: Arc<S>,
}

impl<S: PageSource + 'static> CacheBackfill<S> {
    pub fn new(
        config: BackfillConfig,
        repo: Arc<InventoryRepository>,
        store: Arc<ContentStore>,
        source: Arc<S>,
    ) -> Self {
        Self {
            config,
            repo,
            store,
            source,
        }
    }

    /// Cache up to `limit` (default: batch size) uncached pages.
    pub async fn run(&self, limit: Option<usize>) -> Result<BackfillStats, FetchError> {
        let limit = limit.unwrap_or(self.config.batch_size);
        let records =
            self.repo
                .missing_cache(&self.config.market, self.config.unique_only, limit)?;

        if records.is_empty() {
            info!("No URLs need HTML caching for {}", self.config.market);
            return Ok(BackfillStats::default());
        }

        info!(
            "Starting HTML cache backfill for {}: {} URLs",
            self.config.market,
            records.len()
        );

        let processed = Arc::new(AtomicUsize::new(0));
        let cached = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let limiter = IntervalLimiter::new(self.config.request_interval);
        let count = records.len();
        let queue = Arc::new(Mutex::new(VecDeque::from(records)));

        let workers = self.config.concurrency.max(1).min(count);
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let queue = queue.clone();
            let limiter = limiter.clone();
            let repo = self.repo.clone();
            let store = self.store.clone();
            let source = self.source.clone();
            let processed = processed.clone();
            let cached = cached.clone();
            let failed = failed.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let next = queue.lock().await.pop_front();
                    let Some(record) = next else { break };

                    limiter.acquire().await;
                    match cache_one(&record, &*repo, &store, &*source).await {
                        Ok(path) => {
                            debug!("Cached {} at {}", record.url, path);
                            cached.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            warn!("Failed to cache {}: {}", record.url, e);
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    processed.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Backfill worker panicked: {}", e);
            }
        }

        let stats = BackfillStats {
            processed: processed.load(Ordering::Relaxed),
            cached: cached.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
        };
        info!(
            "Backfill done: {} processed, {} cached, {} failed",
            stats.processed, stats.cached, stats.failed
        );
        Ok(stats)
    }
}

async fn cache_one<S: PageSource>(
    record: &UrlRecord,
    repo: &InventoryRepository,
    store: &ContentStore,
    source: &S,
) -> Result<String, FetchError> {
    let target = record.final_url.as_deref().unwrap_or(&record.url);
    let page = source.fetch(target).await?;
    if !(200..300).contains(&page.status) {
        return Err(FetchError::Status {
            url: target.to_string(),
            status: page.status,
        });
    }

    let path = store.put(&record.market, record.id, &page.html)?;
    repo.set_cache_pointer(record.id, &path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchedPage;
    use crate::models::{DiscoveredUrl, RenderMode};
    use crate::repository::FetchOutcome;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FixedSource;

    #[async_trait]
    impl PageSource for FixedSource {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            let status = if url.ends_with("/gone") { 410 } else { 200 };
            Ok(FetchedPage {
                status,
                final_url: url.to_string(),
                html: format!("<html><body>{}</body></html>", url),
            })
        }

        async fn render(&self, url: &str) -> Result<FetchedPage, FetchError> {
            self.fetch(url).await
        }
    }

    #[tokio::test]
    async fn caches_uncached_unique_rows() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(InventoryRepository::new(&dir.path().join("cutool.db")).unwrap());
        let store = Arc::new(ContentStore::new(dir.path()));
        let urls = ["https://example.com/a", "https://example.com/b", "https://example.com/gone"];
        let discovered: Vec<_> = urls.iter().map(|u| DiscoveredUrl::new(*u, "s")).collect();
        repo.upsert_discovered("UK", &discovered).unwrap();

        for (i, record) in repo.pending("UK", 10).unwrap().iter().enumerate() {
            repo.record_outcome(
                record.id,
                &FetchOutcome::Fetched {
                    http_status: 200,
                    final_url: record.url.clone(),
                    canonical_url: None,
                    content_hash: format!("h{}", i),
                    render_mode: RenderMode::Static,
                    html_path: String::new(),
                },
            )
            .unwrap();
        }
        assert_eq!(repo.cache_status("UK").unwrap().remaining, 3);

        let config = BackfillConfig {
            request_interval: Duration::ZERO,
            ..BackfillConfig::default()
        };
        let backfill = CacheBackfill::new(config, repo.clone(), store.clone(), Arc::new(FixedSource));
        let stats = backfill.run(None).await.unwrap();

        assert_eq!(stats, BackfillStats { processed: 3, cached: 2, failed: 1 });
        let status = repo.cache_status("UK").unwrap();
        assert_eq!(status.cached, 2);
        assert_eq!(status.remaining, 1);

        let a = repo.get_by_url("UK", "https://example.com/a").unwrap().unwrap();
        assert!(a.html_fetched_at.is_some());
        assert!(store.get(a.html_path.as_deref().unwrap()).unwrap().contains("example.com/a"));
    }
}
