//! Page capture pipeline.
//!
//! Pending inventory URLs are fetched over HTTP with retries, rendered in a
//! headless browser when the static markup is a script shell, fingerprinted
//! for duplicate detection and written to the content store.

pub mod backfill;
pub mod fingerprint;
pub mod signature;

pub use backfill::{BackfillConfig, BackfillStats, CacheBackfill};
pub use fingerprint::ContentFingerprint;
pub use signature::DomSignature;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::models::{RenderMode, UrlRecord, UrlStatus};
use crate::repository::{FetchOutcome, InventoryRepository, RepositoryError};
use crate::scrapers::{is_transient_status, BrowserSession, HttpClient, IntervalLimiter, RenderError};
use crate::storage::{ContentStore, StorageError};

/// Errors raised while capturing a single page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Cache write failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Markup returned by a page source.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    /// Post-redirect URL for static fetches; the requested URL for renders.
    pub final_url: String,
    pub html: String,
}

/// Where page markup comes from.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// One plain HTTP attempt. Any received response is `Ok`, whatever its status.
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;

    /// Render the page in a browser.
    async fn render(&self, url: &str) -> Result<FetchedPage, FetchError>;

    /// Release per-batch resources.
    async fn finish_batch(&self) {}
}

/// Live HTTP plus headless-browser page source.
pub struct LivePageSource {
    http: HttpClient,
    browser: BrowserSession,
}

impl LivePageSource {
    pub fn new(http: HttpClient, browser: BrowserSession) -> Self {
        Self { http, browser }
    }
}

#[async_trait]
impl PageSource for LivePageSource {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self.http.get(url).await.map_err(|e| classify(url, e))?;
        let status = response.status.as_u16();
        let final_url = response.final_url.clone();
        let html = response.text().await.map_err(|e| classify(url, e))?;
        Ok(FetchedPage {
            status,
            final_url,
            html,
        })
    }

    async fn render(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let page = self.browser.render(url).await?;
        Ok(FetchedPage {
            status: page.status,
            final_url: page.url,
            html: page.html,
        })
    }

    async fn finish_batch(&self) {
        if self.browser.is_active().await {
            self.browser.close().await;
        }
    }
}

fn classify(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(url.to_string())
    } else {
        FetchError::Http(e)
    }
}

/// Fetch job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub market: String,
    pub concurrency: usize,
    /// Minimum gap between URL starts across the whole pool.
    pub request_interval: Duration,
    pub batch_size: usize,
    pub max_retries: u32,
    /// First retry delay; doubled on each further attempt.
    pub retry_base: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            market: "UK".to_string(),
            concurrency: 2,
            request_interval: Duration::from_millis(1000),
            batch_size: 100,
            max_retries: 3,
            retry_base: Duration::from_millis(1000),
        }
    }
}

/// Counts for a fetch batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub processed: usize,
    pub fetched: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Pages captured from static markup.
    #[serde(rename = "static")]
    pub static_pages: usize,
    /// Pages captured through the browser.
    pub rendered: usize,
}

impl BatchStats {
    pub fn merge(&mut self, other: &BatchStats) {
        self.processed += other.processed;
        self.fetched += other.fetched;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.static_pages += other.static_pages;
        self.rendered += other.rendered;
    }
}

/// Result of one batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// True when the batch drained the pending queue.
    pub completed: bool,
    pub stats: BatchStats,
}

/// Progress events emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum FetchEvent {
    Started { worker_id: usize, url: String },
    Finished { worker_id: usize, url: String, status: UrlStatus },
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicUsize,
    fetched: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    static_pages: AtomicUsize,
    rendered: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> BatchStats {
        BatchStats {
            processed: self.processed.load(Ordering::Relaxed),
            fetched: self.fetched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            static_pages: self.static_pages.load(Ordering::Relaxed),
            rendered: self.rendered.load(Ordering::Relaxed),
        }
    }

    fn mode(&self, mode: RenderMode) {
        match mode {
            RenderMode::Static => self.static_pages.fetch_add(1, Ordering::Relaxed),
            RenderMode::Rendered => self.rendered.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn outcome(&self, status: UrlStatus) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        match status {
            UrlStatus::Fetched => self.fetched.fetch_add(1, Ordering::Relaxed),
            UrlStatus::Skipped => self.skipped.fetch_add(1, Ordering::Relaxed),
            UrlStatus::Failed | UrlStatus::Pending => self.failed.fetch_add(1, Ordering::Relaxed),
        };
    }
}

/// State shared by the workers of a batch.
struct Worker<S> {
    config: FetchConfig,
    repo: Arc<InventoryRepository>,
    store: Arc<ContentStore>,
    source: Arc<S>,
    limiter: IntervalLimiter,
    batch: Arc<Counters>,
    total: Arc<Counters>,
    events: Option<mpsc::Sender<FetchEvent>>,
}

impl<S> Clone for Worker<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            repo: self.repo.clone(),
            store: self.store.clone(),
            source: self.source.clone(),
            limiter: self.limiter.clone(),
            batch: self.batch.clone(),
            total: self.total.clone(),
            events: self.events.clone(),
        }
    }
}

impl<S: PageSource> Worker<S> {
    async fn emit(&self, event: FetchEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    /// Plain HTTP with retries on transport errors, timeouts, 429 and 5xx.
    async fn fetch_with_retry(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            let error = match self.source.fetch(url).await {
                Ok(page) if !is_transient_status(page.status) => return Ok(page),
                Ok(page) => FetchError::Status {
                    url: url.to_string(),
                    status: page.status,
                },
                Err(e) => e,
            };

            if attempt >= self.config.max_retries {
                return Err(error);
            }

            let backoff = self.config.retry_base * 2u32.pow(attempt);
            debug!(
                "Attempt {} for {} failed ({}); retrying in {:?}",
                attempt + 1,
                url,
                error,
                backoff
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    async fn capture(&self, record: &UrlRecord) -> Result<FetchOutcome, FetchError> {
        let page = self.fetch_with_retry(&record.url).await?;

        let render_mode = DomSignature::analyze(&page.html).render_mode();
        self.batch.mode(render_mode);
        self.total.mode(render_mode);

        let page = match render_mode {
            RenderMode::Static => page,
            RenderMode::Rendered => {
                debug!("Rendering {} in browser", record.url);
                self.source.render(&record.url).await?
            }
        };

        let fingerprint = ContentFingerprint::of(&page.html);

        if let Some(original) =
            self.repo
                .find_duplicate(&record.market, &fingerprint.content_hash, record.id)?
        {
            debug!("{} duplicates ID {}", record.url, original);
            return Ok(FetchOutcome::Skipped {
                http_status: page.status,
                final_url: page.final_url,
                canonical_url: fingerprint.canonical_url,
                content_hash: fingerprint.content_hash,
                render_mode,
                duplicate_of_id: original,
            });
        }

        let html_path = self.store.put(&record.market, record.id, &page.html)?;

        Ok(FetchOutcome::Fetched {
            http_status: page.status,
            final_url: page.final_url,
            canonical_url: fingerprint.canonical_url,
            content_hash: fingerprint.content_hash,
            render_mode,
            html_path,
        })
    }

    /// Capture one URL and record its terminal state. A failed terminal
    /// write is returned so the batch stops; the URL is counted as failed and
    /// any markup it cached is removed.
    async fn process(&self, worker_id: usize, record: UrlRecord) -> Result<(), FetchError> {
        self.limiter.acquire().await;
        self.emit(FetchEvent::Started {
            worker_id,
            url: record.url.clone(),
        })
        .await;

        let outcome = match self.capture(&record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Failed: {} - {}", record.url, e);
                FetchOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let recorded = self.repo.record_outcome(record.id, &outcome);
        let status = if recorded.is_ok() {
            outcome.status()
        } else {
            UrlStatus::Failed
        };

        self.batch.outcome(status);
        self.total.outcome(status);
        self.emit(FetchEvent::Finished {
            worker_id,
            url: record.url.clone(),
            status,
        })
        .await;

        if let Err(e) = recorded {
            warn!("Could not record outcome for {}: {}", record.url, e);
            if let FetchOutcome::Fetched { html_path, .. } = &outcome {
                if let Err(e) = self.store.remove(html_path) {
                    warn!("Could not remove cached page {}: {}", html_path, e);
                }
            }
            return Err(e.into());
        }
        Ok(())
    }
}

/// Drives pending URLs of one market through capture.
pub struct FetchOrchestrator<S> {
    config: FetchConfig,
    repo: Arc<InventoryRepository>,
    store: Arc<ContentStore>,
    source: Arc<S>,
    limiter: IntervalLimiter,
    total: Arc<Counters>,
    events: Option<mpsc::Sender<FetchEvent>>,
}

impl<S: PageSource + 'static> FetchOrchestrator<S> {
    pub fn new(
        config: FetchConfig,
        repo: Arc<InventoryRepository>,
        store: Arc<ContentStore>,
        source: Arc<S>,
    ) -> Self {
        let limiter = IntervalLimiter::new(config.request_interval);
        Self {
            config,
            repo,
            store,
            source,
            limiter,
            total: Arc::new(Counters::default()),
            events: None,
        }
    }

    /// Send progress events to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<FetchEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Live counters accumulated over every batch this orchestrator ran.
    pub fn stats(&self) -> BatchStats {
        self.total.snapshot()
    }

    /// Process up to `batch_size` pending URLs.
    pub async fn run_batch(&self) -> Result<BatchOutcome, FetchError> {
        let pending = self.repo.pending(&self.config.market, self.config.batch_size)?;
        if pending.is_empty() {
            info!("No pending URLs for {}", self.config.market);
            return Ok(BatchOutcome {
                completed: true,
                stats: BatchStats::default(),
            });
        }

        info!(
            "Fetching {} URLs for {} (concurrency {})",
            pending.len(),
            self.config.market,
            self.config.concurrency
        );

        let count = pending.len();
        let batch = Arc::new(Counters::default());
        let queue = Arc::new(Mutex::new(VecDeque::from(pending)));
        let worker = Worker {
            config: self.config.clone(),
            repo: self.repo.clone(),
            store: self.store.clone(),
            source: self.source.clone(),
            limiter: self.limiter.clone(),
            batch: batch.clone(),
            total: self.total.clone(),
            events: self.events.clone(),
        };

        let workers = self.config.concurrency.max(1).min(count);
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let worker = worker.clone();
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let next = queue.lock().await.pop_front();
                    let Some(record) = next else { break };
                    if let Err(e) = worker.process(worker_id, record).await {
                        // Stop the other workers too.
                        queue.lock().await.clear();
                        return Err(e);
                    }
                }
                Ok(())
            }));
        }

        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => warn!("Fetch worker panicked: {}", e),
            }
        }

        self.source.finish_batch().await;

        if let Some(e) = first_error {
            warn!("Aborting fetch batch for {}: {}", self.config.market, e);
            return Err(e);
        }

        let stats = batch.snapshot();
        info!(
            "Batch done: {} processed, {} fetched, {} skipped, {} failed ({} static, {} rendered)",
            stats.processed,
            stats.fetched,
            stats.skipped,
            stats.failed,
            stats.static_pages,
            stats.rendered
        );

        Ok(BatchOutcome {
            completed: count < self.config.batch_size,
            stats,
        })
    }

    /// Run batches until the pending queue is drained or stops shrinking.
    pub async fn run_until_complete(&self) -> Result<BatchStats, FetchError> {
        let mut total = BatchStats::default();
        loop {
            let before = self.repo.stats(&self.config.market)?.pending;
            let outcome = self.run_batch().await?;
            total.merge(&outcome.stats);
            if outcome.completed {
                break;
            }
            let after = self.repo.stats(&self.config.market)?.pending;
            if after >= before {
                warn!("Pending queue for {} is not shrinking; stopping", self.config.market);
                break;
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiscoveredUrl;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;
    use tempfile::TempDir;

    /// Scripted page source: each URL maps to a queue of responses.
    #[derive(Default)]
    struct ScriptedSource {
        pages: std::sync::Mutex<HashMap<String, VecDeque<Result<(u16, String), String>>>>,
        renders: std::sync::Mutex<HashMap<String, String>>,
        attempts: AtomicUsize,
        finished: AtomicBool,
    }

    impl ScriptedSource {
        fn page(self, url: &str, responses: Vec<Result<(u16, &str), &str>>) -> Self {
            let queue = responses
                .into_iter()
                .map(|r| r.map(|(s, h)| (s, h.to_string())).map_err(str::to_string))
                .collect();
            self.pages.lock().unwrap().insert(url.to_string(), queue);
            self
        }

        fn rendered(self, url: &str, html: &str) -> Self {
            self.renders.lock().unwrap().insert(url.to_string(), html.to_string());
            self
        }
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            let next = self
                .pages
                .lock()
                .unwrap()
                .get_mut(url)
                .and_then(|q| if q.len() > 1 { q.pop_front() } else { q.front().cloned() });
            match next {
                Some(Ok((status, html))) => Ok(FetchedPage {
                    status,
                    final_url: url.to_string(),
                    html,
                }),
                Some(Err(e)) => Err(FetchError::Timeout(e)),
                None => Err(FetchError::Timeout(url.to_string())),
            }
        }

        async fn render(&self, url: &str) -> Result<FetchedPage, FetchError> {
            let html = self.renders.lock().unwrap().get(url).cloned();
            html.map(|html| FetchedPage {
                status: 200,
                final_url: url.to_string(),
                html,
            })
            .ok_or_else(|| RenderError::Page("no render".to_string()).into())
        }

        async fn finish_batch(&self) {
            self.finished.store(true, Ordering::Relaxed);
        }
    }

    fn rich_page(title: &str) -> String {
        let para = format!("<div><p>{} </p></div>", "lorem ipsum dolor sit amet ".repeat(4));
        format!(
            "<html><head><link rel=\"canonical\" href=\"https://example.com/{}\"></head><body><main><h1>{}</h1>{}</main></body></html>",
            title,
            title,
            para.repeat(8)
        )
    }

    struct Fixture {
        _dir: TempDir,
        repo: Arc<InventoryRepository>,
        store: Arc<ContentStore>,
    }

    fn fixture(urls: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(InventoryRepository::new(&dir.path().join("cutool.db")).unwrap());
        let discovered: Vec<_> = urls.iter().map(|u| DiscoveredUrl::new(*u, "sitemap")).collect();
        repo.upsert_discovered("UK", &discovered).unwrap();
        let store = Arc::new(ContentStore::new(dir.path()));
        Fixture {
            _dir: dir,
            repo,
            store,
        }
    }

    fn config(concurrency: usize) -> FetchConfig {
        FetchConfig {
            concurrency,
            request_interval: Duration::ZERO,
            retry_base: Duration::from_millis(1),
            ..FetchConfig::default()
        }
    }

    #[tokio::test]
    async fn duplicate_content_is_skipped() {
        let fx = fixture(&["https://example.com/a", "https://example.com/b"]);
        let same = rich_page("qashqai");
        let source = ScriptedSource::default()
            .page("https://example.com/a", vec![Ok((200, same.as_str()))])
            .page("https://example.com/b", vec![Ok((200, same.as_str()))]);

        let orchestrator =
            FetchOrchestrator::new(config(1), fx.repo.clone(), fx.store.clone(), Arc::new(source));
        let outcome = orchestrator.run_batch().await.unwrap();

        assert!(outcome.completed);
        assert_eq!(outcome.stats.processed, 2);
        assert_eq!(outcome.stats.fetched, 1);
        assert_eq!(outcome.stats.skipped, 1);
        assert_eq!(outcome.stats.static_pages, 2);

        let a = fx.repo.get_by_url("UK", "https://example.com/a").unwrap().unwrap();
        let b = fx.repo.get_by_url("UK", "https://example.com/b").unwrap().unwrap();
        assert_eq!(a.status, UrlStatus::Fetched);
        assert_eq!(a.canonical_url.as_deref(), Some("https://example.com/qashqai"));
        assert_eq!(a.render_mode, Some(RenderMode::Static));
        assert!(fx.store.exists(a.html_path.as_deref().unwrap()));

        assert_eq!(b.status, UrlStatus::Skipped);
        assert_eq!(b.duplicate_of_id, Some(a.id));
        assert_eq!(b.content_hash, a.content_hash);
        assert!(b.html_path.is_none());
        assert_eq!(
            b.error_message,
            Some(format!("Duplicate content (original: ID {})", a.id))
        );
    }

    #[tokio::test]
    async fn transient_errors_are_retried_then_fail() {
        let fx = fixture(&["https://example.com/flaky", "https://example.com/down"]);
        let page = rich_page("flaky");
        let source = Arc::new(
            ScriptedSource::default()
                .page(
                    "https://example.com/flaky",
                    vec![Err("timeout"), Ok((503, "busy")), Ok((200, page.as_str()))],
                )
                .page("https://example.com/down", vec![Ok((500, "oops"))]),
        );

        let orchestrator =
            FetchOrchestrator::new(config(2), fx.repo.clone(), fx.store.clone(), source.clone());
        let outcome = orchestrator.run_batch().await.unwrap();

        assert_eq!(outcome.stats.fetched, 1);
        assert_eq!(outcome.stats.failed, 1);
        // 3 attempts for the flaky URL, 1 + 3 retries for the dead one.
        assert_eq!(source.attempts.load(Ordering::Relaxed), 7);

        let down = fx.repo.get_by_url("UK", "https://example.com/down").unwrap().unwrap();
        assert_eq!(down.status, UrlStatus::Failed);
        assert!(down.error_message.unwrap().contains("HTTP 500"));
        assert_eq!(orchestrator.stats().processed, 2);
    }

    #[tokio::test]
    async fn client_errors_are_recorded_not_retried() {
        let fx = fixture(&["https://example.com/gone"]);
        let page = rich_page("not-found");
        let source = Arc::new(
            ScriptedSource::default().page("https://example.com/gone", vec![Ok((404, page.as_str()))]),
        );

        let orchestrator =
            FetchOrchestrator::new(config(1), fx.repo.clone(), fx.store.clone(), source.clone());
        orchestrator.run_batch().await.unwrap();

        assert_eq!(source.attempts.load(Ordering::Relaxed), 1);
        let row = fx.repo.get_by_url("UK", "https://example.com/gone").unwrap().unwrap();
        assert_eq!(row.status, UrlStatus::Fetched);
        assert_eq!(row.http_status, Some(404));
    }

    #[tokio::test]
    async fn script_shells_are_rendered() {
        let fx = fixture(&["https://example.com/spa", "https://example.com/broken"]);
        let shell = r#"<html><body><div id="root"></div></body></html>"#;
        let source = Arc::new(
            ScriptedSource::default()
                .page("https://example.com/spa", vec![Ok((200, shell))])
                .rendered("https://example.com/spa", &rich_page("spa"))
                .page("https://example.com/broken", vec![Ok((200, shell))]),
        );

        let orchestrator =
            FetchOrchestrator::new(config(1), fx.repo.clone(), fx.store.clone(), source.clone());
        let outcome = orchestrator.run_batch().await.unwrap();

        assert_eq!(outcome.stats.rendered, 2);
        assert_eq!(outcome.stats.fetched, 1);
        assert_eq!(outcome.stats.failed, 1);
        assert!(source.finished.load(Ordering::Relaxed));

        let spa = fx.repo.get_by_url("UK", "https://example.com/spa").unwrap().unwrap();
        assert_eq!(spa.render_mode, Some(RenderMode::Rendered));
        assert_eq!(spa.final_url.as_deref(), Some("https://example.com/spa"));
        let cached = fx.store.get(spa.html_path.as_deref().unwrap()).unwrap();
        assert!(cached.contains("<h1>spa</h1>"));

        let broken = fx.repo.get_by_url("UK", "https://example.com/broken").unwrap().unwrap();
        assert_eq!(broken.status, UrlStatus::Failed);
    }

    #[tokio::test]
    async fn batches_resume_until_complete() {
        let urls: Vec<String> = (0..5).map(|i| format!("https://example.com/p{}", i)).collect();
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let fx = fixture(&refs);
        let pages: Vec<String> = (0..5).map(|i| rich_page(&format!("page{}", i))).collect();
        let mut source = ScriptedSource::default();
        for (url, page) in urls.iter().zip(&pages) {
            source = source.page(url, vec![Ok((200, page.as_str()))]);
        }

        let cfg = FetchConfig {
            batch_size: 2,
            ..config(2)
        };
        let orchestrator = FetchOrchestrator::new(cfg, fx.repo.clone(), fx.store.clone(), Arc::new(source));

        let first = orchestrator.run_batch().await.unwrap();
        assert!(!first.completed);
        assert_eq!(fx.repo.stats("UK").unwrap().pending, 3);

        let total = orchestrator.run_until_complete().await.unwrap();
        assert_eq!(total.fetched, 3);
        assert_eq!(fx.repo.stats("UK").unwrap().fetched, 5);
        assert_eq!(orchestrator.stats().fetched, 5);
    }

    #[tokio::test]
    async fn failed_outcome_write_aborts_batch_and_drops_cache_entry() {
        let fx = fixture(&["https://example.com/a", "https://example.com/b"]);
        let source = ScriptedSource::default()
            .page("https://example.com/a", vec![Ok((200, rich_page("a").as_str()))])
            .page("https://example.com/b", vec![Ok((200, rich_page("b").as_str()))]);

        let conn = rusqlite::Connection::open(fx.repo.db_path()).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_updates BEFORE UPDATE ON url_inventory
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .unwrap();

        let orchestrator =
            FetchOrchestrator::new(config(1), fx.repo.clone(), fx.store.clone(), Arc::new(source));
        let err = orchestrator.run_batch().await.unwrap_err();
        assert!(matches!(err, FetchError::Repository(_)));

        let stats = orchestrator.stats();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.fetched, 0);
        assert_eq!(stats.failed, 1);

        let a = fx.repo.get_by_url("UK", "https://example.com/a").unwrap().unwrap();
        assert_eq!(a.status, UrlStatus::Pending);
        assert!(a.html_path.is_none());
        assert!(!fx.store.exists(&crate::storage::content_pointer("UK", a.id)));

        let b = fx.repo.get_by_url("UK", "https://example.com/b").unwrap().unwrap();
        assert_eq!(b.status, UrlStatus::Pending);
    }
}
