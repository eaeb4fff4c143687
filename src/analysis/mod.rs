//! Analysis runner: feeds cached pages through the detection engine and
//! persists the results.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::detection::DetectionEngine;
use crate::models::UrlRecord;
use crate::repository::{ComponentSummary, DetectionRepository, InventoryRepository, RepositoryError};
use crate::storage::{ContentStore, StorageError};

pub const DEFAULT_BATCH_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// One batch request over the eligible URL set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisBatch {
    pub market: String,
    pub limit: usize,
    pub offset: usize,
    /// Delete existing detections for the market's unique fetched URLs first.
    pub reset: bool,
}

impl AnalysisBatch {
    pub fn new(market: impl Into<String>) -> Self {
        Self {
            market: market.into(),
            limit: DEFAULT_BATCH_LIMIT,
            offset: 0,
            reset: false,
        }
    }
}

/// Counts for one batch or a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    /// Eligible URLs returned by the batch query.
    pub count: usize,
    /// URLs attempted, whether or not analysis succeeded.
    pub processed: usize,
    pub analyzed: usize,
    pub failed: usize,
    pub detections: usize,
}

impl AnalysisStats {
    fn merge(&mut self, other: &AnalysisStats) {
        self.count += other.count;
        self.processed += other.processed;
        self.analyzed += other.analyzed;
        self.failed += other.failed;
        self.detections += other.detections;
    }
}

/// Summary of a multi-batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunAllOutcome {
    pub batches: usize,
    pub next_offset: usize,
    pub stats: AnalysisStats,
}

/// Per-market component usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub market: String,
    pub analyzed_urls: usize,
    pub components: Vec<ComponentSummary>,
}

pub struct AnalysisRunner<'a> {
    inventory: &'a InventoryRepository,
    detections: &'a DetectionRepository,
    store: &'a ContentStore,
    engine: DetectionEngine,
}

impl<'a> AnalysisRunner<'a> {
    pub fn new(
        inventory: &'a InventoryRepository,
        detections: &'a DetectionRepository,
        store: &'a ContentStore,
    ) -> Self {
        Self {
            inventory,
            detections,
            store,
            engine: DetectionEngine::new(),
        }
    }

    pub fn with_engine(mut self, engine: DetectionEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Delete detections for every unique fetched URL of a market.
    pub fn reset(&self, market: &str) -> Result<usize, AnalysisError> {
        let ids = self.inventory.unique_fetched_ids(market)?;
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted = self.detections.delete_for_urls(&ids)?;
        info!(market, urls = ids.len(), deleted, "Reset existing analysis data");
        Ok(deleted)
    }

    /// Analyze one page of eligible URLs. A page that cannot be read or
    /// stored is counted as failed and the batch moves on.
    pub fn run_batch(&self, batch: &AnalysisBatch) -> Result<AnalysisStats, AnalysisError> {
        if batch.reset {
            self.reset(&batch.market)?;
        }
        self.analyze_page(&batch.market, batch.limit, batch.offset)
    }

    /// Walk the eligible set batch by batch from `start_offset` until it is
    /// exhausted or `max_batches` have run.
    pub fn run_all(
        &self,
        market: &str,
        batch_size: usize,
        start_offset: usize,
        max_batches: Option<usize>,
        reset: bool,
    ) -> Result<RunAllOutcome, AnalysisError> {
        if reset {
            self.reset(market)?;
        }

        let limit = batch_size.max(1);
        let mut outcome = RunAllOutcome {
            next_offset: start_offset,
            ..Default::default()
        };

        loop {
            if max_batches.is_some_and(|max| outcome.batches >= max) {
                info!(market, batches = outcome.batches, "Reached batch limit");
                break;
            }

            let stats = self.analyze_page(market, limit, outcome.next_offset)?;
            outcome.stats.merge(&stats);

            if stats.count == 0 {
                break;
            }

            outcome.next_offset += stats.count;
            outcome.batches += 1;

            if stats.count < limit {
                break;
            }
        }

        info!(
            market,
            batches = outcome.batches,
            processed = outcome.stats.processed,
            "Analysis run complete"
        );
        Ok(outcome)
    }

    pub fn summary(&self, market: &str) -> Result<AnalysisSummary, AnalysisError> {
        Ok(AnalysisSummary {
            market: market.to_string(),
            analyzed_urls: self.detections.analyzed_url_ids(market)?.len(),
            components: self.detections.summary(market)?,
        })
    }

    fn analyze_page(&self, market: &str, limit: usize, offset: usize) -> Result<AnalysisStats, AnalysisError> {
        let records = self.inventory.eligible_for_analysis(market, limit, offset)?;
        let mut stats = AnalysisStats {
            count: records.len(),
            ..Default::default()
        };

        for record in &records {
            stats.processed += 1;
            match self.analyze_record(record) {
                Ok(found) => {
                    stats.analyzed += 1;
                    stats.detections += found;
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(url = %record.url, error = %e, "Failed to analyze page");
                }
            }
        }

        info!(
            market,
            offset,
            count = stats.count,
            analyzed = stats.analyzed,
            failed = stats.failed,
            "Analysis batch finished"
        );
        Ok(stats)
    }

    fn analyze_record(&self, record: &UrlRecord) -> Result<usize, AnalysisError> {
        let pointer = record.html_path.as_deref().unwrap_or_default();
        let html = self.store.get(pointer)?;
        let found = self.engine.detect(&html);
        self.detections.replace(record.id, &found)?;
        Ok(found.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiscoveredUrl, RenderMode};
    use crate::repository::FetchOutcome;
    use tempfile::TempDir;

    const ACCORDION_PAGE: &str = "<html><body><main>\
        <details><summary>a</summary>x</details>\
        <details><summary>b</summary>y</details>\
        <details><summary>c</summary>z</details>\
        </main></body></html>";

    struct Fixture {
        _dir: TempDir,
        inventory: InventoryRepository,
        detections: DetectionRepository,
        store: ContentStore,
    }

    fn fixture(pages: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("cutool.db");
        let inventory = InventoryRepository::new(&db).unwrap();
        let detections = DetectionRepository::new(&db).unwrap();
        let store = ContentStore::new(dir.path());

        let urls: Vec<_> = (0..pages)
            .map(|i| DiscoveredUrl::new(format!("https://example.com/p{i}"), "sitemap.xml"))
            .collect();
        inventory.upsert_discovered("UK", &urls).unwrap();

        for record in inventory.pending("UK", 100).unwrap() {
            let path = store.put("UK", record.id, ACCORDION_PAGE).unwrap();
            inventory
                .record_outcome(
                    record.id,
                    &FetchOutcome::Fetched {
                        http_status: 200,
                        final_url: record.url.clone(),
                        canonical_url: None,
                        content_hash: format!("hash-{}", record.id),
                        render_mode: RenderMode::Static,
                        html_path: path,
                    },
                )
                .unwrap();
        }

        Fixture {
            _dir: dir,
            inventory,
            detections,
            store,
        }
    }

    #[test]
    fn batch_persists_detections() {
        let f = fixture(2);
        let runner = AnalysisRunner::new(&f.inventory, &f.detections, &f.store);

        let stats = runner.run_batch(&AnalysisBatch::new("UK")).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.analyzed, 2);
        assert_eq!(stats.detections, 2);

        let summary = runner.summary("UK").unwrap();
        assert_eq!(summary.analyzed_urls, 2);
        assert_eq!(summary.components[0].component_key, "accordion");
        assert_eq!(summary.components[0].pages_with_component, 2);
    }

    #[test]
    fn rerun_does_not_duplicate_rows() {
        let f = fixture(1);
        let runner = AnalysisRunner::new(&f.inventory, &f.detections, &f.store);
        runner.run_batch(&AnalysisBatch::new("UK")).unwrap();
        runner.run_batch(&AnalysisBatch::new("UK")).unwrap();

        let id = f.inventory.unique_fetched_ids("UK").unwrap()[0];
        assert_eq!(f.detections.for_url(id).unwrap().len(), 1);
    }

    #[test]
    fn run_all_walks_every_batch() {
        let f = fixture(5);
        let runner = AnalysisRunner::new(&f.inventory, &f.detections, &f.store);

        let outcome = runner.run_all("UK", 2, 0, None, true).unwrap();
        assert_eq!(outcome.batches, 3);
        assert_eq!(outcome.next_offset, 5);
        assert_eq!(outcome.stats.processed, 5);

        let limited = runner.run_all("UK", 2, 0, Some(1), false).unwrap();
        assert_eq!(limited.batches, 1);
        assert_eq!(limited.stats.processed, 2);
    }

    #[test]
    fn missing_cache_entry_is_a_page_failure() {
        let f = fixture(2);
        let first = f.inventory.unique_fetched_ids("UK").unwrap()[0];
        let pointer = f.inventory.get(first).unwrap().unwrap().html_path.unwrap();
        std::fs::remove_file(f.store.root().join(pointer)).unwrap();

        let runner = AnalysisRunner::new(&f.inventory, &f.detections, &f.store);
        let stats = runner.run_batch(&AnalysisBatch::new("UK")).unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.analyzed, 1);
    }
}
