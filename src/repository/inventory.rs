//! URL inventory repository.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{parse_datetime, parse_datetime_opt, with_immediate_tx, Result};
use crate::models::{DiscoveredUrl, InventoryStats, RenderMode, RenderStat, UrlRecord, UrlStatus};

/// Counts from an inventory upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertResult {
    /// Rows that did not exist before.
    pub inserted: usize,
    /// Existing rows whose lastmod was merged.
    pub updated: usize,
}

/// Terminal result of fetching one URL.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fetched {
        http_status: u16,
        final_url: String,
        canonical_url: Option<String>,
        content_hash: String,
        render_mode: RenderMode,
        html_path: String,
    },
    Skipped {
        http_status: u16,
        final_url: String,
        canonical_url: Option<String>,
        content_hash: String,
        render_mode: RenderMode,
        duplicate_of_id: i64,
    },
    Failed {
        error: String,
    },
}

impl FetchOutcome {
    pub fn status(&self) -> UrlStatus {
        match self {
            Self::Fetched { .. } => UrlStatus::Fetched,
            Self::Skipped { .. } => UrlStatus::Skipped,
            Self::Failed { .. } => UrlStatus::Failed,
        }
    }
}

/// Cache coverage for a market's unique fetched pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub market: String,
    pub total_fetched_unique: u64,
    pub cached: u64,
    pub remaining: u64,
}

/// SQLite-backed repository for the URL inventory.
pub struct InventoryRepository {
    db_path: PathBuf,
}

impl InventoryRepository {
    /// Open the repository, creating the schema if needed.
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS url_inventory (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market TEXT NOT NULL,
                url TEXT NOT NULL,
                discovered_from TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',

                -- Fetch outcome
                render_mode TEXT,
                http_status INTEGER,
                final_url TEXT,
                canonical_url TEXT,
                content_hash TEXT,
                duplicate_of_id INTEGER REFERENCES url_inventory(id),
                error_message TEXT,

                -- Timing
                fetched_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,

                -- Freshness from the sitemap
                sitemap_lastmod TEXT,

                -- Content store pointer
                html_path TEXT,
                html_fetched_at TEXT,

                UNIQUE(market, url)
            );

            CREATE INDEX IF NOT EXISTS idx_url_inventory_market_status
                ON url_inventory(market, status);
            CREATE INDEX IF NOT EXISTS idx_url_inventory_url
                ON url_inventory(url);
            CREATE INDEX IF NOT EXISTS idx_url_inventory_content_hash
                ON url_inventory(content_hash);
            CREATE INDEX IF NOT EXISTS idx_url_inventory_final_url
                ON url_inventory(final_url);
        "#,
        )?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Inventory
    // -------------------------------------------------------------------------

    /// Insert discovered URLs, merging sitemap lastmod into existing rows.
    ///
    /// Existing rows keep their status and fetch outcome; a null lastmod never
    /// replaces a known one.
    pub fn upsert_discovered(&self, market: &str, urls: &[DiscoveredUrl]) -> Result<UpsertResult> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();

        with_immediate_tx(&conn, |conn| {
            let mut exists = conn.prepare("SELECT 1 FROM url_inventory WHERE market = ? AND url = ?")?;
            let mut upsert = conn.prepare(
                r#"
                INSERT INTO url_inventory (
                    market, url, discovered_from, status, sitemap_lastmod, created_at, updated_at
                ) VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?5)
                ON CONFLICT(market, url) DO UPDATE SET
                    sitemap_lastmod = COALESCE(excluded.sitemap_lastmod, url_inventory.sitemap_lastmod),
                    updated_at = excluded.updated_at
                "#,
            )?;

            let mut result = UpsertResult::default();
            for item in urls {
                let known = exists
                    .query_row(params![market, item.url], |_| Ok(()))
                    .optional()?
                    .is_some();
                upsert.execute(params![market, item.url, item.discovered_from, item.lastmod, now])?;
                if known {
                    result.updated += 1;
                } else {
                    result.inserted += 1;
                }
            }
            Ok(result)
        })
    }

    /// Status counts for one market.
    pub fn stats(&self, market: &str) -> Result<InventoryStats> {
        let conn = self.connect()?;
        let stats = conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'fetched' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'skipped' THEN 1 ELSE 0 END), 0)
            FROM url_inventory
            WHERE market = ?
            "#,
            params![market],
            |row| {
                Ok(InventoryStats {
                    market: market.to_string(),
                    total: row.get::<_, i64>(0)? as u64,
                    pending: row.get::<_, i64>(1)? as u64,
                    fetched: row.get::<_, i64>(2)? as u64,
                    failed: row.get::<_, i64>(3)? as u64,
                    skipped: row.get::<_, i64>(4)? as u64,
                })
            },
        )?;
        Ok(stats)
    }

    /// Status counts for every market.
    pub fn all_stats(&self) -> Result<Vec<InventoryStats>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                market,
                COUNT(*),
                SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END),
                SUM(CASE WHEN status = 'fetched' THEN 1 ELSE 0 END),
                SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END),
                SUM(CASE WHEN status = 'skipped' THEN 1 ELSE 0 END)
            FROM url_inventory
            GROUP BY market
            ORDER BY market
            "#,
        )?;

        let stats = stmt
            .query_map([], |row| {
                Ok(InventoryStats {
                    market: row.get(0)?,
                    total: row.get::<_, i64>(1)? as u64,
                    pending: row.get::<_, i64>(2)? as u64,
                    fetched: row.get::<_, i64>(3)? as u64,
                    failed: row.get::<_, i64>(4)? as u64,
                    skipped: row.get::<_, i64>(5)? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(stats)
    }

    /// Counts of captured pages per market and render mode.
    pub fn render_stats(&self) -> Result<Vec<RenderStat>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT market, render_mode, COUNT(*)
            FROM url_inventory
            WHERE render_mode IS NOT NULL
            GROUP BY market, render_mode
            ORDER BY market, render_mode
            "#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(market, mode, count)| {
                RenderMode::from_str(&mode).map(|render_mode| RenderStat {
                    market,
                    render_mode,
                    count: count as u64,
                })
            })
            .collect())
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    pub fn get(&self, id: i64) -> Result<Option<UrlRecord>> {
        let conn = self.connect()?;
        let record = conn
            .query_row(
                "SELECT * FROM url_inventory WHERE id = ?",
                params![id],
                row_to_url_record,
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_by_url(&self, market: &str, url: &str) -> Result<Option<UrlRecord>> {
        let conn = self.connect()?;
        let record = conn
            .query_row(
                "SELECT * FROM url_inventory WHERE market = ? AND url = ?",
                params![market, url],
                row_to_url_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Pending URLs for a market, oldest first.
    pub fn pending(&self, market: &str, limit: usize) -> Result<Vec<UrlRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM url_inventory
            WHERE market = ? AND status = 'pending'
            ORDER BY id ASC
            LIMIT ?
            "#,
        )?;

        let records = stmt
            .query_map(params![market, limit as i64], row_to_url_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Earliest fetched record in the market holding `content_hash`,
    /// other than `exclude_id`.
    pub fn find_duplicate(&self, market: &str, content_hash: &str, exclude_id: i64) -> Result<Option<i64>> {
        let conn = self.connect()?;
        let id = conn
            .query_row(
                r#"
                SELECT id FROM url_inventory
                WHERE market = ? AND content_hash = ? AND id != ? AND status = 'fetched'
                ORDER BY id ASC
                LIMIT 1
                "#,
                params![market, content_hash, exclude_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    // -------------------------------------------------------------------------
    // Fetch outcomes
    // -------------------------------------------------------------------------

    /// Persist the terminal outcome of fetching a URL in one transaction.
    pub fn record_outcome(&self, id: i64, outcome: &FetchOutcome) -> Result<()> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();

        with_immediate_tx(&conn, |conn| {
            match outcome {
                FetchOutcome::Fetched {
                    http_status,
                    final_url,
                    canonical_url,
                    content_hash,
                    render_mode,
                    html_path,
                } => {
                    conn.execute(
                        r#"
                        UPDATE url_inventory
                        SET status = 'fetched',
                            http_status = ?1,
                            final_url = ?2,
                            canonical_url = ?3,
                            content_hash = ?4,
                            render_mode = ?5,
                            duplicate_of_id = NULL,
                            error_message = NULL,
                            html_path = ?6,
                            html_fetched_at = ?7,
                            fetched_at = ?7,
                            updated_at = ?7
                        WHERE id = ?8
                        "#,
                        params![
                            http_status,
                            final_url,
                            canonical_url,
                            content_hash,
                            render_mode.as_str(),
                            html_path,
                            now,
                            id
                        ],
                    )?;
                }
                FetchOutcome::Skipped {
                    http_status,
                    final_url,
                    canonical_url,
                    content_hash,
                    render_mode,
                    duplicate_of_id,
                } => {
                    conn.execute(
                        r#"
                        UPDATE url_inventory
                        SET status = 'skipped',
                            http_status = ?1,
                            final_url = ?2,
                            canonical_url = ?3,
                            content_hash = ?4,
                            render_mode = ?5,
                            duplicate_of_id = ?6,
                            error_message = ?7,
                            fetched_at = ?8,
                            updated_at = ?8
                        WHERE id = ?9
                        "#,
                        params![
                            http_status,
                            final_url,
                            canonical_url,
                            content_hash,
                            render_mode.as_str(),
                            duplicate_of_id,
                            format!("Duplicate content (original: ID {})", duplicate_of_id),
                            now,
                            id
                        ],
                    )?;
                }
                FetchOutcome::Failed { error } => {
                    conn.execute(
                        r#"
                        UPDATE url_inventory
                        SET status = 'failed',
                            error_message = ?1,
                            updated_at = ?2
                        WHERE id = ?3
                        "#,
                        params![error, now, id],
                    )?;
                }
            }
            Ok(())
        })
    }

    /// Put failed URLs of a market back into the pending queue.
    pub fn requeue_failed(&self, market: &str) -> Result<usize> {
        let conn = self.connect()?;
        let count = conn.execute(
            r#"
            UPDATE url_inventory
            SET status = 'pending', error_message = NULL, updated_at = ?
            WHERE market = ? AND status = 'failed'
            "#,
            params![Utc::now().to_rfc3339(), market],
        )?;
        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Content store pointers
    // -------------------------------------------------------------------------

    /// Fetched URLs whose markup has not been cached yet.
    pub fn missing_cache(&self, market: &str, unique_only: bool, limit: usize) -> Result<Vec<UrlRecord>> {
        let conn = self.connect()?;
        let sql = if unique_only {
            r#"
            SELECT * FROM url_inventory
            WHERE market = ? AND status = 'fetched'
              AND duplicate_of_id IS NULL
              AND (html_path IS NULL OR html_path = '')
            ORDER BY id ASC
            LIMIT ?
            "#
        } else {
            r#"
            SELECT * FROM url_inventory
            WHERE market = ? AND status = 'fetched'
              AND (html_path IS NULL OR html_path = '')
            ORDER BY id ASC
            LIMIT ?
            "#
        };

        let mut stmt = conn.prepare(sql)?;
        let records = stmt
            .query_map(params![market, limit as i64], row_to_url_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    pub fn set_cache_pointer(&self, id: i64, html_path: &str) -> Result<()> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            UPDATE url_inventory
            SET html_path = ?1, html_fetched_at = ?2, updated_at = ?2
            WHERE id = ?3
            "#,
            params![html_path, now, id],
        )?;
        Ok(())
    }

    pub fn cache_status(&self, market: &str) -> Result<CacheStatus> {
        let conn = self.connect()?;
        let status = conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN html_path IS NOT NULL AND html_path != '' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN html_path IS NULL OR html_path = '' THEN 1 ELSE 0 END), 0)
            FROM url_inventory
            WHERE market = ? AND status = 'fetched' AND duplicate_of_id IS NULL
            "#,
            params![market],
            |row| {
                Ok(CacheStatus {
                    market: market.to_string(),
                    total_fetched_unique: row.get::<_, i64>(0)? as u64,
                    cached: row.get::<_, i64>(1)? as u64,
                    remaining: row.get::<_, i64>(2)? as u64,
                })
            },
        )?;
        Ok(status)
    }

    // -------------------------------------------------------------------------
    // Analysis eligibility
    // -------------------------------------------------------------------------

    /// Unique, cached, fetched URLs in id order, one page at a time.
    pub fn eligible_for_analysis(&self, market: &str, limit: usize, offset: usize) -> Result<Vec<UrlRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM url_inventory
            WHERE market = ?
              AND status = 'fetched'
              AND duplicate_of_id IS NULL
              AND html_path IS NOT NULL
              AND html_path != ''
            ORDER BY id
            LIMIT ? OFFSET ?
            "#,
        )?;

        let records = stmt
            .query_map(params![market, limit as i64, offset as i64], row_to_url_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Ids of every unique fetched URL in a market.
    pub fn unique_fetched_ids(&self, market: &str) -> Result<Vec<i64>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id FROM url_inventory
            WHERE market = ? AND status = 'fetched' AND duplicate_of_id IS NULL
            ORDER BY id
            "#,
        )?;

        let ids = stmt
            .query_map(params![market], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(ids)
    }
}

fn row_to_url_record(row: &rusqlite::Row) -> rusqlite::Result<UrlRecord> {
    Ok(UrlRecord {
        id: row.get("id")?,
        market: row.get("market")?,
        url: row.get("url")?,
        discovered_from: row.get("discovered_from")?,
        sitemap_lastmod: row.get("sitemap_lastmod")?,
        status: UrlStatus::from_str(&row.get::<_, String>("status")?).unwrap_or(UrlStatus::Pending),
        render_mode: row
            .get::<_, Option<String>>("render_mode")?
            .and_then(|s| RenderMode::from_str(&s)),
        http_status: row.get::<_, Option<i64>>("http_status")?.map(|s| s as u16),
        final_url: row.get("final_url")?,
        canonical_url: row.get("canonical_url")?,
        content_hash: row.get("content_hash")?,
        duplicate_of_id: row.get("duplicate_of_id")?,
        error_message: row.get("error_message")?,
        html_path: row.get("html_path")?,
        fetched_at: parse_datetime_opt(row.get("fetched_at")?),
        html_fetched_at: parse_datetime_opt(row.get("html_fetched_at")?),
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, InventoryRepository) {
        let dir = TempDir::new().unwrap();
        let repo = InventoryRepository::new(&dir.path().join("cutool.db")).unwrap();
        (dir, repo)
    }

    fn fetched(hash: &str, path: &str) -> FetchOutcome {
        FetchOutcome::Fetched {
            http_status: 200,
            final_url: "https://example.com/a".to_string(),
            canonical_url: None,
            content_hash: hash.to_string(),
            render_mode: RenderMode::Static,
            html_path: path.to_string(),
        }
    }

    #[test]
    fn upsert_is_idempotent_and_merges_lastmod() {
        let (_dir, repo) = setup();
        let first = vec![
            DiscoveredUrl::new("https://example.com/a", "https://example.com/sitemap.xml"),
            DiscoveredUrl::new("https://example.com/b", "https://example.com/sitemap.xml")
                .with_lastmod(Some("2024-01-01".to_string())),
        ];
        let result = repo.upsert_discovered("UK", &first).unwrap();
        assert_eq!(result.inserted, 2);

        let second = vec![
            DiscoveredUrl::new("https://example.com/a", "https://example.com/other.xml")
                .with_lastmod(Some("2024-02-01".to_string())),
            DiscoveredUrl::new("https://example.com/b", "https://example.com/other.xml"),
        ];
        let result = repo.upsert_discovered("UK", &second).unwrap();
        assert_eq!(result, UpsertResult { inserted: 0, updated: 2 });

        let a = repo.get_by_url("UK", "https://example.com/a").unwrap().unwrap();
        assert_eq!(a.sitemap_lastmod.as_deref(), Some("2024-02-01"));
        assert_eq!(a.discovered_from, "https://example.com/sitemap.xml");
        let b = repo.get_by_url("UK", "https://example.com/b").unwrap().unwrap();
        assert_eq!(b.sitemap_lastmod.as_deref(), Some("2024-01-01"));

        let stats = repo.stats("UK").unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 2);
    }

    #[test]
    fn duplicate_lookup_only_considers_fetched_rows() {
        let (_dir, repo) = setup();
        let urls: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|p| DiscoveredUrl::new(format!("https://example.com/{}", p), "s"))
            .collect();
        repo.upsert_discovered("UK", &urls).unwrap();
        let pending = repo.pending("UK", 10).unwrap();
        let (a, b, c) = (pending[0].id, pending[1].id, pending[2].id);

        assert_eq!(repo.find_duplicate("UK", "h1", b).unwrap(), None);

        repo.record_outcome(a, &fetched("h1", "html/UK/1.html.gz")).unwrap();
        assert_eq!(repo.find_duplicate("UK", "h1", b).unwrap(), Some(a));
        assert_eq!(repo.find_duplicate("FR", "h1", b).unwrap(), None);

        repo.record_outcome(
            b,
            &FetchOutcome::Skipped {
                http_status: 200,
                final_url: "https://example.com/b".to_string(),
                canonical_url: None,
                content_hash: "h1".to_string(),
                render_mode: RenderMode::Static,
                duplicate_of_id: a,
            },
        )
        .unwrap();

        // The skipped row never becomes a dedup target.
        assert_eq!(repo.find_duplicate("UK", "h1", c).unwrap(), Some(a));

        let b_row = repo.get(b).unwrap().unwrap();
        assert_eq!(b_row.status, UrlStatus::Skipped);
        assert_eq!(b_row.duplicate_of_id, Some(a));
        assert_eq!(
            b_row.error_message.as_deref(),
            Some(format!("Duplicate content (original: ID {})", a).as_str())
        );
        assert!(b_row.html_path.is_none());
    }

    #[test]
    fn failed_outcome_and_requeue() {
        let (_dir, repo) = setup();
        repo.upsert_discovered("UK", &[DiscoveredUrl::new("https://example.com/x", "s")])
            .unwrap();
        let id = repo.pending("UK", 1).unwrap()[0].id;

        repo.record_outcome(
            id,
            &FetchOutcome::Failed {
                error: "timed out".to_string(),
            },
        )
        .unwrap();
        let row = repo.get(id).unwrap().unwrap();
        assert_eq!(row.status, UrlStatus::Failed);
        assert_eq!(row.error_message.as_deref(), Some("timed out"));

        assert_eq!(repo.requeue_failed("UK").unwrap(), 1);
        assert_eq!(repo.pending("UK", 10).unwrap().len(), 1);
    }

    #[test]
    fn cache_status_and_eligibility() {
        let (_dir, repo) = setup();
        let urls: Vec<_> = ["a", "b"]
            .iter()
            .map(|p| DiscoveredUrl::new(format!("https://example.com/{}", p), "s"))
            .collect();
        repo.upsert_discovered("UK", &urls).unwrap();
        let pending = repo.pending("UK", 10).unwrap();

        repo.record_outcome(pending[0].id, &fetched("h1", "html/UK/1.html.gz"))
            .unwrap();
        repo.record_outcome(pending[1].id, &fetched("h2", "")).unwrap();

        let status = repo.cache_status("UK").unwrap();
        assert_eq!(status.total_fetched_unique, 2);
        assert_eq!(status.cached, 1);
        assert_eq!(status.remaining, 1);

        let missing = repo.missing_cache("UK", true, 10).unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, pending[1].id);

        repo.set_cache_pointer(pending[1].id, "html/UK/2.html.gz").unwrap();
        let eligible = repo.eligible_for_analysis("UK", 10, 0).unwrap();
        assert_eq!(eligible.len(), 2);
        assert_eq!(repo.eligible_for_analysis("UK", 10, 1).unwrap().len(), 1);
        assert_eq!(repo.render_stats().unwrap()[0].count, 2);
    }
}
