//! Component usage repository.
//!
//! Detections live in the same database file as the URL inventory.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::{parse_datetime, with_immediate_tx, Result};
use crate::models::{Detection, StoredDetection};

/// Aggregate usage of one component across a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSummary {
    pub component_key: String,
    pub pages_with_component: u64,
    pub total_instances: u64,
}

/// SQLite-backed repository for detected components.
pub struct DetectionRepository {
    db_path: PathBuf,
}

impl DetectionRepository {
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS component_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url_id INTEGER NOT NULL,
                component_key TEXT NOT NULL,
                instance_count INTEGER NOT NULL DEFAULT 1,
                confidence TEXT,
                evidence TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_component_usage_url
                ON component_usage(url_id);
            CREATE INDEX IF NOT EXISTS idx_component_usage_key
                ON component_usage(component_key);
        "#,
        )?;
        Ok(())
    }

    /// Append detections for a URL. Returns the number of rows written.
    pub fn insert(&self, url_id: i64, detections: &[Detection]) -> Result<usize> {
        let conn = self.connect()?;
        with_immediate_tx(&conn, |conn| insert_rows(conn, url_id, detections))
    }

    /// Replace every detection for a URL with `detections`.
    pub fn replace(&self, url_id: i64, detections: &[Detection]) -> Result<usize> {
        let conn = self.connect()?;
        with_immediate_tx(&conn, |conn| {
            conn.execute("DELETE FROM component_usage WHERE url_id = ?", params![url_id])?;
            insert_rows(conn, url_id, detections)
        })
    }

    /// Delete detections for the given URLs. Returns rows removed.
    pub fn delete_for_urls(&self, url_ids: &[i64]) -> Result<usize> {
        if url_ids.is_empty() {
            return Ok(0);
        }

        let conn = self.connect()?;
        with_immediate_tx(&conn, |conn| {
            let mut stmt = conn.prepare("DELETE FROM component_usage WHERE url_id = ?")?;
            let mut removed = 0;
            for id in url_ids {
                removed += stmt.execute(params![id])?;
            }
            Ok(removed)
        })
    }

    pub fn for_url(&self, url_id: i64) -> Result<Vec<StoredDetection>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, url_id, component_key, instance_count, confidence, evidence, created_at
            FROM component_usage
            WHERE url_id = ?
            ORDER BY id
            "#,
        )?;

        let rows = stmt
            .query_map(params![url_id], row_to_stored_detection)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Ids of the market's URLs that have at least one detection.
    pub fn analyzed_url_ids(&self, market: &str) -> Result<Vec<i64>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT cu.url_id
            FROM component_usage cu
            JOIN url_inventory ui ON ui.id = cu.url_id
            WHERE ui.market = ?
            ORDER BY cu.url_id
            "#,
        )?;

        let ids = stmt
            .query_map(params![market], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(ids)
    }

    /// Usage per component for a market, most widespread first.
    pub fn summary(&self, market: &str) -> Result<Vec<ComponentSummary>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                cu.component_key,
                COUNT(DISTINCT cu.url_id),
                SUM(cu.instance_count)
            FROM component_usage cu
            JOIN url_inventory ui ON ui.id = cu.url_id
            WHERE ui.market = ?
            GROUP BY cu.component_key
            ORDER BY COUNT(DISTINCT cu.url_id) DESC, cu.component_key
            "#,
        )?;

        let rows = stmt
            .query_map(params![market], |row| {
                Ok(ComponentSummary {
                    component_key: row.get(0)?,
                    pages_with_component: row.get::<_, i64>(1)? as u64,
                    total_instances: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

fn insert_rows(conn: &Connection, url_id: i64, detections: &[Detection]) -> Result<usize> {
    let now = Utc::now().to_rfc3339();
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO component_usage (
            url_id, component_key, instance_count, confidence, evidence, created_at
        ) VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )?;

    for d in detections {
        stmt.execute(params![
            url_id,
            d.component_key.as_str(),
            d.instance_count,
            d.confidence.as_str(),
            d.evidence,
            now
        ])?;
    }

    Ok(detections.len())
}

fn row_to_stored_detection(row: &rusqlite::Row) -> rusqlite::Result<StoredDetection> {
    Ok(StoredDetection {
        id: row.get(0)?,
        url_id: row.get(1)?,
        component_key: row.get(2)?,
        instance_count: row.get(3)?,
        confidence: row.get(4)?,
        evidence: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComponentKey, Confidence, DiscoveredUrl};
    use crate::repository::InventoryRepository;
    use tempfile::TempDir;

    #[test]
    fn replace_and_summarize() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("cutool.db");
        let inventory = InventoryRepository::new(&db).unwrap();
        let repo = DetectionRepository::new(&db).unwrap();

        inventory
            .upsert_discovered(
                "UK",
                &[
                    DiscoveredUrl::new("https://example.com/a", "s"),
                    DiscoveredUrl::new("https://example.com/b", "s"),
                ],
            )
            .unwrap();
        let ids: Vec<i64> = inventory.pending("UK", 10).unwrap().iter().map(|r| r.id).collect();

        let accordion = Detection::new(
            ComponentKey::Accordion,
            1,
            Confidence::High,
            "accordion: 1, items=3, source=details",
        );
        let hero = Detection::new(ComponentKey::Hero, 1, Confidence::Medium, "hero: 1 (first content block)");

        repo.insert(ids[0], &[accordion.clone(), hero.clone()]).unwrap();
        repo.insert(ids[1], &[hero.clone()]).unwrap();
        // Replacing does not accumulate.
        repo.replace(ids[1], &[hero]).unwrap();

        let summary = repo.summary("UK").unwrap();
        assert_eq!(summary[0].component_key, "hero");
        assert_eq!(summary[0].pages_with_component, 2);
        assert_eq!(summary[0].total_instances, 2);
        assert_eq!(summary[1].component_key, "accordion");

        let stored = repo.for_url(ids[0]).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].confidence.as_deref(), Some("high"));

        assert_eq!(repo.analyzed_url_ids("UK").unwrap(), ids);
        assert_eq!(repo.delete_for_urls(&ids).unwrap(), 3);
        assert!(repo.summary("UK").unwrap().is_empty());
    }
}
