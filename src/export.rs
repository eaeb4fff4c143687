//! Detections export: stored detections per URL as JSON, with a best-effort
//! structured reading of each evidence string.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::discovery::normalize_url;
use crate::repository::{DetectionRepository, InventoryRepository, Result};

static ITEMS_LIST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"items=\[([^\]]+)\]").unwrap());
static SECTIONS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s+sections").unwrap());
static ITEMS_PER_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"items_per_section=\[([^\]]+)\]").unwrap());
static ITEMS_COUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"items=(\d+)").unwrap());
static SOURCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"source=([\w-]+)").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedDetection {
    pub component_key: String,
    pub instance_count: u32,
    pub confidence: Option<String>,
    pub evidence_raw: Option<String>,
    pub evidence_parsed: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlDetections {
    pub url: String,
    pub url_id: Option<i64>,
    pub detections: Vec<ExportedDetection>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub total_urls_requested: usize,
    pub total_urls_found_in_inventory: usize,
    pub total_urls_with_detections: usize,
    pub total_detection_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionsExport {
    pub generated_at: String,
    pub market: String,
    pub summary: ExportSummary,
    pub urls: Vec<UrlDetections>,
}

/// Parse a URL list: one per line, blanks and `#` comments ignored,
/// duplicates dropped keeping first occurrence.
pub fn parse_url_list(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect()
}

fn parse_numbers(list: &str) -> Vec<Value> {
    list.split(',')
        .map(|s| match s.trim().parse::<i64>() {
            Ok(n) => json!(n),
            Err(_) => Value::Null,
        })
        .collect()
}

fn non_empty(map: Map<String, Value>) -> Option<Value> {
    (!map.is_empty()).then(|| Value::Object(map))
}

fn parse_carousel(evidence: &str) -> Option<Value> {
    let mut map = Map::new();
    if let Some(caps) = ITEMS_LIST.captures(evidence) {
        map.insert("items".into(), Value::Array(parse_numbers(&caps[1])));
    }
    if evidence.contains("controls=yes") {
        map.insert("controls".into(), json!("yes"));
    } else if evidence.contains("controls=no") {
        map.insert("controls".into(), json!("no"));
    } else if evidence.contains("controls") {
        map.insert("controls".into(), json!("yes"));
    }
    if evidence.contains("scrollable") {
        map.insert("scrollable".into(), json!(true));
    }
    if evidence.contains("deduped") {
        map.insert("deduped".into(), json!(true));
    }
    non_empty(map)
}

fn parse_cards_section(evidence: &str) -> Option<Value> {
    let mut map = Map::new();
    if let Some(n) = SECTIONS
        .captures(evidence)
        .and_then(|caps| caps[1].parse::<i64>().ok())
    {
        map.insert("sections".into(), json!(n));
    }
    if let Some(caps) = ITEMS_PER_SECTION.captures(evidence) {
        map.insert("items_per_section".into(), Value::Array(parse_numbers(&caps[1])));
    }
    non_empty(map)
}

fn parse_accordion(evidence: &str) -> Option<Value> {
    let mut map = Map::new();
    if let Some(n) = ITEMS_COUNT
        .captures(evidence)
        .and_then(|caps| caps[1].parse::<i64>().ok())
    {
        map.insert("items".into(), json!(n));
    }
    if let Some(caps) = SOURCE.captures(evidence) {
        map.insert("source".into(), json!(&caps[1]));
    }
    non_empty(map)
}

/// Structured view of an evidence string, for the component keys whose
/// evidence carries lists or sources. Never fails; unknown shapes yield `None`.
pub fn parse_evidence(component_key: &str, evidence: Option<&str>) -> Option<Value> {
    let evidence = evidence.filter(|e| !e.is_empty())?;
    match component_key {
        "image_carousel" | "card_carousel" => parse_carousel(evidence),
        "cards_section" => parse_cards_section(evidence),
        "accordion" => parse_accordion(evidence),
        _ => None,
    }
}

pub struct DetectionsExporter<'a> {
    inventory: &'a InventoryRepository,
    detections: &'a DetectionRepository,
}

impl<'a> DetectionsExporter<'a> {
    pub fn new(inventory: &'a InventoryRepository, detections: &'a DetectionRepository) -> Self {
        Self {
            inventory,
            detections,
        }
    }

    /// Export the given URLs. URLs are matched in normalized form.
    pub fn export_urls(&self, market: &str, urls: &[String]) -> Result<DetectionsExport> {
        let mut results = Vec::with_capacity(urls.len());
        for url in urls {
            let record = match self.inventory.get_by_url(market, url)? {
                Some(r) => Some(r),
                None => self.inventory.get_by_url(market, &normalize_url(url))?,
            };
            let Some(record) = record else {
                warn!(market, url = %url, "URL not in inventory");
                results.push(UrlDetections {
                    url: url.clone(),
                    url_id: None,
                    detections: Vec::new(),
                });
                continue;
            };
            let detections = self.load(record.id)?;
            if detections.is_empty() {
                warn!(url = %url, "URL has no detections (not analyzed yet?)");
            }
            results.push(UrlDetections {
                url: url.clone(),
                url_id: Some(record.id),
                detections,
            });
        }
        Ok(build(market, urls.len(), results))
    }

    /// Export every URL of a market that has detections.
    pub fn export_market(&self, market: &str) -> Result<DetectionsExport> {
        let mut results = Vec::new();
        for id in self.detections.analyzed_url_ids(market)? {
            let Some(record) = self.inventory.get(id)? else {
                continue;
            };
            results.push(UrlDetections {
                url: record.url,
                url_id: Some(id),
                detections: self.load(id)?,
            });
        }
        let requested = results.len();
        Ok(build(market, requested, results))
    }

    fn load(&self, url_id: i64) -> Result<Vec<ExportedDetection>> {
        Ok(self
            .detections
            .for_url(url_id)?
            .into_iter()
            .map(|row| ExportedDetection {
                evidence_parsed: parse_evidence(&row.component_key, row.evidence.as_deref()),
                component_key: row.component_key,
                instance_count: row.instance_count,
                confidence: row.confidence,
                evidence_raw: row.evidence,
            })
            .collect())
    }
}

fn build(market: &str, requested: usize, urls: Vec<UrlDetections>) -> DetectionsExport {
    let summary = ExportSummary {
        total_urls_requested: requested,
        total_urls_found_in_inventory: urls.iter().filter(|u| u.url_id.is_some()).count(),
        total_urls_with_detections: urls.iter().filter(|u| !u.detections.is_empty()).count(),
        total_detection_rows: urls.iter().map(|u| u.detections.len()).sum(),
    };
    DetectionsExport {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        market: market.to_string(),
        summary,
        urls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComponentKey, Confidence, Detection, DiscoveredUrl};
    use tempfile::TempDir;

    #[test]
    fn url_list_skips_comments_and_duplicates() {
        let text = "# proof pack\nhttps://a.example/\n\n  https://b.example/x \nhttps://a.example/\n";
        assert_eq!(
            parse_url_list(text),
            vec!["https://a.example/", "https://b.example/x"]
        );
    }

    #[test]
    fn parses_carousel_evidence() {
        let parsed = parse_evidence(
            "card_carousel",
            Some("card_carousel: 2 (deduped), items=[4,6], controls,scrollable, type=card"),
        )
        .unwrap();
        assert_eq!(parsed["items"], json!([4, 6]));
        assert_eq!(parsed["controls"], json!("yes"));
        assert_eq!(parsed["scrollable"], json!(true));
        assert_eq!(parsed["deduped"], json!(true));
    }

    #[test]
    fn parses_cards_and_accordion_evidence() {
        let cards = parse_evidence(
            "cards_section",
            Some("cards_section: 3 sections, items_per_section=[4,3,2]"),
        )
        .unwrap();
        assert_eq!(cards["sections"], json!(3));
        assert_eq!(cards["items_per_section"], json!([4, 3, 2]));

        let accordion =
            parse_evidence("accordion", Some("accordion: 1, items=5, source=aria-controls")).unwrap();
        assert_eq!(accordion["items"], json!(5));
        assert_eq!(accordion["source"], json!("aria-controls"));
    }

    #[test]
    fn other_components_have_no_parsed_evidence() {
        assert_eq!(parse_evidence("hero", Some("hero: 1 (first content block)")), None);
        assert_eq!(parse_evidence("accordion", None), None);
    }

    #[test]
    fn exports_requested_urls() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("cutool.db");
        let inventory = InventoryRepository::new(&db).unwrap();
        let detections = DetectionRepository::new(&db).unwrap();
        inventory
            .upsert_discovered("UK", &[DiscoveredUrl::new("https://example.com/a", "sitemap.xml")])
            .unwrap();
        let id = inventory.get_by_url("UK", "https://example.com/a").unwrap().unwrap().id;
        detections
            .insert(
                id,
                &[Detection::new(
                    ComponentKey::Accordion,
                    1,
                    Confidence::High,
                    "accordion: 1, items=3, source=details",
                )],
            )
            .unwrap();

        let exporter = DetectionsExporter::new(&inventory, &detections);
        let export = exporter
            .export_urls(
                "UK",
                &["https://Example.com/a/".to_string(), "https://example.com/missing".to_string()],
            )
            .unwrap();

        assert_eq!(export.summary.total_urls_requested, 2);
        assert_eq!(export.summary.total_urls_found_in_inventory, 1);
        assert_eq!(export.summary.total_urls_with_detections, 1);
        assert_eq!(export.summary.total_detection_rows, 1);
        assert_eq!(export.urls[0].detections[0].evidence_parsed.as_ref().unwrap()["items"], json!(3));
        assert_eq!(export.urls[1].url_id, None);

        let all = exporter.export_market("UK").unwrap();
        assert_eq!(all.urls.len(), 1);
        assert_eq!(all.urls[0].url, "https://example.com/a");
    }
}
