use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

use super::instances;
use crate::detection::{dom, scope, PageContext, Rule, RuleError};
use crate::models::{ComponentKey, Confidence, Detection};

static CONTAINERS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("section, div, article, ul, ol").unwrap());
static ACTIONS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href], button").unwrap());

static DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").unwrap());
static DRIVE_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(2WD|4WD|AWD|FWD|RWD)\b").unwrap());
static SEATS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b\d+\s*(seats?)\b").unwrap());
static UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(miles?|mins?|minutes?|km|kW|kg|liters?|litres?|m3|Nm|g/km|mpg|%|seats?|WD)\b")
        .unwrap()
});

const MIN_TILES: usize = 3;
const MAX_TILES: usize = 12;
const MAX_TILE_TEXT: usize = 200;
const SAMPLE_TILES: usize = 3;
const SAMPLE_CHARS: usize = 30;

/// A concise value-plus-label tile such as "450 km / WLTP range".
fn is_metric_tile(tile: ElementRef<'_>) -> bool {
    let text = dom::text(tile);
    let length = text.chars().count();
    if length == 0 {
        return false;
    }

    let action_text: usize = tile.select(&ACTIONS).map(dom::text_len).sum();
    if action_text > 0 && action_text as f64 > length as f64 * 0.5 {
        return false;
    }

    let has_value = DIGIT.is_match(&text) || DRIVE_TYPE.is_match(&text) || SEATS.is_match(&text);
    if !has_value {
        return false;
    }

    let segments = text
        .split('\n')
        .flat_map(|line| line.split("<br>"))
        .filter(|s| !s.trim().is_empty())
        .count();
    let has_label = segments >= 2 || UNIT.is_match(&text);

    has_label && length < MAX_TILE_TEXT
}

fn sample(tile: ElementRef<'_>) -> String {
    let text = dom::text(tile);
    let first_line = text.split('\n').next().unwrap_or("").trim();
    first_line.chars().take(SAMPLE_CHARS).collect()
}

/// Blocks of three to twelve metric tiles.
pub struct InfoSpecsRule;

impl Rule for InfoSpecsRule {
    fn name(&self) -> &'static str {
        "info_specs"
    }

    fn detect(&self, page: &PageContext<'_>) -> Result<Vec<Detection>, RuleError> {
        let mut blocks: Vec<Vec<ElementRef<'_>>> = Vec::new();

        for container in page.select_in_root(&CONTAINERS) {
            if scope::is_chrome(container) || scope::in_footer(container) || scope::is_wrapper(container) {
                continue;
            }

            let children = scope::content_children(container);
            if !(MIN_TILES..=MAX_TILES).contains(&children.len()) {
                continue;
            }

            let tiles: Vec<_> = children.into_iter().filter(|c| is_metric_tile(*c)).collect();
            if tiles.len() >= MIN_TILES {
                blocks.push(tiles);
            }
        }

        let Some(first) = blocks.first() else {
            return Ok(Vec::new());
        };

        let samples: Vec<String> = first.iter().take(SAMPLE_TILES).map(|t| sample(*t)).collect();
        Ok(vec![Detection::new(
            ComponentKey::InfoSpecs,
            instances(blocks.len()),
            Confidence::Medium,
            format!(
                "info_specs: {} tiles, sample=[{}]",
                first.len(),
                samples.join("; ")
            ),
        )])
    }
}
