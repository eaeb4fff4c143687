//! Hero and promo sections.
//!
//! The first hero-like block in normal document flow is the page hero. Every
//! other hero-like block is reported as its own promo section.

use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use super::anchor_nav::HASH_LINKS;
use crate::detection::{dom, scope, PageContext, Rule, RuleError};
use crate::models::{ComponentKey, Confidence, Detection};

static CONTAINERS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("section, div, article").unwrap());
static HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"h1, h2, [role="heading"]"#).unwrap());
static MEDIA: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img, picture, video").unwrap());
static ACTION: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a, button").unwrap());

const MIN_HERO_TEXT: usize = 30;
const MIN_BLOCKING_TEXT: usize = 30;
const MIN_BLOCKING_DIV_TEXT: usize = 50;

fn is_hero_like(el: ElementRef<'_>) -> bool {
    dom::has(el, &HEADING)
        && (dom::has(el, &MEDIA) || dom::has(el, &ACTION))
        && dom::text_len(el) >= MIN_HERO_TEXT
}

fn is_sticky_or_fixed(el: ElementRef<'_>) -> bool {
    let style = dom::attr(el, "style").unwrap_or("");
    let class = dom::class_attr(el);
    style.contains("position: sticky")
        || style.contains("position: fixed")
        || class.contains("sticky")
        || class.contains("fixed")
}

/// Whether an element preceding the first candidate pushes it out of the
/// hero position.
fn blocks_hero(el: ElementRef<'_>) -> bool {
    if is_sticky_or_fixed(el) || scope::is_wrapper(el) {
        return false;
    }

    let text = dom::text_len(el);
    let tag = dom::tag(el);

    // In-page navigation blocks even when it sits in a nav landmark.
    if matches!(tag, "nav" | "ul" | "ol")
        && el.select(&HASH_LINKS).count() >= 3
        && text >= MIN_BLOCKING_TEXT
    {
        return true;
    }

    if scope::is_chrome(el) || text < MIN_BLOCKING_TEXT {
        return false;
    }

    let role = dom::attr(el, "role");
    if matches!(tag, "section" | "article" | "aside")
        || role == Some("alert")
        || role == Some("banner")
    {
        return true;
    }

    tag == "div" && text >= MIN_BLOCKING_DIV_TEXT
}

/// Hero and promo blocks.
pub struct HeroRule;

impl Rule for HeroRule {
    fn name(&self) -> &'static str {
        "hero"
    }

    fn detect(&self, page: &PageContext<'_>) -> Result<Vec<Detection>, RuleError> {
        let candidates: Vec<_> = page
            .select_in_root(&CONTAINERS)
            .into_iter()
            .filter(|el| !scope::is_chrome(*el) && !scope::is_wrapper(*el))
            .filter(|el| is_hero_like(*el))
            .collect();

        let Some(first) = candidates.first().copied() else {
            return Ok(Vec::new());
        };

        // Ancestors of the candidate enclose it rather than precede it.
        let blocked = page
            .body()
            .descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .take_while(|el| *el != first)
            .filter(|el| !dom::contains(*el, first))
            .any(blocks_hero);

        let detections = candidates
            .iter()
            .enumerate()
            .map(|(i, _)| {
                if i == 0 && !blocked {
                    Detection::new(
                        ComponentKey::Hero,
                        1,
                        Confidence::Medium,
                        "hero: 1 (first content block)",
                    )
                } else {
                    Detection::new(
                        ComponentKey::PromoSection,
                        1,
                        Confidence::Medium,
                        "promo_section: 1 (not first content block)",
                    )
                }
            })
            .collect();

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::rules::test_support::run;

    fn block(title: &str) -> String {
        format!(
            r#"<section><h2>{title}</h2><img src="/x.jpg"><a href="/go">Discover the range today</a></section>"#
        )
    }

    fn keys(found: &[Detection]) -> Vec<ComponentKey> {
        found.iter().map(|d| d.component_key).collect()
    }

    #[test]
    fn first_block_is_hero_rest_are_promos() {
        let html = format!(
            "<header><nav>menu</nav></header><main>{}{}{}</main>",
            block("New Qashqai"),
            block("Offers"),
            block("Electric")
        );
        let found = run(&HeroRule, &html);
        assert_eq!(
            keys(&found),
            vec![
                ComponentKey::Hero,
                ComponentKey::PromoSection,
                ComponentKey::PromoSection
            ]
        );
        assert_eq!(found[0].evidence, "hero: 1 (first content block)");
        assert!(found.iter().all(|d| d.instance_count == 1));
    }

    #[test]
    fn preceding_alert_blocks_hero() {
        let html = format!(
            r#"<main><div role="alert">Important recall notice for selected models built in 2021.</div>{}</main>"#,
            block("New Qashqai")
        );
        let found = run(&HeroRule, &html);
        assert_eq!(keys(&found), vec![ComponentKey::PromoSection]);
    }

    #[test]
    fn sticky_bar_does_not_block() {
        let html = format!(
            r#"<main><div class="sticky-bar">Get a quote today and save money on your next car</div>{}</main>"#,
            block("New Qashqai")
        );
        let found = run(&HeroRule, &html);
        assert_eq!(keys(&found), vec![ComponentKey::Hero]);
    }

    #[test]
    fn never_more_than_one_hero() {
        let html: String = (0..5).map(|i| block(&format!("Block {i}"))).collect();
        let found = run(&HeroRule, &format!("<main>{html}</main>"));
        let heroes = found.iter().filter(|d| d.component_key == ComponentKey::Hero).count();
        assert_eq!(heroes, 1);
        assert_eq!(found.len(), 5);
    }
}
