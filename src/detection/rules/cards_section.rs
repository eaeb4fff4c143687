use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use super::{instances, join_counts};
use crate::detection::{dom, scope, PageContext, Rule, RuleError};
use crate::models::{ComponentKey, Confidence, Detection};

static CONTAINERS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div, section, ul, ol, article").unwrap());
static HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"h2, h3, h4, h5, h6, [role="heading"]"#).unwrap());
static MEDIA: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"img, picture, svg, [role="img"]"#).unwrap());
static ACTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href], button").unwrap());
static LINKS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

const MIN_CARDS: usize = 3;

/// Paths that mark support or owner teasers rather than product content.
const DENY_PATHS: &[&str] = &[
    "/owners",
    "/customer-service",
    "/roadside",
    "/breakdown",
    "/manual",
    "/support",
    "/contact",
    "/help",
];

/// Paths that mark product, offer or vehicle content.
const ALLOW_PATHS: &[&str] = &[
    "/vehicles",
    "/offers",
    "/electric-vehicles",
    "/finance",
    "/business",
    "/fleet",
    "/qashqai",
    "/juke",
    "/ariya",
    "/leaf",
    "/x-trail",
    "/townstar",
    "/navara",
    "/gt-r",
    "/z",
    "/micra",
];

/// A card: some text plus a heading, visual media and an action.
pub(crate) fn is_card_like(el: ElementRef<'_>) -> bool {
    dom::text_len(el) >= 5
        && dom::has(el, &HEADING)
        && dom::has(el, &MEDIA)
        && dom::has(el, &ACTION)
}

/// Looser card test used to tell per-card actions from standalone ones:
/// some text plus any of a heading, visual media or an action.
pub(crate) fn is_card_like_item(el: ElementRef<'_>) -> bool {
    dom::text_len(el) >= 5
        && (dom::has(el, &HEADING) || dom::has(el, &MEDIA) || dom::has(el, &ACTION))
}

fn card_count(container: ElementRef<'_>) -> usize {
    dom::children(container)
        .into_iter()
        .filter(|child| is_card_like(*child))
        .count()
}

/// Whether a section's links point at product or offer pages.
fn has_product_intent(section: ElementRef<'_>) -> bool {
    let hrefs: Vec<String> = section
        .select(&LINKS)
        .filter_map(|a| dom::attr(a, "href"))
        .map(|href| href.trim().to_lowercase())
        .filter(|href| href.len() > 1 && href != "#")
        .collect();

    if hrefs.is_empty() {
        return false;
    }
    if hrefs
        .iter()
        .any(|href| DENY_PATHS.iter().any(|p| href.contains(p)))
    {
        return false;
    }
    hrefs
        .iter()
        .any(|href| ALLOW_PATHS.iter().any(|p| href.contains(p)))
}

/// Content sections listing product or offer cards.
pub struct CardsSectionRule;

impl Rule for CardsSectionRule {
    fn name(&self) -> &'static str {
        "cards_section"
    }

    fn detect(&self, page: &PageContext<'_>) -> Result<Vec<Detection>, RuleError> {
        let candidates: Vec<_> = page
            .select_in_root(&CONTAINERS)
            .into_iter()
            .filter(|el| !scope::is_chrome(*el) && !scope::is_wrapper(*el) && !scope::in_footer(*el))
            .filter(|el| card_count(*el) >= MIN_CARDS)
            .collect();

        let sections: Vec<usize> = dom::drop_nested(&candidates)
            .into_iter()
            .filter(|section| has_product_intent(*section))
            .map(card_count)
            .collect();

        if sections.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![Detection::new(
            ComponentKey::CardsSection,
            instances(sections.len()),
            Confidence::Medium,
            format!(
                "cards_section: {} sections, items_per_section=[{}]",
                sections.len(),
                join_counts(&sections)
            ),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::rules::test_support::run;

    fn card(href: &str, title: &str) -> String {
        format!(
            r#"<li><img src="/{title}.jpg"><h3>{title}</h3><a href="{href}">Explore</a></li>"#
        )
    }

    #[test]
    fn detects_product_card_list() {
        let cards: String = ["qashqai", "juke", "leaf"]
            .iter()
            .map(|m| card(&format!("/vehicles/{m}"), m))
            .collect();
        let found = run(&CardsSectionRule, &format!("<main><ul>{cards}</ul></main>"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].instance_count, 1);
        assert_eq!(
            found[0].evidence,
            "cards_section: 1 sections, items_per_section=[3]"
        );
    }

    #[test]
    fn support_links_exclude_section() {
        let cards = format!(
            "{}{}{}",
            card("/vehicles/juke", "juke"),
            card("/owners/manuals", "manuals"),
            card("/offers", "offers")
        );
        assert!(run(&CardsSectionRule, &format!("<main><ul>{cards}</ul></main>")).is_empty());
    }

    #[test]
    fn cards_need_media_and_heading() {
        let items: String = (0..3)
            .map(|i| format!(r#"<li><h3>Model {i}</h3><a href="/vehicles/{i}">Go</a></li>"#))
            .collect();
        assert!(run(&CardsSectionRule, &format!("<main><ul>{items}</ul></main>")).is_empty());
    }
}
