use std::sync::LazyLock;

use scraper::Selector;

use crate::detection::{dom, scope, PageContext, Rule, RuleError};
use crate::models::{ComponentKey, Confidence, Detection};

static DETAILS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("details").unwrap());
static EXPANDABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[aria-expanded]").unwrap());

const MIN_DETAILS: usize = 3;
const MIN_ARIA_TOGGLES: usize = 5;
const MIN_PANEL_TEXT: usize = 50;

/// Accordions, from native `<details>` first and ARIA toggles second.
/// A page reports at most one accordion.
pub struct AccordionRule;

impl Rule for AccordionRule {
    fn name(&self) -> &'static str {
        "accordion"
    }

    fn detect(&self, page: &PageContext<'_>) -> Result<Vec<Detection>, RuleError> {
        let details = page
            .select_within_root(&DETAILS)
            .into_iter()
            .filter(|el| !scope::in_footer(*el) && !scope::is_chrome(*el))
            .count();

        if details >= MIN_DETAILS {
            return Ok(vec![Detection::new(
                ComponentKey::Accordion,
                1,
                Confidence::High,
                format!("accordion: 1, items={}, source=details", details),
            )]);
        }

        let toggles = page
            .select_within_root(&EXPANDABLE)
            .into_iter()
            .filter(|el| !scope::in_footer(*el) && !scope::is_chrome(*el))
            .filter(|el| {
                dom::attr(*el, "aria-controls")
                    .filter(|id| !id.is_empty())
                    .and_then(|id| page.element_by_id(id))
                    .is_some_and(|panel| dom::text_len(panel) >= MIN_PANEL_TEXT)
            })
            .count();

        if toggles >= MIN_ARIA_TOGGLES {
            return Ok(vec![Detection::new(
                ComponentKey::Accordion,
                1,
                Confidence::Medium,
                format!("accordion: 1, items={}, source=aria-controls", toggles),
            )]);
        }

        Ok(Vec::new())
    }
}
