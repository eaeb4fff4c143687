use std::sync::LazyLock;

use scraper::Selector;

use super::instances;
use crate::detection::{dom, scope, PageContext, Rule, RuleError};
use crate::models::{ComponentKey, Confidence, Detection};

static TABLIST: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[role="tablist"]"#).unwrap());
static TAB: LazyLock<Selector> = LazyLock::new(|| Selector::parse(r#"[role="tab"]"#).unwrap());

/// ARIA tab widgets: a tablist whose tabs control real tabpanels.
pub struct TabsRule;

impl Rule for TabsRule {
    fn name(&self) -> &'static str {
        "tabs"
    }

    fn detect(&self, page: &PageContext<'_>) -> Result<Vec<Detection>, RuleError> {
        let mut qualifying: Vec<(usize, usize)> = Vec::new();

        for tablist in page.select_within_root(&TABLIST) {
            if scope::is_chrome(tablist) {
                continue;
            }

            let tabs: Vec<_> = tablist.select(&TAB).collect();
            if tabs.is_empty() {
                continue;
            }

            let panels = tabs
                .iter()
                .filter_map(|tab| dom::attr(*tab, "aria-controls"))
                .filter(|id| !id.is_empty())
                .filter_map(|id| page.element_by_id(id))
                .filter(|panel| dom::attr(*panel, "role") == Some("tabpanel"))
                .count();

            if panels > 0 {
                qualifying.push((tabs.len(), panels));
            }
        }

        let Some((tabs, panels)) = qualifying.first().copied() else {
            return Ok(Vec::new());
        };

        Ok(vec![Detection::new(
            ComponentKey::Tabs,
            instances(qualifying.len()),
            Confidence::High,
            format!("tabs: {} tabs, {} panels (ARIA-only)", tabs, panels),
        )])
    }
}
