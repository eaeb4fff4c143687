use std::sync::LazyLock;

use scraper::Selector;

use super::instances;
use crate::detection::{dom, scope, selector, PageContext, Rule, RuleError};
use crate::models::{ComponentKey, Confidence, Detection};

const KEYWORDS: &[&str] = &["icon", "feature", "benefit"];

static ICON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"svg, img, [class*="icon"]"#).unwrap());

/// Repeated icon plus short text items.
pub struct IconGridRule;

impl Rule for IconGridRule {
    fn name(&self) -> &'static str {
        "icon_grid"
    }

    fn detect(&self, page: &PageContext<'_>) -> Result<Vec<Detection>, RuleError> {
        let mut containers = Vec::new();
        for keyword in KEYWORDS {
            let sel = selector(&format!(r#"[class*="{}"]"#, keyword))?;
            for el in page.select_within_root(&sel) {
                if scope::is_chrome(el) || scope::is_wrapper(el) {
                    continue;
                }
                if dom::children(el).len() >= 3 {
                    dom::push_unique(&mut containers, el);
                }
            }
        }

        let grids = containers
            .into_iter()
            .filter(|container| {
                dom::children(*container)
                    .into_iter()
                    .filter(|item| dom::has(*item, &ICON) && dom::text_len(*item) >= 10)
                    .count()
                    >= 3
            })
            .count();

        if grids == 0 {
            return Ok(Vec::new());
        }

        Ok(vec![Detection::new(
            ComponentKey::IconGrid,
            instances(grids),
            Confidence::Medium,
            format!("{} icon grid(s) with icon+text items", grids),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::rules::test_support::run;

    #[test]
    fn detects_feature_list() {
        let html = r#"<main><ul class="features">
            <li><svg></svg><span>Adaptive cruise control</span></li>
            <li><svg></svg><span>Lane keeping assist</span></li>
            <li><img src="/i.svg"><span>Around view monitor</span></li>
        </ul></main>"#;
        let found = run(&IconGridRule, html);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].evidence, "1 icon grid(s) with icon+text items");
    }

    #[test]
    fn short_labels_do_not_count() {
        let html = r#"<main><ul class="features">
            <li><svg></svg>A</li><li><svg></svg>B</li><li><svg></svg>C</li>
        </ul></main>"#;
        assert!(run(&IconGridRule, html).is_empty());
    }
}
