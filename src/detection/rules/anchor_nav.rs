use std::sync::LazyLock;

use scraper::Selector;

use super::instances;
use crate::detection::{dom, scope, PageContext, Rule, RuleError};
use crate::models::{ComponentKey, Confidence, Detection};

static LISTS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("nav, ul, ol").unwrap());
pub(super) static HASH_LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r##"a[href^="#"]"##).unwrap());

const MIN_ANCHORS: usize = 3;

/// In-page navigation: lists of fragment links whose targets exist.
pub struct AnchorNavRule;

impl Rule for AnchorNavRule {
    fn name(&self) -> &'static str {
        "anchor_nav"
    }

    fn detect(&self, page: &PageContext<'_>) -> Result<Vec<Detection>, RuleError> {
        let mut navs = 0usize;
        let mut total_anchors = 0usize;

        for container in page.select_in_root(&LISTS) {
            if scope::is_chrome(container) {
                continue;
            }

            let anchors: Vec<_> = container.select(&HASH_LINKS).collect();
            if anchors.len() < MIN_ANCHORS {
                continue;
            }

            let valid = anchors
                .iter()
                .filter_map(|a| dom::attr(*a, "href"))
                .filter(|href| *href != "#")
                .filter(|href| page.element_by_id(&href[1..]).is_some())
                .count();

            if valid >= MIN_ANCHORS {
                navs += 1;
                total_anchors += anchors.len();
            }
        }

        if navs == 0 {
            return Ok(Vec::new());
        }

        Ok(vec![Detection::new(
            ComponentKey::AnchorNav,
            instances(navs),
            Confidence::High,
            format!("{} in-page nav(s) with {} anchors (in content)", navs, total_anchors),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::rules::test_support::run;

    #[test]
    fn counts_lists_with_live_targets() {
        let html = r##"<main>
            <ul><li><a href="#a">A</a></li><li><a href="#b">B</a></li>
                <li><a href="#c">C</a></li><li><a href="#">top</a></li></ul>
            <section id="a">a</section><section id="b">b</section><section id="c">c</section>
        </main>"##;
        let found = run(&AnchorNavRule, html);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].instance_count, 1);
        assert_eq!(found[0].evidence, "1 in-page nav(s) with 4 anchors (in content)");
    }

    #[test]
    fn dangling_targets_do_not_count() {
        let html = r##"<main><ul><li><a href="#a">A</a></li><li><a href="#x">X</a></li>
            <li><a href="#y">Y</a></li></ul><div id="a"></div></main>"##;
        assert!(run(&AnchorNavRule, html).is_empty());
    }
}
