use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

use super::cards_section::is_card_like_item;
use super::instances;
use crate::detection::{dom, scope, PageContext, Rule, RuleError};
use crate::models::{ComponentKey, Confidence, Detection};

static CONTAINERS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("section, div, article").unwrap());
static EMBEDDED: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[class*="card"], li"#).unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static ICON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"svg, img, [class*="icon"]"#).unwrap());
static BUTTONS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("button, a[href]").unwrap());

static BUTTON_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(btn|button|cta|primary|secondary)\b").unwrap());
static EXPLICIT_BUTTON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(btn|button|cta)\b").unwrap());

/// Non-wrapper ancestors allowed between a panel and the content root.
const MAX_SECTION_DEPTH: usize = 4;
/// Parent hops allowed between a button and its panel.
const BUTTON_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Tiles,
    Buttons,
}

impl Variant {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Tiles => "tiles",
            Self::Buttons => "buttons",
        }
    }
}

/// A section-level block rather than a fragment nested inside a card or list.
fn is_full_width(el: ElementRef<'_>, root: ElementRef<'_>) -> bool {
    if !dom::contains(root, el) || dom::closest(el, &EMBEDDED) {
        return false;
    }
    let depth = dom::ancestors(el)
        .take_while(|a| *a != root)
        .filter(|a| !scope::is_wrapper(*a))
        .count();
    depth <= MAX_SECTION_DEPTH
}

fn is_action_tile(tile: ElementRef<'_>) -> bool {
    if !dom::has(tile, &LINK) {
        return false;
    }
    let length = dom::text_len(tile);
    if !(3..=100).contains(&length) {
        return false;
    }
    dom::has(tile, &ICON) || length <= 50
}

fn is_button_like(el: ElementRef<'_>) -> bool {
    if dom::tag(el) == "button" {
        return true;
    }
    let label = dom::text_len(el);
    BUTTON_STYLE.is_match(dom::class_attr(el)) && (3..=40).contains(&label)
}

fn is_explicit_button(el: ElementRef<'_>) -> bool {
    dom::tag(el) == "button" || EXPLICIT_BUTTON.is_match(dom::class_attr(el))
}

/// Full-width panels offering the visitor's next steps.
pub struct NextActionPanelRule;

impl Rule for NextActionPanelRule {
    fn name(&self) -> &'static str {
        "next_action_panel"
    }

    fn detect(&self, page: &PageContext<'_>) -> Result<Vec<Detection>, RuleError> {
        let root = page.root();
        let mut panels: Vec<(usize, Variant)> = Vec::new();

        for container in page.select_in_root(&CONTAINERS) {
            if scope::is_chrome(container) || scope::in_footer(container) || scope::is_wrapper(container) {
                continue;
            }
            if !is_full_width(container, root) {
                continue;
            }

            let children = scope::content_children(container);

            if (3..=8).contains(&children.len()) {
                let tiles = children.iter().filter(|c| is_action_tile(**c)).count();
                if tiles >= 3 {
                    panels.push((tiles, Variant::Tiles));
                    continue;
                }
            }

            let buttons: Vec<_> = container
                .select(&BUTTONS)
                .filter(|el| dom::ancestor_within(*el, container, BUTTON_DEPTH))
                .filter(|el| is_button_like(*el))
                .collect();

            if !(1..=4).contains(&buttons.len()) {
                continue;
            }
            if !buttons.iter().any(|b| is_explicit_button(*b)) {
                continue;
            }
            if children.iter().any(|c| is_card_like_item(*c)) {
                continue;
            }
            panels.push((buttons.len(), Variant::Buttons));
        }

        let Some((actions, variant)) = panels.first().copied() else {
            return Ok(Vec::new());
        };

        Ok(vec![Detection::new(
            ComponentKey::NextActionPanel,
            instances(panels.len()),
            Confidence::Medium,
            format!(
                "next_action_panel: {} actions, variant={}",
                actions,
                variant.as_str()
            ),
        )])
    }
}
