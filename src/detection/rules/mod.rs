//! The individual detection rules.

mod accordion;
mod anchor_nav;
mod cards_section;
mod carousel;
mod hero;
mod icon_grid;
mod info_specs;
mod media_text_split;
mod next_action;
mod tabs;

pub use accordion::AccordionRule;
pub use anchor_nav::AnchorNavRule;
pub use cards_section::CardsSectionRule;
pub use carousel::{CardCarouselRule, ImageCarouselRule};
pub use hero::HeroRule;
pub use icon_grid::IconGridRule;
pub use info_specs::InfoSpecsRule;
pub use media_text_split::MediaTextSplitRule;
pub use next_action::NextActionPanelRule;
pub use tabs::TabsRule;

/// Join counts as `a,b,c` for evidence strings.
fn join_counts(counts: &[usize]) -> String {
    counts
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Clamp a candidate count into an instance count.
fn instances(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
pub(crate) mod test_support {
    use scraper::Html;

    use crate::detection::{PageContext, Rule};
    use crate::models::Detection;

    /// Run one rule over a markup snippet.
    pub fn run(rule: &dyn Rule, html: &str) -> Vec<Detection> {
        let doc = Html::parse_document(html);
        let page = PageContext::new(&doc);
        rule.detect(&page).unwrap()
    }
}
