//! Heuristic component detection over captured page markup.
//!
//! A page is parsed once and handed to an ordered list of [`Rule`]s. Each rule
//! inspects the shared [`PageContext`] and reports zero or more detections.
//! A failing rule is logged and contributes nothing; the engine itself never
//! fails.

pub mod dom;
mod rules;
pub mod scope;

use std::collections::HashMap;

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::Detection;

pub use rules::{
    AccordionRule, AnchorNavRule, CardCarouselRule, CardsSectionRule, HeroRule, IconGridRule,
    ImageCarouselRule, InfoSpecsRule, MediaTextSplitRule, NextActionPanelRule, TabsRule,
};

/// Errors a single rule can raise.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },
    #[error("{0}")]
    Other(String),
}

/// Parse a selector built at runtime.
pub(crate) fn selector(source: &str) -> Result<Selector, RuleError> {
    Selector::parse(source).map_err(|e| RuleError::Selector {
        selector: source.to_string(),
        reason: format!("{e:?}"),
    })
}

/// Parsed page plus the lookups every rule needs.
pub struct PageContext<'a> {
    doc: &'a Html,
    root: ElementRef<'a>,
    ids: HashMap<&'a str, ElementRef<'a>>,
}

impl<'a> PageContext<'a> {
    pub fn new(doc: &'a Html) -> Self {
        let mut ids = HashMap::new();
        for node in doc.root_element().descendants() {
            if let Some(el) = ElementRef::wrap(node) {
                if let Some(id) = el.value().attr("id") {
                    ids.entry(id).or_insert(el);
                }
            }
        }
        Self {
            doc,
            root: scope::content_root(doc),
            ids,
        }
    }

    pub fn document(&self) -> &'a Html {
        self.doc
    }

    /// Content root (see [`scope::content_root`]).
    pub fn root(&self) -> ElementRef<'a> {
        self.root
    }

    pub fn body(&self) -> ElementRef<'a> {
        scope::body(self.doc).unwrap_or_else(|| self.doc.root_element())
    }

    /// First element carrying the given id, like `getElementById`.
    pub fn element_by_id(&self, id: &str) -> Option<ElementRef<'a>> {
        self.ids.get(id).copied()
    }

    /// Descendants of the content root matching `selector`.
    pub fn select_in_root(&self, selector: &Selector) -> Vec<ElementRef<'a>> {
        self.root.select(selector).collect()
    }

    /// Elements anywhere in the document matching `selector` that lie inside
    /// the content root (the root itself included).
    pub fn select_within_root(&self, selector: &Selector) -> Vec<ElementRef<'a>> {
        self.doc
            .select(selector)
            .filter(|el| dom::contains(self.root, *el))
            .collect()
    }
}

/// One detection heuristic.
pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, page: &PageContext<'_>) -> Result<Vec<Detection>, RuleError>;
}

/// Runs the rule set over page markup.
pub struct DetectionEngine {
    rules: Vec<Box<dyn Rule>>,
}

impl Default for DetectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionEngine {
    /// Engine with the standard rule order.
    pub fn new() -> Self {
        Self::with_rules(vec![
            Box::new(TabsRule),
            Box::new(AccordionRule),
            Box::new(AnchorNavRule),
            Box::new(ImageCarouselRule),
            Box::new(CardCarouselRule),
            Box::new(CardsSectionRule),
            Box::new(IconGridRule),
            Box::new(MediaTextSplitRule),
            Box::new(InfoSpecsRule),
            Box::new(NextActionPanelRule),
            Box::new(HeroRule),
        ])
    }

    pub fn with_rules(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Detect components in a page. Rule failures are logged and skipped.
    pub fn detect(&self, html: &str) -> Vec<Detection> {
        let doc = Html::parse_document(html);
        let page = PageContext::new(&doc);
        let mut detections = Vec::new();

        for rule in &self.rules {
            match rule.detect(&page) {
                Ok(found) => {
                    if !found.is_empty() {
                        debug!(rule = rule.name(), count = found.len(), "Rule matched");
                    }
                    detections.extend(found);
                }
                Err(e) => {
                    warn!(rule = rule.name(), error = %e, "Detection rule failed");
                }
            }
        }

        detections
    }
}
