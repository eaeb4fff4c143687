//! Static-markup signature used to decide whether a page needs rendering.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::models::RenderMode;

static SEMANTIC: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("section, article, main, aside, header, nav").unwrap());
static BLOCKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div, section, article, p, ul, ol, table").unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

/// Ids of the mount points client-side frameworks render into.
const SPA_ROOT_IDS: &[&str] = &["root", "__next", "app", "__nuxt"];

/// Structural summary of server-delivered markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomSignature {
    pub has_semantic_blocks: bool,
    pub has_content: bool,
    pub has_single_root: bool,
    pub text_length: usize,
    pub block_elements: usize,
}

impl DomSignature {
    /// Compute the signature of a markup string. Malformed markup is parsed
    /// leniently and simply yields a sparse signature.
    pub fn analyze(html: &str) -> Self {
        let doc = Html::parse_document(html);

        let has_semantic_blocks = doc.select(&SEMANTIC).next().is_some();

        let has_single_root = SPA_ROOT_IDS.iter().any(|id| {
            let Ok(sel) = Selector::parse(&format!("[id=\"{}\"]", id)) else {
                return false;
            };
            doc.select(&sel)
                .next()
                .is_some_and(|el| el.child_elements().next().is_none())
        });

        let text_length = doc
            .select(&BODY)
            .next()
            .map(|body| body.text().collect::<String>().trim().chars().count())
            .unwrap_or(0);

        let block_elements = doc.select(&BLOCKS).count();

        Self {
            has_semantic_blocks,
            has_content: text_length > 500 && block_elements > 10,
            has_single_root,
            text_length,
            block_elements,
        }
    }

    /// Whether the static markup is a script shell that must be rendered.
    pub fn needs_rendering(&self) -> bool {
        if self.has_semantic_blocks && self.has_content {
            return false;
        }
        if self.has_single_root && self.text_length < 200 {
            return true;
        }
        self.text_length < 300 && self.block_elements < 5
    }

    pub fn render_mode(&self) -> RenderMode {
        if self.needs_rendering() {
            RenderMode::Rendered
        } else {
            RenderMode::Static
        }
    }
}
