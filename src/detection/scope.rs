//! Page scoping shared by every rule: where content lives, what counts as
//! site chrome, and which elements are pure layout scaffolding.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::dom;

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter().map(|s| Selector::parse(s).unwrap()).collect()
}

/// Content root candidates, tried in order.
static CONTENT_ROOTS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        "main",
        r#"[role="main"]"#,
        "article",
        "#main",
        "#content",
        "#page",
        "#container",
    ])
});

/// Header, navigation, footer, dialogs and consent overlays.
static CHROME: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        "footer",
        r#"[role="contentinfo"]"#,
        "header",
        "nav",
        ".meganav-container",
        r#"[class*="c_010D"]"#,
        r#"[role="dialog"][aria-modal="true"]"#,
        "#onetrust-consent-sdk",
        r#"[id*="onetrust"]"#,
        r#"[class*="onetrust"]"#,
        r#"[class*="cookie"]"#,
        r#"[class*="consent"]"#,
        r#"[id*="footer"]"#,
        r#"[class*="footer"]"#,
    ])
});

/// CMS grid scaffolding that never counts as a component container.
static LAYOUT_WRAPPERS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        ".responsivegrid",
        ".aem-Grid",
        r#"[class*="aem-Grid"]"#,
        ".aem-GridColumn",
        ".parsys",
        ".grid-row.bleed",
        ".dummy-parent-class",
    ])
});

static FOOTER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"footer, [role="contentinfo"]"#).unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

/// The element holding the page's main content, falling back to `body`.
pub fn content_root(doc: &Html) -> ElementRef<'_> {
    CONTENT_ROOTS
        .iter()
        .find_map(|sel| doc.select(sel).next())
        .or_else(|| body(doc))
        .unwrap_or_else(|| doc.root_element())
}

pub fn body(doc: &Html) -> Option<ElementRef<'_>> {
    doc.select(&BODY).next()
}

/// True when the element or any ancestor is site chrome.
pub fn is_chrome(el: ElementRef<'_>) -> bool {
    std::iter::once(el)
        .chain(dom::ancestors(el))
        .any(|node| CHROME.iter().any(|sel| sel.matches(&node)))
}

/// True when the element itself is a layout wrapper.
pub fn is_wrapper(el: ElementRef<'_>) -> bool {
    LAYOUT_WRAPPERS.iter().any(|sel| sel.matches(&el))
}

/// True when the element sits in a footer or contentinfo landmark.
pub fn in_footer(el: ElementRef<'_>) -> bool {
    dom::closest(el, &FOOTER)
}

/// Element children that are not layout wrappers.
pub fn content_children(el: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    dom::children(el)
        .into_iter()
        .filter(|child| !is_wrapper(*child))
        .collect()
}
