//! Small DOM helpers over `scraper` element references.

use scraper::{ElementRef, Selector};

/// Trimmed text content of an element.
pub fn text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Length in characters of the trimmed text content.
pub fn text_len(el: ElementRef<'_>) -> usize {
    let raw: String = el.text().collect();
    raw.trim().chars().count()
}

pub fn attr<'a>(el: ElementRef<'a>, name: &str) -> Option<&'a str> {
    el.value().attr(name)
}

/// The raw `class` attribute, empty when absent.
pub fn class_attr<'a>(el: ElementRef<'a>) -> &'a str {
    el.value().attr("class").unwrap_or("")
}

pub fn tag(el: ElementRef<'_>) -> &str {
    el.value().name()
}

pub fn parent(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.parent().and_then(ElementRef::wrap)
}

pub fn children(el: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    el.children().filter_map(ElementRef::wrap).collect()
}

pub fn ancestors(el: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    el.ancestors().filter_map(ElementRef::wrap)
}

/// Number of element ancestors.
pub fn depth(el: ElementRef<'_>) -> usize {
    ancestors(el).count()
}

/// True when `inner` is `outer` or one of its descendants.
pub fn contains(outer: ElementRef<'_>, inner: ElementRef<'_>) -> bool {
    outer == inner || ancestors(inner).any(|a| a == outer)
}

/// True when the element or one of its ancestors matches.
pub fn closest(el: ElementRef<'_>, selector: &Selector) -> bool {
    selector.matches(&el) || ancestors(el).any(|a| selector.matches(&a))
}

/// True when any descendant matches.
pub fn has(el: ElementRef<'_>, selector: &Selector) -> bool {
    el.select(selector).next().is_some()
}

/// True when `container` is reached within `steps + 1` parent hops of `el`.
pub fn ancestor_within(el: ElementRef<'_>, container: ElementRef<'_>, steps: usize) -> bool {
    ancestors(el).take(steps + 1).any(|a| a == container)
}

/// Push unless an equal reference is already present, keeping first-seen order.
pub fn push_unique<'a>(list: &mut Vec<ElementRef<'a>>, el: ElementRef<'a>) {
    if !list.contains(&el) {
        list.push(el);
    }
}

/// Sort candidates by depth (stable) and accept each one that no
/// previously accepted candidate contains.
pub fn keep_outermost(mut candidates: Vec<ElementRef<'_>>) -> Vec<ElementRef<'_>> {
    candidates.sort_by_key(|el| depth(*el));
    let mut accepted: Vec<ElementRef<'_>> = Vec::new();
    for candidate in candidates {
        if !accepted.iter().any(|a| contains(*a, candidate)) {
            accepted.push(candidate);
        }
    }
    accepted
}

/// Drop every candidate contained by another one, keeping document order.
pub fn drop_nested<'a>(candidates: &[ElementRef<'a>]) -> Vec<ElementRef<'a>> {
    candidates
        .iter()
        .copied()
        .filter(|c| !candidates.iter().any(|o| o != c && contains(*o, *c)))
        .collect()
}

/// Whether an inline `style` attribute sets a background image.
pub fn has_inline_background_image(el: ElementRef<'_>) -> bool {
    let Some(style) = attr(el, "style") else {
        return false;
    };
    style.split(';').any(|decl| {
        let Some((prop, value)) = decl.split_once(':') else {
            return false;
        };
        let prop = prop.trim().to_ascii_lowercase();
        let value = value.trim();
        match prop.as_str() {
            "background-image" => !value.is_empty() && !value.eq_ignore_ascii_case("none"),
            "background" => value.to_ascii_lowercase().contains("url("),
            _ => false,
        }
    })
}
