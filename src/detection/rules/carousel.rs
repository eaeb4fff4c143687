//! Image and card carousels.
//!
//! Both rules share candidate collection and a classifier, so a container
//! is reported as one kind of carousel or the other, never both.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use super::{instances, join_counts};
use crate::detection::{dom, scope, selector, PageContext, Rule, RuleError};
use crate::models::{ComponentKey, Confidence, Detection};

const IMAGE_KEYWORDS: &[&str] = &["carousel", "slider", "slideshow", "swiper", "slick"];
const CARD_KEYWORDS: &[&str] = &["carousel", "slider", "swiper", "slick"];

static PAGINATION: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        ".swiper-pagination",
        ".slick-dots",
        r#"[class*="pagination"]"#,
        r#"[class*="dots"]"#,
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});

static CONTROLS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#".swiper-pagination, .slick-dots, [class*="pagination"], [class*="dots"],
           [class*="prev"], [class*="next"], [class*="arrow"]"#,
    )
    .unwrap()
});
static LABELLED_BUTTONS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("button[aria-label]").unwrap());

static ITEM_CLASSES: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        r#"[class*="card"]"#,
        r#"[class*="item"]"#,
        r#"[class*="slide"]"#,
        r#"[class*="tile"]"#,
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});

static ITEM_CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img, picture, a[href]").unwrap());
static SIGNAL_HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"h2, h3, h4, h5, h6, [role="heading"]"#).unwrap());
static SIGNAL_ACTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href], button").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static CARD_MEDIA: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"img, picture, svg, [role="img"], [data-src], [data-lazy]"#).unwrap()
});
static CARD_MEDIA_FALLBACK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"img, picture, svg, [role="img"], [data-src]"#).unwrap());
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());

static SPLIT_MEDIA: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"img, video, iframe, [class*="carousel"], [class*="slider"]"#).unwrap()
});

/// Descendant hops allowed between a class-matched item and its container.
const ITEM_DEPTH: usize = 5;
/// Share of items that must look like cards for a card carousel.
const CARD_SHARE: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CarouselKind {
    Image,
    Card,
}

/// Keyword and control-parent candidates, outermost only.
fn candidates<'a>(
    page: &PageContext<'a>,
    keywords: &[&str],
) -> Result<Vec<ElementRef<'a>>, RuleError> {
    let mut raw: Vec<ElementRef<'a>> = Vec::new();

    for keyword in keywords {
        let sel = selector(&format!(
            r#"[class*="{k}"], [id*="{k}"], [data-component*="{k}"]"#,
            k = keyword
        ))?;
        for el in page.select_in_root(&sel) {
            if scope::is_chrome(el) || scope::is_wrapper(el) {
                continue;
            }
            dom::push_unique(&mut raw, el);
        }
    }

    for sel in PAGINATION.iter() {
        for control in page.select_in_root(sel) {
            let Some(container) = dom::parent(control) else {
                continue;
            };
            if scope::is_chrome(container) || scope::is_wrapper(container) {
                continue;
            }
            dom::push_unique(&mut raw, container);
        }
    }

    Ok(dom::keep_outermost(raw))
}

pub(crate) fn has_controls(el: ElementRef<'_>) -> bool {
    if dom::has(el, &CONTROLS) {
        return true;
    }
    el.select(&LABELLED_BUTTONS).any(|button| {
        let label = dom::attr(button, "aria-label")
            .unwrap_or("")
            .to_lowercase();
        label.contains("next") || label.contains("prev")
    })
}

pub(crate) fn is_scrollable(el: ElementRef<'_>) -> bool {
    let style = dom::attr(el, "style").unwrap_or("");
    let class = dom::class_attr(el);
    if style.contains("overflow-x")
        || style.contains("scroll-snap")
        || class.contains("scroll")
        || class.contains("snap")
    {
        return true;
    }

    dom::attr(el, "role") == Some("region")
        && dom::attr(el, "aria-roledescription")
            .is_some_and(|d| d.to_lowercase().contains("carousel"))
}

/// Whether the element sits inside a two-column media/text block.
fn within_media_text_split(el: ElementRef<'_>) -> bool {
    dom::ancestors(el)
        .filter(|a| !scope::is_wrapper(*a))
        .any(|container| {
            let children = scope::content_children(container);
            let [first, second] = children.as_slice() else {
                return false;
            };
            let first_media = dom::has(*first, &SPLIT_MEDIA);
            let second_media = dom::has(*second, &SPLIT_MEDIA);
            (first_media && dom::text_len(*second) >= 100)
                || (second_media && dom::text_len(*first) >= 100)
        })
}

/// Class-matched descendants within [`ITEM_DEPTH`] hops, in selector order.
fn class_items<'a>(
    container: ElementRef<'a>,
    keep: impl Fn(ElementRef<'a>) -> bool,
) -> Vec<Vec<ElementRef<'a>>> {
    ITEM_CLASSES
        .iter()
        .map(|sel| {
            container
                .select(sel)
                .filter(|item| dom::ancestor_within(*item, container, ITEM_DEPTH))
                .filter(|item| keep(*item))
                .collect()
        })
        .collect()
}

fn classify(container: ElementRef<'_>) -> Option<CarouselKind> {
    if !has_controls(container) && !is_scrollable(container) {
        return None;
    }

    let mut items: Vec<ElementRef<'_>> = dom::children(container)
        .into_iter()
        .filter(|child| dom::children(*child).len() != 1)
        .filter(|child| dom::text_len(*child) > 10 || dom::has(*child, &ITEM_CONTENT))
        .collect();

    if items.len() < 2 {
        let mut by_class: Vec<ElementRef<'_>> = Vec::new();
        for group in class_items(container, |_| true) {
            for item in group {
                dom::push_unique(&mut by_class, item);
            }
        }
        if by_class.len() > items.len() {
            items = by_class;
        }
    }

    if items.len() < 2 {
        return None;
    }

    let signals = items.iter().filter(|item| has_card_signal(**item)).count();
    if signals as f64 >= items.len() as f64 * CARD_SHARE {
        Some(CarouselKind::Card)
    } else {
        Some(CarouselKind::Image)
    }
}

fn has_card_signal(item: ElementRef<'_>) -> bool {
    dom::has(item, &SIGNAL_HEADING)
        || item
            .select(&SIGNAL_ACTION)
            .any(|action| dom::text_len(action) > 5)
        || dom::text_len(item) > 40
}

/// Slider-like containers of images with navigation.
pub struct ImageCarouselRule;

impl Rule for ImageCarouselRule {
    fn name(&self) -> &'static str {
        "image_carousel"
    }

    fn detect(&self, page: &PageContext<'_>) -> Result<Vec<Detection>, RuleError> {
        let mut image_counts: Vec<usize> = Vec::new();

        for container in candidates(page, IMAGE_KEYWORDS)? {
            if within_media_text_split(container) {
                continue;
            }
            if classify(container) != Some(CarouselKind::Image) {
                continue;
            }

            let images: Vec<_> = container.select(&IMG).collect();
            if images.len() < 2 || !has_controls(container) {
                continue;
            }

            let sources: HashSet<&str> = images
                .iter()
                .filter_map(|img| {
                    dom::attr(*img, "src")
                        .filter(|s| !s.is_empty())
                        .or_else(|| dom::attr(*img, "data-src"))
                })
                .filter(|s| !s.is_empty())
                .collect();
            if sources.len() < 2 {
                continue;
            }

            image_counts.push(images.len());
        }

        if image_counts.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![Detection::new(
            ComponentKey::ImageCarousel,
            instances(image_counts.len()),
            Confidence::Medium,
            format!(
                "image_carousel: {} (deduped), items=[{}], controls=yes, type=image",
                image_counts.len(),
                join_counts(&image_counts)
            ),
        )])
    }
}

fn card_like_child(item: ElementRef<'_>) -> bool {
    dom::has(item, &LINK) && (dom::has(item, &SIGNAL_HEADING) || dom::has(item, &CARD_MEDIA))
}

fn card_like_class_item(item: ElementRef<'_>) -> bool {
    dom::has(item, &LINK)
        && (dom::has(item, &SIGNAL_HEADING) || dom::has(item, &CARD_MEDIA_FALLBACK))
}

/// Carousels of repeated cards with navigation or a scroll affordance.
pub struct CardCarouselRule;

impl Rule for CardCarouselRule {
    fn name(&self) -> &'static str {
        "card_carousel"
    }

    fn detect(&self, page: &PageContext<'_>) -> Result<Vec<Detection>, RuleError> {
        let mut found: Vec<(usize, bool)> = Vec::new();

        for container in candidates(page, CARD_KEYWORDS)? {
            if within_media_text_split(container) {
                continue;
            }
            if classify(container) != Some(CarouselKind::Card) {
                continue;
            }

            let mut cards = dom::children(container)
                .into_iter()
                .filter(|child| card_like_child(*child))
                .count();

            if cards < 2 {
                for group in class_items(container, card_like_class_item) {
                    cards = cards.max(group.len());
                }
            }
            if cards < 2 {
                continue;
            }

            let controls = has_controls(container);
            if !controls && !is_scrollable(container) {
                continue;
            }

            found.push((cards, controls));
        }

        if found.is_empty() {
            return Ok(Vec::new());
        }

        let counts: Vec<usize> = found.iter().map(|(n, _)| *n).collect();
        let kinds: Vec<&str> = found
            .iter()
            .map(|(_, controls)| if *controls { "controls" } else { "scrollable" })
            .collect();

        Ok(vec![Detection::new(
            ComponentKey::CardCarousel,
            instances(found.len()),
            Confidence::Medium,
            format!(
                "card_carousel: {} (deduped), items=[{}], {}, type=card",
                found.len(),
                join_counts(&counts),
                kinds.join(",")
            ),
        )])
    }
}
