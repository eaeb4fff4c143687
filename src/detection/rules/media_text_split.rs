use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use super::instances;
use crate::detection::{dom, scope, PageContext, Rule, RuleError};
use crate::models::{ComponentKey, Confidence, Detection};

static CONTAINERS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("section, div, article").unwrap());
static CAROUSEL_HINTS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"[class*="carousel"], [class*="slider"], [class*="swiper"], [class*="slick"],
           .swiper-pagination, .slick-dots, [class*="pagination"], [class*="dots"]"#,
    )
    .unwrap()
});
static VIDEO: LazyLock<Selector> = LazyLock::new(|| Selector::parse("video").unwrap());
static IFRAME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("iframe").unwrap());
static IMAGE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img, picture").unwrap());
static MEDIA_WRAPPERS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"[class*="media"], [class*="image"], [class*="picture"], [class*="visual"]"#,
    )
    .unwrap()
});

const VIDEO_HOSTS: &[&str] = &["youtube.com", "youtu.be", "vimeo.com"];
const MIN_TEXT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaType {
    Carousel,
    Video,
    Image,
}

impl MediaType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Carousel => "carousel",
            Self::Video => "video",
            Self::Image => "image",
        }
    }
}

fn media_type(el: ElementRef<'_>) -> Option<MediaType> {
    if dom::has(el, &CAROUSEL_HINTS) {
        return Some(MediaType::Carousel);
    }
    if dom::has(el, &VIDEO) {
        return Some(MediaType::Video);
    }
    let embedded_video = el.select(&IFRAME).any(|frame| {
        let src = dom::attr(frame, "src").unwrap_or("");
        VIDEO_HOSTS.iter().any(|host| src.contains(host))
    });
    if embedded_video {
        return Some(MediaType::Video);
    }
    if dom::has(el, &IMAGE)
        || dom::has_inline_background_image(el)
        || el.select(&MEDIA_WRAPPERS).any(dom::has_inline_background_image)
    {
        return Some(MediaType::Image);
    }
    None
}

/// Two-column blocks pairing media with a text column.
pub struct MediaTextSplitRule;

impl Rule for MediaTextSplitRule {
    fn name(&self) -> &'static str {
        "media_text_split"
    }

    fn detect(&self, page: &PageContext<'_>) -> Result<Vec<Detection>, RuleError> {
        let mut splits: Vec<MediaType> = Vec::new();

        for container in page.select_in_root(&CONTAINERS) {
            if scope::is_chrome(container) || scope::is_wrapper(container) {
                continue;
            }
            let children = scope::content_children(container);
            let [first, second] = children.as_slice() else {
                continue;
            };

            if let Some(kind) = media_type(*first).filter(|_| dom::text_len(*second) >= MIN_TEXT) {
                splits.push(kind);
            } else if let Some(kind) =
                media_type(*second).filter(|_| dom::text_len(*first) >= MIN_TEXT)
            {
                splits.push(kind);
            }
        }

        if splits.is_empty() {
            return Ok(Vec::new());
        }

        let kinds: Vec<&str> = splits.iter().map(|k| k.as_str()).collect();
        Ok(vec![Detection::new(
            ComponentKey::MediaTextSplit,
            instances(splits.len()),
            Confidence::Medium,
            format!(
                "media_text_split: {} blocks, media_types=[{}]",
                splits.len(),
                kinds.join(",")
            ),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::rules::test_support::run;

    const COPY: &str = "Our most advanced crossover yet, with intelligent all-wheel drive, \
                        a quiet cabin and enough space for the whole family.";

    #[test]
    fn image_and_text_columns() {
        let html = format!(
            r#"<main><section><div><img src="/car.jpg"></div><div><p>{COPY}</p></div></section></main>"#
        );
        let found = run(&MediaTextSplitRule, &html);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].evidence, "media_text_split: 1 blocks, media_types=[image]");
    }

    #[test]
    fn video_on_the_right() {
        let html = format!(
            r#"<main><section><div><p>{COPY}</p></div>
               <div><iframe src="https://www.youtube.com/embed/x"></iframe></div></section></main>"#
        );
        let found = run(&MediaTextSplitRule, &html);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].evidence, "media_text_split: 1 blocks, media_types=[video]");
    }

    #[test]
    fn short_copy_is_not_a_split() {
        let html = r#"<main><section><div><img src="/car.jpg"></div><div>Short</div></section></main>"#;
        assert!(run(&MediaTextSplitRule, html).is_empty());
    }
}
