//! Content fingerprinting for duplicate detection.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use sha2::{Digest, Sha256};

static CANONICAL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"link[rel="canonical"]"#).unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

/// Characters of normalized body text that feed the hash.
pub const HASH_TEXT_LIMIT: usize = 10_000;

/// Canonical link and content hash of a captured page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFingerprint {
    pub canonical_url: Option<String>,
    pub content_hash: String,
}

impl ContentFingerprint {
    pub fn of(html: &str) -> Self {
        let doc = Html::parse_document(html);

        let canonical_url = doc
            .select(&CANONICAL)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(str::to_string)
            .filter(|href| !href.is_empty());

        let content_hash = match doc.select(&BODY).next() {
            Some(body) => hash_text(&body.text().collect::<String>()),
            None => sha256_hex(html.as_bytes()),
        };

        Self {
            canonical_url,
            content_hash,
        }
    }
}

/// Normalize body text and hash it: whitespace runs collapsed, lowercased,
/// truncated to [`HASH_TEXT_LIMIT`] characters.
pub fn hash_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let normalized: String = collapsed.to_lowercase().chars().take(HASH_TEXT_LIMIT).collect();
    sha256_hex(normalized.as_bytes())
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_and_case_do_not_change_hash() {
        let a = ContentFingerprint::of("<html><body><h1>Hello   World</h1>\n<p>Nissan</p></body></html>");
        let b = ContentFingerprint::of("<html><body>\n  <div><h1>hello world</h1> <p>NISSAN</p></div></body></html>");
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn different_text_changes_hash() {
        let a = ContentFingerprint::of("<body><p>Juke</p></body>");
        let b = ContentFingerprint::of("<body><p>Micra</p></body>");
        assert_ne!(a.content_hash, b.content_hash);
        assert_eq!(a.content_hash.len(), 64);
    }

    #[test]
    fn text_beyond_limit_is_ignored() {
        let base = "x".repeat(HASH_TEXT_LIMIT);
        let a = hash_text(&format!("{}AAAA", base));
        let b = hash_text(&format!("{}BBBB", base));
        assert_eq!(a, b);
    }

    #[test]
    fn extracts_canonical_url() {
        let fp = ContentFingerprint::of(
            r#"<html><head><link rel="canonical" href="https://example.com/a"></head><body>x</body></html>"#,
        );
        assert_eq!(fp.canonical_url.as_deref(), Some("https://example.com/a"));
        assert_eq!(ContentFingerprint::of("<body>x</body>").canonical_url, None);
    }
}
