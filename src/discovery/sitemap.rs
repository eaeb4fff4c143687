//! Sitemap and robots.txt parsing.
//!
//! Sitemaps use XML namespaces and are often sloppy, so extraction is done
//! with small regexes over the raw text rather than a DOM.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::models::DiscoveredUrl;

static SITEMAPINDEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<sitemapindex[\s>]").unwrap());
static URLSET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<urlset[\s>]").unwrap());
static SITEMAP_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<sitemap>.*?</sitemap>").unwrap());
static URL_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<url>.*?</url>").unwrap());
static LOC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<loc>([^<]+)</loc>").unwrap());
static LASTMOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<lastmod>([^<]+)</lastmod>").unwrap());
static ROBOTS_SITEMAP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^sitemap:\s*").unwrap());

/// An entry of a URL set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<String>,
}

/// What a fetched sitemap document turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// Child sitemap URLs in document order.
    Index(Vec<String>),
    /// Page entries in document order.
    UrlSet(Vec<SitemapEntry>),
    /// Neither shape; ignored.
    Unknown,
}

/// Collect `Sitemap:` directives from robots.txt, first occurrence wins.
pub fn parse_robots(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.lines()
        .map(str::trim)
        .filter(|line| ROBOTS_SITEMAP_RE.is_match(line))
        .map(|line| ROBOTS_SITEMAP_RE.replace(line, "").trim().to_string())
        .filter(|url| !url.is_empty())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Classify a sitemap document and extract its entries.
pub fn parse_sitemap(xml: &str) -> SitemapDocument {
    if SITEMAPINDEX_RE.is_match(xml) {
        let children = SITEMAP_BLOCK_RE
            .find_iter(xml)
            .filter_map(|block| first_capture(&LOC_RE, block.as_str()))
            .collect();
        return SitemapDocument::Index(children);
    }

    if URLSET_RE.is_match(xml) {
        let entries = URL_BLOCK_RE
            .find_iter(xml)
            .filter_map(|block| {
                let loc = first_capture(&LOC_RE, block.as_str())?;
                Some(SitemapEntry {
                    loc,
                    lastmod: first_capture(&LASTMOD_RE, block.as_str()),
                })
            })
            .collect();
        return SitemapDocument::UrlSet(entries);
    }

    SitemapDocument::Unknown
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| unescape_xml(m.as_str().trim()))
        .filter(|s| !s.is_empty())
}

/// Unescape the five predefined XML entities.
pub fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Canonical inventory form of a URL: lowercased, one trailing slash removed.
pub fn normalize_url(url: &str) -> String {
    let lower = url.to_lowercase();
    match lower.strip_suffix('/') {
        Some(stripped) => stripped.to_string(),
        None => lower,
    }
}

/// Collapse discovered URLs by normalized form.
///
/// First-seen order and `discovered_from` are kept; the most recent lastmod
/// (string order) wins and a missing lastmod never replaces a known one.
pub fn deduplicate_urls(urls: Vec<DiscoveredUrl>) -> Vec<DiscoveredUrl> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<DiscoveredUrl> = Vec::new();

    for item in urls {
        let normalized = normalize_url(&item.url);
        match index.get(&normalized) {
            Some(&i) => {
                let existing = &mut out[i];
                if let Some(new) = item.lastmod {
                    let newer = match &existing.lastmod {
                        Some(old) => &new > old,
                        None => true,
                    };
                    if newer {
                        existing.lastmod = Some(new);
                    }
                }
            }
            None => {
                index.insert(normalized.clone(), out.len());
                out.push(DiscoveredUrl {
                    url: normalized,
                    discovered_from: item.discovered_from,
                    lastmod: item.lastmod,
                });
            }
        }
    }

    out
}
