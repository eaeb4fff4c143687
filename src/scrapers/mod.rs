//! Network access for page capture: plain HTTP, headless rendering and the
//! shared request limiter.

pub mod browser;
mod http_client;
pub mod rate_limiter;

pub use browser::{BrowserOptions, BrowserSession, RenderError, RenderedPage};
pub use http_client::{
    is_transient_status, resolve_user_agent, HttpClient, HttpResponse, BROWSER_USER_AGENT,
    DEFAULT_TIMEOUT, HTML_ACCEPT,
};
pub use rate_limiter::IntervalLimiter;

use url::Url;

/// Extract the host from a URL.
pub fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_string()))
}

/// Turn a bare domain or URL into an origin-style base URL without a
/// trailing slash.
pub fn base_url(target: &str) -> String {
    let target = target.trim().trim_end_matches('/');
    if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("https://{}", target)
    }
}
