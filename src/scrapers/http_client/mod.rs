//! HTTP client for sitemap and page fetches.

mod response;
mod user_agent;

pub use response::{is_transient_status, HttpResponse};
pub use user_agent::{resolve_user_agent, BROWSER_USER_AGENT, HTML_ACCEPT};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::header::ACCEPT;
use reqwest::{redirect, Client};
use tracing::debug;

use super::rate_limiter::IntervalLimiter;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP client with a browser-like identity and an optional shared limiter.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    limiter: Option<IntervalLimiter>,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::with_user_agent(timeout, None)
    }

    /// Create a new HTTP client with a custom user agent.
    pub fn with_user_agent(
        timeout: Duration,
        user_agent_config: Option<&str>,
    ) -> Result<Self, reqwest::Error> {
        let user_agent = resolve_user_agent(user_agent_config);
        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .redirect(redirect::Policy::limited(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            limiter: None,
        })
    }

    /// Share an interval limiter with other clients or workers.
    pub fn with_limiter(mut self, limiter: IntervalLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn limiter(&self) -> Option<&IntervalLimiter> {
        self.limiter.as_ref()
    }

    /// Make a GET request, waiting on the shared limiter first.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .header(ACCEPT, HTML_ACCEPT)
            .send()
            .await?;

        debug!(
            "GET {} -> {} in {:?}",
            url,
            response.status(),
            start.elapsed()
        );

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), v.to_string());
            }
        }

        Ok(HttpResponse {
            status: response.status(),
            final_url: response.url().to_string(),
            headers,
            response,
        })
    }

    /// Get a successful response body as text. Non-2xx statuses are errors.
    pub async fn get_text(&self, url: &str) -> Result<String, reqwest::Error> {
        let response = self.get(url).await?;
        response.response.error_for_status()?.text().await
    }
}
