//! HTTP response wrapper.

use std::collections::HashMap;

use reqwest::{Response, StatusCode};

/// HTTP response wrapper.
pub struct HttpResponse {
    pub status: StatusCode,
    /// URL after redirects were followed.
    pub final_url: String,
    pub headers: HashMap<String, String>,
    pub(crate) response: Response,
}

impl HttpResponse {
    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Whether the status is worth retrying (rate limited or server error).
    pub fn is_transient(&self) -> bool {
        is_transient_status(self.status.as_u16())
    }

    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    /// Get the Retry-After header in seconds, if numeric.
    pub fn retry_after(&self) -> Option<u64> {
        self.headers
            .get("retry-after")
            .and_then(|s| s.trim().parse().ok())
    }

    /// Get response body as text.
    pub async fn text(self) -> Result<String, reqwest::Error> {
        self.response.text().await
    }
}

/// 429 and 5xx responses are treated as transient.
pub fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
