//! Request identity for page fetches.

/// Desktop Chrome identity used for every page request.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Accept header sent with page requests.
pub const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml";

/// Resolve the user agent from an optional config override.
/// An empty override falls back to the browser identity.
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        Some(custom) if !custom.trim().is_empty() => custom.trim().to_string(),
        _ => BROWSER_USER_AGENT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_user_agent_default() {
        let ua = resolve_user_agent(None);
        assert!(ua.contains("Chrome/120.0.0.0"));
        assert_eq!(resolve_user_agent(Some("  ")), BROWSER_USER_AGENT);
    }

    #[test]
    fn test_resolve_user_agent_custom() {
        assert_eq!(resolve_user_agent(Some("AuditBot/1.0")), "AuditBot/1.0");
    }
}
