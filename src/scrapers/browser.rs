//! Headless browser rendering over CDP.
//!
//! A [`BrowserSession`] is launched lazily on the first render and closed
//! explicitly by its owner, so one Chrome process serves one fetch batch.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
#[cfg(feature = "browser")]
use tokio::sync::Mutex;
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig as CdpConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;

/// Errors raised while rendering a page.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Browser unavailable: {0}")]
    Unavailable(String),

    #[error("Render timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Render failed: {0}")]
    Page(String),
}

/// Run `work` under a deadline, then run `cleanup` whatever the outcome.
#[cfg_attr(not(feature = "browser"), allow(dead_code))]
async fn with_deadline<T, W, C, F>(limit: Duration, work: W, cleanup: C) -> Result<T, RenderError>
where
    W: Future<Output = Result<T, RenderError>>,
    C: FnOnce() -> F,
    F: Future<Output = ()>,
{
    let result = match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => Err(RenderError::Timeout(limit)),
    };
    cleanup().await;
    result
}

/// Browser launch options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserOptions {
    /// Run in headless mode (default: true).
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Explicit Chrome executable; otherwise common locations are searched.
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Navigation plus settle timeout in seconds.
    #[serde(default = "default_render_timeout")]
    pub timeout: u64,

    /// User agent presented by rendered pages.
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_headless() -> bool {
    true
}

fn default_render_timeout() -> u64 {
    30
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            chrome_path: None,
            chrome_args: Vec::new(),
            timeout: default_render_timeout(),
            user_agent: None,
        }
    }
}

/// Markup captured after scripts ran.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub url: String,
    pub status: u16,
    pub html: String,
}

/// Waits for the load event, then for the network to go quiet.
#[cfg(feature = "browser")]
const WAIT_FOR_IDLE_SCRIPT: &str = r#"
    new Promise((resolve) => {
        const settle = () => {
            let last = performance.getEntriesByType('resource').length;
            let quiet = 0;
            const tick = setInterval(() => {
                const now = performance.getEntriesByType('resource').length;
                quiet = now === last ? quiet + 1 : 0;
                last = now;
                if (quiet >= 2) {
                    clearInterval(tick);
                    resolve('idle');
                }
            }, 250);
        };
        if (document.readyState === 'complete') {
            settle();
        } else {
            window.addEventListener('load', settle);
        }
    })
"#;

/// Reads the HTTP status of the main document from navigation timing.
#[cfg(feature = "browser")]
const NAVIGATION_STATUS_SCRIPT: &str = r#"
    (() => {
        const nav = performance.getEntriesByType('navigation')[0];
        return nav && nav.responseStatus ? nav.responseStatus : 0;
    })()
"#;

/// Lazily launched Chrome shared by the workers of one batch.
#[cfg(feature = "browser")]
pub struct BrowserSession {
    options: BrowserOptions,
    browser: Mutex<Option<Browser>>,
}

#[cfg(feature = "browser")]
impl BrowserSession {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        // Common install locations
        "/opt/google/chrome/google-chrome",
    ];

    pub fn new(options: BrowserOptions) -> Self {
        Self {
            options,
            browser: Mutex::new(None),
        }
    }

    /// Whether Chrome is currently running for this session.
    pub async fn is_active(&self) -> bool {
        self.browser.lock().await.is_some()
    }

    fn find_chrome(&self) -> Result<PathBuf, RenderError> {
        if let Some(path) = &self.options.chrome_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(RenderError::Unavailable(format!(
                "configured Chrome path does not exist: {}",
                path.display()
            )));
        }

        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("Found Chrome in PATH: {}", path);
                        return Ok(PathBuf::from(path));
                    }
                }
            }
        }

        Err(RenderError::Unavailable(
            "Chrome/Chromium not found; install it or set browser.chrome_path".to_string(),
        ))
    }

    async fn launch(&self) -> Result<Browser, RenderError> {
        info!("Launching browser (headless={})", self.options.headless);

        let chrome_path = self.find_chrome()?;
        let mut builder = CdpConfig::builder().chrome_executable(chrome_path);

        if !self.options.headless {
            builder = builder.with_head();
        }

        builder = builder
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        for arg in &self.options.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| RenderError::Unavailable(format!("invalid browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::Unavailable(format!("failed to launch browser: {}", e)))?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    /// Render a URL, launching Chrome on first use. The tab is closed
    /// whether the render succeeds, fails or times out.
    pub async fn render(&self, url: &str) -> Result<RenderedPage, RenderError> {
        let timeout = Duration::from_secs(self.options.timeout);
        let page = match tokio::time::timeout(timeout, self.open_page()).await {
            Ok(page) => page?,
            Err(_) => return Err(RenderError::Timeout(timeout)),
        };

        let tab = page.clone();
        with_deadline(timeout, self.capture(&page, url), move || async move {
            let _ = tab.close().await;
        })
        .await
    }

    async fn open_page(&self) -> Result<Page, RenderError> {
        let mut guard = self.browser.lock().await;
        if guard.is_none() {
            *guard = Some(self.launch().await?);
        }
        let browser = guard
            .as_ref()
            .ok_or_else(|| RenderError::Unavailable("browser not running".to_string()))?;
        browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::Page(e.to_string()))
    }

    async fn capture(&self, page: &Page, url: &str) -> Result<RenderedPage, RenderError> {
        let user_agent = crate::scrapers::resolve_user_agent(self.options.user_agent.as_deref());
        page.execute(SetUserAgentOverrideParams::new(user_agent))
            .await
            .map_err(|e| RenderError::Page(e.to_string()))?;

        debug!("Rendering {}", url);
        let nav = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| RenderError::Page(format!("invalid URL: {}", e)))?;
        page.execute(nav)
            .await
            .map_err(|e| RenderError::Page(e.to_string()))?;

        if let Err(e) = page.evaluate(WAIT_FOR_IDLE_SCRIPT.to_string()).await {
            warn!("Could not wait for network idle on {}: {}", url, e);
        }

        let status = match page.evaluate(NAVIGATION_STATUS_SCRIPT.to_string()).await {
            Ok(value) => value.into_value::<u16>().unwrap_or(0),
            Err(_) => 0,
        };

        let html = page
            .content()
            .await
            .map_err(|e| RenderError::Page(e.to_string()))?;

        Ok(RenderedPage {
            url: url.to_string(),
            status: if status == 0 { 200 } else { status },
            html,
        })
    }

    /// Close Chrome if it was launched. The session can be reused afterwards
    /// and will relaunch on the next render.
    pub async fn close(&self) {
        let mut guard = self.browser.lock().await;
        if let Some(mut browser) = guard.take() {
            info!("Closing browser");
            if let Err(e) = browser.close().await {
                debug!("Browser close returned error: {}", e);
            }
        }
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct BrowserSession {
    #[allow(dead_code)]
    options: BrowserOptions,
}

#[cfg(not(feature = "browser"))]
impl BrowserSession {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }

    pub async fn is_active(&self) -> bool {
        false
    }

    pub async fn render(&self, _url: &str) -> Result<RenderedPage, RenderError> {
        Err(RenderError::Unavailable(
            "browser support not compiled; rebuild with --features browser".to_string(),
        ))
    }

    pub async fn close(&self) {}
}
