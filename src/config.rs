//! Configuration management using the prefer crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::DEFAULT_BATCH_LIMIT;
use crate::fetch::{BackfillConfig, FetchConfig};
use crate::gate::DEFAULT_REGRESSION_MIN;
use crate::scrapers::{BrowserOptions, HttpClient};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "cutool.db";

/// Default market code.
pub const DEFAULT_MARKET: &str = "UK";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CUTOOL_DATA_DIR";

/// Environment variable overriding the default market.
pub const MARKET_ENV: &str = "CUTOOL_MARKET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config {path}: {reason}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        reason: String,
    },
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory. Holds the database and the page cache.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Market used when a command does not name one.
    pub market: String,
    /// Site base URL per market.
    pub sites: HashMap<String, String>,
    /// User agent override for HTTP requests.
    pub user_agent: Option<String>,
    /// HTTP timeout in seconds.
    pub request_timeout: u64,
    /// Minimum gap between request starts in milliseconds.
    pub request_interval_ms: u64,
    /// Fetch worker count.
    pub concurrency: usize,
    /// URLs per fetch batch.
    pub batch_size: usize,
    /// Retries for transient fetch failures.
    pub max_retries: u32,
    /// Backfill worker count.
    pub backfill_concurrency: usize,
    /// URLs per backfill run.
    pub backfill_batch_size: usize,
    /// URLs per analysis batch.
    pub analysis_batch_size: usize,
    /// Scored labels needed before precision is computed.
    pub regression_min_scored: u64,
    /// Headless browser options.
    pub browser: BrowserOptions,
}

impl Default for Settings {
    fn default() -> Self {
        // ~/Documents/cutool, falling back to the home dir then the current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cutool");

        let fetch = FetchConfig::default();
        let backfill = BackfillConfig::default();

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            market: DEFAULT_MARKET.to_string(),
            sites: HashMap::new(),
            user_agent: None,
            request_timeout: crate::scrapers::DEFAULT_TIMEOUT.as_secs(),
            request_interval_ms: fetch.request_interval.as_millis() as u64,
            concurrency: fetch.concurrency,
            batch_size: fetch.batch_size,
            max_retries: fetch.max_retries,
            backfill_concurrency: backfill.concurrency,
            backfill_batch_size: backfill.batch_size,
            analysis_batch_size: DEFAULT_BATCH_LIMIT,
            regression_min_scored: DEFAULT_REGRESSION_MIN,
            browser: BrowserOptions::default(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Full path to the SQLite database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }

    /// Market from the command line, or the configured default.
    pub fn market_or_default(&self, market: Option<&str>) -> String {
        market
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.market.clone())
    }

    /// Configured base URL for a market.
    pub fn site_for(&self, market: &str) -> Option<&str> {
        self.sites.get(market).map(String::as_str)
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn fetch_config(&self, market: &str) -> FetchConfig {
        FetchConfig {
            market: market.to_string(),
            concurrency: self.concurrency,
            request_interval: self.request_interval(),
            batch_size: self.batch_size,
            max_retries: self.max_retries,
            ..Default::default()
        }
    }

    pub fn backfill_config(&self, market: &str) -> BackfillConfig {
        BackfillConfig {
            market: market.to_string(),
            concurrency: self.backfill_concurrency,
            request_interval: self.request_interval(),
            batch_size: self.backfill_batch_size,
            ..Default::default()
        }
    }

    /// Browser options with the HTTP user agent carried over when none is set.
    pub fn browser_options(&self) -> BrowserOptions {
        let mut options = self.browser.clone();
        if options.user_agent.is_none() {
            options.user_agent = self.user_agent.clone();
        }
        options
    }

    pub fn http_client(&self) -> Result<HttpClient, reqwest::Error> {
        HttpClient::with_user_agent(
            Duration::from_secs(self.request_timeout),
            self.user_agent.as_deref(),
        )
    }
}

/// Browser section of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headless: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chrome_args: Vec<String>,
    /// Render timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "target")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Default market.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,
    /// Site base URL per market, e.g. `{"UK": "https://www.example.co.uk"}`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub sites: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Minimum gap between requests in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backfill_concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backfill_batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regression_min_scored: Option<u64>,
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Discover a `cutool` config file in the standard locations.
    /// Missing or unreadable discovered files yield the defaults.
    pub async fn load() -> Self {
        match prefer::load("cutool").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("Ignoring config file: {}", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// The format follows the extension: TOML, YAML, otherwise JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |format: &'static str, reason: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            reason,
        };

        match ext {
            "toml" => toml::from_str(contents).map_err(|e| parse_error("TOML", e.to_string())),
            "yaml" | "yml" => {
                serde_yaml::from_str(contents).map_err(|e| parse_error("YAML", e.to_string()))
            }
            _ => serde_json::from_str(contents).map_err(|e| parse_error("JSON", e.to_string())),
        }
    }

    /// Directory of the config file, used to resolve relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// `~` is expanded; relative paths are joined onto `base_dir`.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Layer the values present in this config over `settings`.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref market) = self.market {
            settings.market = market.clone();
        }
        for (market, site) in &self.sites {
            settings.sites.insert(market.clone(), site.clone());
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(interval) = self.request_interval_ms {
            settings.request_interval_ms = interval;
        }
        if let Some(concurrency) = self.concurrency {
            settings.concurrency = concurrency.max(1);
        }
        if let Some(batch_size) = self.batch_size {
            settings.batch_size = batch_size.max(1);
        }
        if let Some(retries) = self.max_retries {
            settings.max_retries = retries;
        }
        if let Some(concurrency) = self.backfill_concurrency {
            settings.backfill_concurrency = concurrency.max(1);
        }
        if let Some(batch_size) = self.backfill_batch_size {
            settings.backfill_batch_size = batch_size.max(1);
        }
        if let Some(batch_size) = self.analysis_batch_size {
            settings.analysis_batch_size = batch_size.max(1);
        }
        if let Some(min) = self.regression_min_scored {
            settings.regression_min_scored = min;
        }

        let browser = &self.browser;
        if let Some(headless) = browser.headless {
            settings.browser.headless = headless;
        }
        if let Some(ref chrome_path) = browser.chrome_path {
            settings.browser.chrome_path = Some(self.resolve_path(chrome_path, base_dir));
        }
        if !browser.chrome_args.is_empty() {
            settings.browser.chrome_args = browser.chrome_args.clone();
        }
        if let Some(timeout) = browser.timeout {
            settings.browser.timeout = timeout;
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory (--target flag).
    pub target: Option<PathBuf>,
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Resolve settings: defaults, then the config file, then the environment,
/// then `--target`.
pub async fn load_settings_with_options(
    options: LoadOptions,
) -> Result<(Settings, Config), ConfigError> {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let base_dir = config.base_dir().unwrap_or_else(current_dir);
    config.apply_to_settings(&mut settings, &base_dir);

    if let Some(data_dir) = env_override(DATA_DIR_ENV) {
        tracing::debug!("Using {} from environment: {}", DATA_DIR_ENV, data_dir);
        settings.data_dir = config.resolve_path(&data_dir, &current_dir());
    }
    if let Some(market) = env_override(MARKET_ENV) {
        tracing::debug!("Using {} from environment: {}", MARKET_ENV, market);
        settings.market = market;
    }

    if let Some(target) = options.target {
        settings.data_dir = config.resolve_path(&target.to_string_lossy(), &current_dir());
    }

    Ok((settings, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_job_settings() {
        let settings = Settings::default();
        assert_eq!(settings.market, "UK");
        assert_eq!(settings.concurrency, 2);
        assert_eq!(settings.request_interval_ms, 1000);
        assert_eq!(settings.batch_size, 100);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.request_timeout, 15);
        assert_eq!(settings.backfill_concurrency, 3);
        assert_eq!(settings.backfill_batch_size, 200);
        assert_eq!(settings.regression_min_scored, 10);
        assert_eq!(settings.browser.timeout, 30);
        assert!(settings.data_dir.ends_with("cutool"));
    }

    #[test]
    fn apply_layers_only_present_values() {
        let config = Config {
            data_dir: Some("data".into()),
            market: Some("DE".into()),
            concurrency: Some(4),
            browser: BrowserConfig {
                headless: Some(false),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/srv/audit"));

        assert_eq!(settings.data_dir, PathBuf::from("/srv/audit/data"));
        assert_eq!(settings.market, "DE");
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.batch_size, 100);
        assert!(!settings.browser.headless);
        assert_eq!(settings.fetch_config("DE").concurrency, 4);
    }

    #[test]
    fn absolute_paths_are_kept() {
        let config = Config::default();
        assert_eq!(
            config.resolve_path("/var/lib/cutool", Path::new("/elsewhere")),
            PathBuf::from("/var/lib/cutool")
        );
    }

    #[tokio::test]
    async fn loads_toml_and_yaml_by_extension() {
        let dir = TempDir::new().unwrap();

        let toml_path = dir.path().join("cutool.toml");
        std::fs::write(
            &toml_path,
            "market = \"FR\"\nbatch_size = 50\n[sites]\nFR = \"https://www.example.fr\"\n",
        )
        .unwrap();
        let config = Config::load_from_path(&toml_path).await.unwrap();
        assert_eq!(config.market.as_deref(), Some("FR"));
        assert_eq!(config.batch_size, Some(50));
        assert_eq!(config.base_dir().as_deref(), Some(dir.path()));

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, dir.path());
        assert_eq!(settings.site_for("FR"), Some("https://www.example.fr"));

        let yaml_path = dir.path().join("cutool.yaml");
        std::fs::write(&yaml_path, "target: ./data\nbrowser:\n  timeout: 45\n").unwrap();
        let config = Config::load_from_path(&yaml_path).await.unwrap();
        assert_eq!(config.data_dir.as_deref(), Some("./data"));
        assert_eq!(config.browser.timeout, Some(45));
    }

    #[tokio::test]
    async fn invalid_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cutool.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load_from_path(&path).await,
            Err(ConfigError::Parse { format: "JSON", .. })
        ));
    }

    #[test]
    fn market_argument_wins_over_default() {
        let settings = Settings::default();
        assert_eq!(settings.market_or_default(Some("IE")), "IE");
        assert_eq!(settings.market_or_default(Some("  ")), "UK");
        assert_eq!(settings.market_or_default(None), "UK");
    }
}
