//! Shared helper functions for CLI commands.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Settings;
use crate::repository::{DetectionRepository, InventoryRepository};
use crate::storage::ContentStore;

/// Repositories and the page cache for one data directory.
pub struct Workspace {
    pub inventory: InventoryRepository,
    pub detections: DetectionRepository,
    pub store: ContentStore,
}

impl Workspace {
    /// Open (and create if needed) the database and cache under the data dir.
    pub fn open(settings: &Settings) -> anyhow::Result<Self> {
        settings.ensure_directories().with_context(|| {
            format!(
                "Failed to create data directory {}",
                settings.data_dir.display()
            )
        })?;
        let db_path = settings.database_path();
        let inventory = InventoryRepository::new(&db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        let detections = DetectionRepository::new(&db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        Ok(Self {
            inventory,
            detections,
            store: ContentStore::new(&settings.data_dir),
        })
    }
}

/// Spinner for long-running steps.
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Format a number with thousands separators.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();
    let chunks: Vec<_> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();
    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Format a precision as a percentage, `-` when absent.
pub fn format_precision(precision: Option<f64>) -> String {
    precision
        .map(|p| format!("{:.1}%", p * 100.0))
        .unwrap_or_else(|| "-".to_string())
}

/// Default location for generated reports.
pub fn artifacts_dir(settings: &Settings, name: &str) -> PathBuf {
    settings.data_dir.join("artifacts").join(name)
}
