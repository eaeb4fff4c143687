//! Export commands.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Context;
use console::style;

use crate::cli::helpers::{artifacts_dir, format_number, Workspace};
use crate::config::Settings;
use crate::export::{parse_url_list, DetectionsExporter};

/// Export stored detections for listed URLs or a whole market.
pub fn cmd_detections(
    settings: &Settings,
    market: Option<&str>,
    url_files: &[PathBuf],
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let market = settings.market_or_default(market);
    let ws = Workspace::open(settings)?;
    let exporter = DetectionsExporter::new(&ws.inventory, &ws.detections);

    let export = if url_files.is_empty() {
        exporter.export_market(&market)?
    } else {
        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        for file in url_files {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read URL list {}", file.display()))?;
            let listed = parse_url_list(&text);
            println!(
                "  Loaded {} URLs from {}",
                format_number(listed.len() as u64),
                file.display()
            );
            urls.extend(listed.into_iter().filter(|u| seen.insert(u.clone())));
        }
        exporter.export_urls(&market, &urls)?
    };

    let output = output.unwrap_or_else(|| artifacts_dir(settings, "export").join("detections.json"));
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&export)?;
    std::fs::write(&output, json)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let summary = &export.summary;
    println!(
        "{} Exported detections for {} to {}",
        style("✓").green(),
        style(&market).bold(),
        output.display()
    );
    println!(
        "  {:<18} {:>8}",
        "URLs requested:",
        format_number(summary.total_urls_requested as u64)
    );
    println!(
        "  {:<18} {:>8}",
        "In inventory:",
        format_number(summary.total_urls_found_in_inventory as u64)
    );
    println!(
        "  {:<18} {:>8}",
        "With detections:",
        format_number(summary.total_urls_with_detections as u64)
    );
    println!(
        "  {:<18} {:>8}",
        "Detection rows:",
        format_number(summary.total_detection_rows as u64)
    );
    Ok(())
}
