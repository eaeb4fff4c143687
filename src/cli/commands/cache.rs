//! Page cache commands.

use std::sync::Arc;

use anyhow::Context;
use console::style;

use crate::cli::helpers::{format_number, spinner, Workspace};
use crate::config::Settings;
use crate::fetch::{CacheBackfill, LivePageSource};
use crate::scrapers::BrowserSession;

/// Fetch and cache markup for fetched pages without a cache entry.
pub async fn cmd_backfill(
    settings: &Settings,
    market: Option<&str>,
    limit: Option<usize>,
    include_duplicates: bool,
) -> anyhow::Result<()> {
    let market = settings.market_or_default(market);
    let ws = Workspace::open(settings)?;

    let mut config = settings.backfill_config(&market);
    config.unique_only = !include_duplicates;

    let http = settings.http_client().context("Failed to create HTTP client")?;
    let source = LivePageSource::new(http, BrowserSession::new(settings.browser_options()));
    let backfill = CacheBackfill::new(
        config,
        Arc::new(ws.inventory),
        Arc::new(ws.store),
        Arc::new(source),
    );

    let pb = spinner(format!("Caching HTML for {}...", market));
    let result = backfill.run(limit).await;
    pb.finish_and_clear();
    let stats = result?;

    if stats.processed == 0 {
        println!("{} No URLs need caching for {}", style("!").yellow(), market);
        return Ok(());
    }

    println!(
        "{} Cached {} of {} pages ({} failed)",
        style("✓").green(),
        format_number(stats.cached as u64),
        format_number(stats.processed as u64),
        format_number(stats.failed as u64)
    );
    Ok(())
}

/// Show cache coverage for a market's unique fetched pages.
pub fn cmd_status(settings: &Settings, market: Option<&str>) -> anyhow::Result<()> {
    let market = settings.market_or_default(market);
    let ws = Workspace::open(settings)?;
    let status = ws.inventory.cache_status(&market)?;

    let percent = if status.total_fetched_unique > 0 {
        status.cached as f64 / status.total_fetched_unique as f64 * 100.0
    } else {
        0.0
    };

    println!("{}", style(format!("HTML CACHE: {}", market)).cyan().bold());
    println!(
        "  {:<16} {:>10}",
        "Unique fetched:",
        format_number(status.total_fetched_unique)
    );
    println!("  {:<16} {:>10}", "Cached:", format_number(status.cached));
    println!("  {:<16} {:>10}", "Remaining:", format_number(status.remaining));
    println!("  {:<16} {:>9.1}%", "Coverage:", percent);
    Ok(())
}
