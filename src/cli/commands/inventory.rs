//! Inventory commands.

use anyhow::Context;
use console::style;

use crate::cli::helpers::{format_number, spinner, Workspace};
use crate::config::Settings;
use crate::discovery::InventoryBuilder;
use crate::models::InventoryStats;
use crate::scrapers::base_url;

/// Discover a market's pages and upsert them into the inventory.
pub async fn cmd_build(
    settings: &Settings,
    market: Option<&str>,
    base: Option<&str>,
) -> anyhow::Result<()> {
    let market = settings.market_or_default(market);
    let Some(base) = base.or_else(|| settings.site_for(&market)) else {
        anyhow::bail!(
            "No base URL for market {}: pass --base or add it under `sites` in the config",
            market
        );
    };
    let base = base_url(base);

    let ws = Workspace::open(settings)?;
    let client = settings.http_client().context("Failed to create HTTP client")?;
    let builder = InventoryBuilder::new(client);

    let pb = spinner(format!("Discovering URLs from {}...", base));
    let result = builder.build(&ws.inventory, &market, &base).await;
    pb.finish_and_clear();
    let result = result?;

    println!(
        "{} Inventory for {} from {}",
        style("✓").green(),
        style(&result.market).bold(),
        result.base_url
    );
    println!("  {:<12} {:>10}", "Discovered:", format_number(result.discovered as u64));
    println!("  {:<12} {:>10}", "Unique:", format_number(result.unique as u64));
    println!("  {:<12} {:>10}", "New:", format_number(result.inserted as u64));
    println!("  {:<12} {:>10}", "Updated:", format_number(result.updated as u64));
    println!();
    print_stats_header();
    print_stats_row(&result.stats);

    Ok(())
}

fn print_stats_header() {
    println!(
        "{:<10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        style("MARKET").cyan().bold(),
        "Total",
        "Pending",
        "Fetched",
        "Failed",
        "Skipped"
    );
}

fn print_stats_row(stats: &InventoryStats) {
    println!(
        "{:<10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        stats.market,
        format_number(stats.total),
        format_number(stats.pending),
        format_number(stats.fetched),
        format_number(stats.failed),
        format_number(stats.skipped)
    );
}

/// Show status counts for one market or all of them.
pub fn cmd_stats(settings: &Settings, market: Option<&str>) -> anyhow::Result<()> {
    let ws = Workspace::open(settings)?;
    let stats = match market {
        Some(market) => vec![ws.inventory.stats(market)?],
        None => ws.inventory.all_stats()?,
    };

    if stats.is_empty() {
        println!("{} Inventory is empty. Run 'cu inventory build' first.", style("!").yellow());
        return Ok(());
    }

    print_stats_header();
    for row in &stats {
        print_stats_row(row);
    }
    Ok(())
}

/// Show how fetched pages were captured.
pub fn cmd_render_stats(settings: &Settings) -> anyhow::Result<()> {
    let ws = Workspace::open(settings)?;
    let stats = ws.inventory.render_stats()?;

    if stats.is_empty() {
        println!("{} No captured pages yet.", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:<10} {:<10} {:>10}",
        style("MARKET").cyan().bold(),
        "Mode",
        "Pages"
    );
    for row in &stats {
        println!(
            "{:<10} {:<10} {:>10}",
            row.market,
            row.render_mode.as_str(),
            format_number(row.count)
        );
    }
    Ok(())
}
