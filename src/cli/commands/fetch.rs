//! Fetch commands.

use std::sync::Arc;

use anyhow::Context;
use console::style;
use tokio::sync::mpsc;

use crate::cli::helpers::{format_number, spinner, Workspace};
use crate::config::Settings;
use crate::fetch::{BatchStats, FetchEvent, FetchOrchestrator, LivePageSource};
use crate::models::UrlStatus;
use crate::scrapers::BrowserSession;

/// Fetch pending URLs for a market.
pub async fn cmd_run(
    settings: &Settings,
    market: Option<&str>,
    batch_size: Option<usize>,
    concurrency: Option<usize>,
    all: bool,
    retry_failed: bool,
) -> anyhow::Result<()> {
    let market = settings.market_or_default(market);
    let ws = Workspace::open(settings)?;

    if retry_failed {
        let requeued = ws.inventory.requeue_failed(&market)?;
        println!(
            "{} Moved {} failed URLs back to pending",
            style("→").cyan(),
            format_number(requeued as u64)
        );
    }

    let pending = ws.inventory.stats(&market)?.pending;
    if pending == 0 {
        println!("{} No pending URLs for {}", style("!").yellow(), market);
        return Ok(());
    }

    let mut config = settings.fetch_config(&market);
    if let Some(size) = batch_size {
        config.batch_size = size.max(1);
    }
    if let Some(workers) = concurrency {
        config.concurrency = workers.max(1);
    }

    let http = settings.http_client().context("Failed to create HTTP client")?;
    let source = LivePageSource::new(http, BrowserSession::new(settings.browser_options()));

    let (tx, mut rx) = mpsc::channel(256);
    let orchestrator = FetchOrchestrator::new(
        config,
        Arc::new(ws.inventory),
        Arc::new(ws.store),
        Arc::new(source),
    )
    .with_events(tx);

    let pb = spinner(format!("Fetching {} ({} pending)...", market, format_number(pending)));
    let progress = {
        let pb = pb.clone();
        tokio::spawn(async move {
            let mut done = 0u64;
            let mut failed = 0u64;
            while let Some(event) = rx.recv().await {
                match event {
                    FetchEvent::Started { url, .. } => {
                        pb.set_message(format!("[{} done, {} failed] {}", done, failed, url));
                    }
                    FetchEvent::Finished { status, .. } => {
                        done += 1;
                        if status == UrlStatus::Failed {
                            failed += 1;
                        }
                    }
                }
            }
        })
    };

    let result = if all {
        orchestrator.run_until_complete().await
    } else {
        orchestrator.run_batch().await.map(|outcome| outcome.stats)
    };

    drop(orchestrator);
    let _ = progress.await;
    pb.finish_and_clear();

    let stats = result?;
    print_batch_stats(&market, &stats);
    Ok(())
}

fn print_batch_stats(market: &str, stats: &BatchStats) {
    println!(
        "{} Fetched {} URLs for {}",
        style("✓").green(),
        format_number(stats.processed as u64),
        market
    );
    println!("  {:<10} {:>8}", "Fetched:", format_number(stats.fetched as u64));
    println!("  {:<10} {:>8}", "Skipped:", format_number(stats.skipped as u64));
    println!("  {:<10} {:>8}", "Failed:", format_number(stats.failed as u64));
    println!(
        "  {:<10} {:>8} static, {} rendered",
        "Mode:",
        format_number(stats.static_pages as u64),
        format_number(stats.rendered as u64)
    );
}

/// Show fetch progress for a market.
pub fn cmd_status(settings: &Settings, market: Option<&str>) -> anyhow::Result<()> {
    let market = settings.market_or_default(market);
    let ws = Workspace::open(settings)?;
    let stats = ws.inventory.stats(&market)?;

    let done = stats.fetched + stats.failed + stats.skipped;
    let percent = if stats.total > 0 {
        done as f64 / stats.total as f64 * 100.0
    } else {
        0.0
    };

    println!("{}", style(format!("FETCH STATUS: {}", market)).cyan().bold());
    println!("  {:<10} {:>10}", "Total:", format_number(stats.total));
    println!("  {:<10} {:>10}", "Pending:", format_number(stats.pending));
    println!("  {:<10} {:>10}", "Fetched:", format_number(stats.fetched));
    println!("  {:<10} {:>10}", "Skipped:", format_number(stats.skipped));
    println!("  {:<10} {:>10}", "Failed:", format_number(stats.failed));
    println!("  {:<10} {:>9.1}%", "Progress:", percent);
    Ok(())
}
