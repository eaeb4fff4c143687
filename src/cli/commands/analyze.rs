//! Analysis commands.

use console::style;

use crate::analysis::{AnalysisBatch, AnalysisRunner, AnalysisStats};
use crate::cli::helpers::{format_number, spinner, Workspace};
use crate::config::Settings;

fn print_stats(stats: &AnalysisStats) {
    println!("  {:<11} {:>8}", "Eligible:", format_number(stats.count as u64));
    println!("  {:<11} {:>8}", "Analyzed:", format_number(stats.analyzed as u64));
    println!("  {:<11} {:>8}", "Failed:", format_number(stats.failed as u64));
    println!("  {:<11} {:>8}", "Detections:", format_number(stats.detections as u64));
}

/// Analyze one batch of eligible pages.
pub fn cmd_run(
    settings: &Settings,
    market: Option<&str>,
    limit: Option<usize>,
    offset: usize,
    reset: bool,
) -> anyhow::Result<()> {
    let market = settings.market_or_default(market);
    let ws = Workspace::open(settings)?;
    let runner = AnalysisRunner::new(&ws.inventory, &ws.detections, &ws.store);

    let batch = AnalysisBatch {
        limit: limit.unwrap_or(settings.analysis_batch_size).max(1),
        offset,
        reset,
        ..AnalysisBatch::new(&market)
    };

    let pb = spinner(format!("Analyzing {} (offset {})...", market, offset));
    let result = runner.run_batch(&batch);
    pb.finish_and_clear();
    let stats = result?;

    println!(
        "{} Analysis batch for {} done",
        style("✓").green(),
        style(&market).bold()
    );
    print_stats(&stats);
    if stats.count == batch.limit {
        println!(
            "  Next: cu analyze run --market {} --offset {}",
            market,
            offset + stats.count
        );
    }
    Ok(())
}

/// Analyze every eligible page in batches.
pub fn cmd_run_all(
    settings: &Settings,
    market: Option<&str>,
    batch_size: Option<usize>,
    start_offset: usize,
    max_batches: Option<usize>,
    reset: bool,
) -> anyhow::Result<()> {
    let market = settings.market_or_default(market);
    let ws = Workspace::open(settings)?;
    let runner = AnalysisRunner::new(&ws.inventory, &ws.detections, &ws.store);
    let batch_size = batch_size.unwrap_or(settings.analysis_batch_size);

    let pb = spinner(format!("Analyzing all cached pages for {}...", market));
    let result = runner.run_all(&market, batch_size, start_offset, max_batches, reset);
    pb.finish_and_clear();
    let outcome = result?;

    println!(
        "{} {} batches analyzed for {}",
        style("✓").green(),
        outcome.batches,
        style(&market).bold()
    );
    print_stats(&outcome.stats);
    println!("  {:<11} {:>8}", "Next offset:", outcome.next_offset);
    Ok(())
}

/// Show component usage for a market.
pub fn cmd_summary(settings: &Settings, market: Option<&str>, json: bool) -> anyhow::Result<()> {
    let market = settings.market_or_default(market);
    let ws = Workspace::open(settings)?;
    let runner = AnalysisRunner::new(&ws.inventory, &ws.detections, &ws.store);
    let summary = runner.summary(&market)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if summary.components.is_empty() {
        println!(
            "{} No detections for {}. Run 'cu analyze run' first.",
            style("!").yellow(),
            market
        );
        return Ok(());
    }

    println!(
        "{} ({} analyzed pages)",
        style(format!("COMPONENTS: {}", market)).cyan().bold(),
        format_number(summary.analyzed_urls as u64)
    );
    println!("  {:<20} {:>8} {:>10}", "Component", "Pages", "Instances");
    for row in &summary.components {
        println!(
            "  {:<20} {:>8} {:>10}",
            row.component_key,
            format_number(row.pages_with_component),
            format_number(row.total_instances)
        );
    }
    Ok(())
}
