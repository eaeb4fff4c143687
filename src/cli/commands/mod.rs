//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod analyze;
mod cache;
mod export;
mod fetch;
mod gate;
mod inventory;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "cu")]
#[command(about = "Component usage audit: inventory, capture, detection and precision gates")]
#[command(version)]
pub struct Cli {
    /// Data directory holding the database and page cache (overrides config file)
    #[arg(long, short = 't', global = true)]
    target: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Build and inspect the URL inventory
    Inventory {
        #[command(subcommand)]
        command: InventoryCommands,
    },

    /// Capture pending pages
    Fetch {
        #[command(subcommand)]
        command: FetchCommands,
    },

    /// Manage the compressed page cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Run component detection over cached pages
    Analyze {
        #[command(subcommand)]
        command: AnalyzeCommands,
    },

    /// Precision regression and quality gates over human labels
    Gate {
        #[command(subcommand)]
        command: GateCommands,
    },

    /// Export stored results
    Export {
        #[command(subcommand)]
        command: ExportCommands,
    },
}

#[derive(Subcommand)]
enum InventoryCommands {
    /// Discover page URLs from robots.txt and sitemaps
    Build {
        /// Market code (default from config)
        #[arg(short, long)]
        market: Option<String>,
        /// Site base URL (default: the market's configured site)
        #[arg(short, long)]
        base: Option<String>,
    },

    /// Show status counts per market
    Stats {
        /// Only this market
        #[arg(short, long)]
        market: Option<String>,
    },

    /// Show static vs rendered capture counts
    RenderStats,
}

#[derive(Subcommand)]
enum FetchCommands {
    /// Fetch pending URLs
    Run {
        #[arg(short, long)]
        market: Option<String>,
        /// URLs per batch
        #[arg(short, long)]
        batch_size: Option<usize>,
        /// Concurrent workers
        #[arg(short = 'w', long)]
        concurrency: Option<usize>,
        /// Keep running batches until nothing is pending
        #[arg(long)]
        all: bool,
        /// Move failed URLs back to pending first
        #[arg(long)]
        retry_failed: bool,
    },

    /// Show fetch progress for a market
    Status {
        #[arg(short, long)]
        market: Option<String>,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Cache markup for fetched pages that have none
    Backfill {
        #[arg(short, long)]
        market: Option<String>,
        /// Maximum URLs to cache (default: backfill batch size)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Include pages marked as duplicates
        #[arg(long)]
        include_duplicates: bool,
    },

    /// Show cache coverage
    Status {
        #[arg(short, long)]
        market: Option<String>,
    },
}

#[derive(Subcommand)]
enum AnalyzeCommands {
    /// Analyze one batch of cached pages
    Run {
        #[arg(short, long)]
        market: Option<String>,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(short, long, default_value = "0")]
        offset: usize,
        /// Delete the market's existing detections first
        #[arg(long)]
        reset: bool,
    },

    /// Analyze every eligible page batch by batch
    RunAll {
        #[arg(short, long)]
        market: Option<String>,
        #[arg(short, long)]
        batch_size: Option<usize>,
        #[arg(long, default_value = "0")]
        start_offset: usize,
        /// Stop after this many batches
        #[arg(long)]
        max_batches: Option<usize>,
        #[arg(long)]
        reset: bool,
    },

    /// Component usage per market
    Summary {
        #[arg(short, long)]
        market: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum GateCommands {
    /// Compute per-component precision from a labels JSONL file
    Regression {
        /// Labels file (JSONL)
        labels: PathBuf,
        /// Output directory (default: <data>/artifacts/regression)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
        /// Scored labels needed before precision is computed
        #[arg(long)]
        min_scored: Option<u64>,
    },

    /// Evaluate quality gates against a regression report
    Report {
        /// Gate configuration (JSON)
        #[arg(short, long)]
        gates: PathBuf,
        /// Regression report (default: <data>/artifacts/regression/regression-report.json)
        #[arg(short, long)]
        regression: Option<PathBuf>,
        /// Output directory (default: <data>/artifacts/gates)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },

    /// Check a gate report and exit 0 (pass), 1 (fail) or 2 (insufficient sample)
    Validate {
        /// Gate report (default: <data>/artifacts/gates/gate-report.json)
        report: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ExportCommands {
    /// Export stored detections as JSON
    Detections {
        #[arg(short, long)]
        market: Option<String>,
        /// URL list files (one URL per line, `#` comments); all analyzed URLs when omitted
        #[arg(short, long = "urls")]
        urls: Vec<PathBuf>,
        /// Output file (default: <data>/artifacts/export/detections.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        target: cli.target,
    };
    let (settings, _config) = load_settings_with_options(options).await?;

    match cli.command {
        Commands::Inventory { command } => match command {
            InventoryCommands::Build { market, base } => {
                inventory::cmd_build(&settings, market.as_deref(), base.as_deref()).await
            }
            InventoryCommands::Stats { market } => {
                inventory::cmd_stats(&settings, market.as_deref())
            }
            InventoryCommands::RenderStats => inventory::cmd_render_stats(&settings),
        },
        Commands::Fetch { command } => match command {
            FetchCommands::Run {
                market,
                batch_size,
                concurrency,
                all,
                retry_failed,
            } => {
                fetch::cmd_run(
                    &settings,
                    market.as_deref(),
                    batch_size,
                    concurrency,
                    all,
                    retry_failed,
                )
                .await
            }
            FetchCommands::Status { market } => fetch::cmd_status(&settings, market.as_deref()),
        },
        Commands::Cache { command } => match command {
            CacheCommands::Backfill {
                market,
                limit,
                include_duplicates,
            } => {
                cache::cmd_backfill(&settings, market.as_deref(), limit, include_duplicates).await
            }
            CacheCommands::Status { market } => cache::cmd_status(&settings, market.as_deref()),
        },
        Commands::Analyze { command } => match command {
            AnalyzeCommands::Run {
                market,
                limit,
                offset,
                reset,
            } => analyze::cmd_run(&settings, market.as_deref(), limit, offset, reset),
            AnalyzeCommands::RunAll {
                market,
                batch_size,
                start_offset,
                max_batches,
                reset,
            } => analyze::cmd_run_all(
                &settings,
                market.as_deref(),
                batch_size,
                start_offset,
                max_batches,
                reset,
            ),
            AnalyzeCommands::Summary { market, json } => {
                analyze::cmd_summary(&settings, market.as_deref(), json)
            }
        },
        Commands::Gate { command } => match command {
            GateCommands::Regression {
                labels,
                out_dir,
                min_scored,
            } => gate::cmd_regression(&settings, &labels, out_dir, min_scored),
            GateCommands::Report {
                gates,
                regression,
                out_dir,
            } => gate::cmd_report(&settings, &gates, regression, out_dir),
            GateCommands::Validate { report } => gate::cmd_validate(&settings, report),
        },
        Commands::Export { command } => match command {
            ExportCommands::Detections {
                market,
                urls,
                output,
            } => export::cmd_detections(&settings, market.as_deref(), &urls, output),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_subcommands() {
        let cli = Cli::try_parse_from([
            "cu", "-t", "/tmp/audit", "analyze", "run-all", "--market", "UK", "--max-batches", "3",
        ])
        .unwrap();
        assert_eq!(cli.target, Some(PathBuf::from("/tmp/audit")));
        assert!(matches!(
            cli.command,
            Commands::Analyze {
                command: AnalyzeCommands::RunAll {
                    max_batches: Some(3),
                    ..
                }
            }
        ));
    }
}
