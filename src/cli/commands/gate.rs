//! Precision regression and quality gate commands.

use std::path::{Path, PathBuf};

use console::style;

use crate::cli::helpers::{artifacts_dir, format_precision};
use crate::config::Settings;
use crate::gate::{
    evaluate, validate_file, write_json, write_text, GateConfig, GateInputs, GateReport,
    GateStatus, RegressionReport,
};

const REGRESSION_JSON: &str = "regression-report.json";
const REGRESSION_MD: &str = "regression-report.md";
const GATE_JSON: &str = "gate-report.json";
const GATE_MD: &str = "gate-report.md";

fn status_style(status: GateStatus) -> console::StyledObject<&'static str> {
    let label = status.as_str();
    match status {
        GateStatus::Pass => style(label).green(),
        GateStatus::Fail => style(label).red(),
        GateStatus::InsufficientSample => style(label).yellow(),
    }
}

/// Compute per-component precision from labels.
pub fn cmd_regression(
    settings: &Settings,
    labels: &Path,
    out_dir: Option<PathBuf>,
    min_scored: Option<u64>,
) -> anyhow::Result<()> {
    let min_scored = min_scored.unwrap_or(settings.regression_min_scored);
    let report = RegressionReport::from_file(labels, min_scored)?;

    let out_dir = out_dir.unwrap_or_else(|| artifacts_dir(settings, "regression"));
    let json_path = out_dir.join(REGRESSION_JSON);
    let md_path = out_dir.join(REGRESSION_MD);
    write_json(&json_path, &report)?;
    write_text(&md_path, &report.to_markdown())?;

    let totals = &report.totals;
    println!(
        "{} Read {} label rows ({} parsed, {} parse errors, {} invalid)",
        style("✓").green(),
        totals.rows,
        totals.parsed,
        totals.parse_errors,
        totals.invalid_rows
    );
    println!(
        "  {} components, {} scored labels, minimum sample {}",
        report.components.len(),
        report.total_scored(),
        min_scored
    );

    let computed = report.computed();
    if computed.is_empty() {
        println!("{} No component has enough scored labels yet", style("!").yellow());
    } else {
        println!();
        println!("  {:<20} {:>8} {:>10}", "Component", "Scored", "Precision");
        for (key, metrics) in computed {
            println!(
                "  {:<20} {:>8} {:>10}",
                key,
                metrics.scored,
                format_precision(metrics.precision)
            );
        }
    }

    println!();
    println!("  JSON:     {}", json_path.display());
    println!("  Markdown: {}", md_path.display());
    Ok(())
}

/// Evaluate gate classes against a regression report.
pub fn cmd_report(
    settings: &Settings,
    gates: &Path,
    regression: Option<PathBuf>,
    out_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let regression =
        regression.unwrap_or_else(|| artifacts_dir(settings, "regression").join(REGRESSION_JSON));
    let report = RegressionReport::load(&regression)?;
    let config = GateConfig::load(gates)?;

    let evaluation = evaluate(&report, &config)?;
    let gate_report = GateReport::new(
        evaluation,
        GateInputs {
            regression_report: regression.display().to_string(),
            gates_config: gates.display().to_string(),
        },
    );

    let out_dir = out_dir.unwrap_or_else(|| artifacts_dir(settings, "gates"));
    let json_path = out_dir.join(GATE_JSON);
    let md_path = out_dir.join(GATE_MD);
    write_json(&json_path, &gate_report)?;
    write_text(&md_path, &gate_report.to_markdown(&config))?;

    let (pass, fail, insufficient) = gate_report.status_counts();
    println!(
        "{} Overall: {}",
        style("✓").green(),
        status_style(gate_report.summary.overall_status)
    );
    for (name, class) in &gate_report.summary.classes {
        println!(
            "  Class {:<4} {:<20} pass {} / fail {} / insufficient {}",
            name,
            status_style(class.status),
            class.pass,
            class.fail,
            class.insufficient_sample
        );
    }
    println!(
        "  Components: {} pass, {} fail, {} insufficient",
        pass, fail, insufficient
    );
    println!();
    println!("  JSON:     {}", json_path.display());
    println!("  Markdown: {}", md_path.display());
    Ok(())
}

/// Validate a gate report and exit with its status code.
pub fn cmd_validate(settings: &Settings, report: Option<PathBuf>) -> anyhow::Result<()> {
    let path = report.unwrap_or_else(|| artifacts_dir(settings, "gates").join(GATE_JSON));
    let validation = validate_file(&path)?;

    println!("{}", style("QUALITY GATE").cyan().bold());
    println!("  Report:   {}", path.display());
    match validation.status() {
        Some(status) => println!("  Overall:  {}", status_style(status)),
        None => println!(
            "  Overall:  {} (unknown status)",
            style(&validation.overall_status).red()
        ),
    }
    println!("  Min sample scored: {}", validation.min_sample_scored);
    for class in &validation.classes {
        println!(
            "  Class {:<4} {:<20} pass {} / fail {} / insufficient {}",
            class.name, class.status, class.pass, class.fail, class.insufficient_sample
        );
    }

    let code = validation.exit_code();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
