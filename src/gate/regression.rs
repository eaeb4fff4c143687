//! Per-component precision from review labels.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::{read_json, read_to_string, GateError};
use crate::models::{Decision, Label};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Computed,
    InsufficientSample,
}

impl MetricStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Computed => "computed",
            Self::InsufficientSample => "insufficient_sample",
        }
    }
}

/// Label counts and precision for one detected component key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentMetrics {
    pub total_labels: u64,
    pub scored: u64,
    pub correct: u64,
    pub wrong_type: u64,
    pub false_positive: u64,
    pub unclear: u64,
    pub missing: u64,
    pub precision: Option<f64>,
    pub status: MetricStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DecisionCounts {
    correct: u64,
    wrong_type: u64,
    false_positive: u64,
    unclear: u64,
    missing: u64,
}

impl DecisionCounts {
    fn record(&mut self, decision: Option<Decision>) {
        match decision {
            Some(Decision::Correct) => self.correct += 1,
            Some(Decision::WrongType) => self.wrong_type += 1,
            Some(Decision::FalsePositive) => self.false_positive += 1,
            Some(Decision::Unclear) => self.unclear += 1,
            Some(Decision::Missing) => self.missing += 1,
            None => {}
        }
    }

    fn into_metrics(self, min_scored: u64) -> ComponentMetrics {
        let scored = self.correct + self.wrong_type + self.false_positive;
        let computed = scored >= min_scored && scored > 0;
        ComponentMetrics {
            total_labels: scored + self.unclear + self.missing,
            scored,
            correct: self.correct,
            wrong_type: self.wrong_type,
            false_positive: self.false_positive,
            unclear: self.unclear,
            missing: self.missing,
            precision: computed.then(|| self.correct as f64 / scored as f64),
            status: if computed {
                MetricStatus::Computed
            } else {
                MetricStatus::InsufficientSample
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressionTotals {
    /// Non-blank lines.
    pub rows: u64,
    pub parsed: u64,
    pub parse_errors: u64,
    /// Rows without a component key or decision.
    pub invalid_rows: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionReport {
    pub generated_at: String,
    pub source: String,
    pub totals: RegressionTotals,
    pub components: BTreeMap<String, ComponentMetrics>,
}

impl RegressionReport {
    /// Compute the report over JSONL label text.
    pub fn from_labels(text: &str, source: impl Into<String>, min_scored: u64) -> Self {
        let mut totals = RegressionTotals::default();
        let mut counts: BTreeMap<String, DecisionCounts> = BTreeMap::new();

        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            totals.rows += 1;

            let label: Label = match serde_json::from_str(line) {
                Ok(label) => label,
                Err(_) => {
                    totals.parse_errors += 1;
                    continue;
                }
            };

            let (Some(component), Some(_)) = (label.component(), label.decision_text()) else {
                totals.invalid_rows += 1;
                continue;
            };

            totals.parsed += 1;
            counts
                .entry(component.to_string())
                .or_default()
                .record(label.decision());
        }

        Self {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            source: source.into(),
            totals,
            components: counts
                .into_iter()
                .map(|(key, c)| (key, c.into_metrics(min_scored)))
                .collect(),
        }
    }

    pub fn from_file(path: &Path, min_scored: u64) -> Result<Self, GateError> {
        let text = read_to_string(path)?;
        Ok(Self::from_labels(&text, path.display().to_string(), min_scored))
    }

    /// Read a previously written report.
    pub fn load(path: &Path) -> Result<Self, GateError> {
        read_json(path)
    }

    pub fn total_scored(&self) -> u64 {
        self.components.values().map(|m| m.scored).sum()
    }

    /// Components with a computed precision, best first.
    pub fn computed(&self) -> Vec<(&str, &ComponentMetrics)> {
        let mut rows: Vec<_> = self
            .components
            .iter()
            .filter(|(_, m)| m.status == MetricStatus::Computed)
            .map(|(k, m)| (k.as_str(), m))
            .collect();
        rows.sort_by(|a, b| {
            b.1.precision
                .unwrap_or(0.0)
                .total_cmp(&a.1.precision.unwrap_or(0.0))
        });
        rows
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "# Regression Check: Precision Metrics\n");
        let _ = writeln!(md, "**Generated:** {}\n", self.generated_at);
        let _ = writeln!(md, "**Source:** {}\n", self.source);
        let _ = writeln!(md, "## Summary\n");
        let _ = writeln!(md, "- **Total rows:** {}", self.totals.rows);
        let _ = writeln!(md, "- **Parsed:** {}", self.totals.parsed);
        let _ = writeln!(md, "- **Parse errors:** {}", self.totals.parse_errors);
        let _ = writeln!(md, "- **Invalid rows:** {}", self.totals.invalid_rows);
        let _ = writeln!(md, "- **Components:** {}\n", self.components.len());
        let _ = writeln!(md, "## Per-Component Metrics\n");
        let _ = writeln!(
            md,
            "| Component | Precision | Correct | Wrong type | False pos | Unclear | Missing | Scored | Status |"
        );
        let _ = writeln!(
            md,
            "|-----------|-----------|---------|------------|-----------|---------|---------|--------|--------|"
        );

        for (key, m) in &self.components {
            let precision = m
                .precision
                .map(|p| format!("{:.1}%", p * 100.0))
                .unwrap_or_else(|| "n/a".to_string());
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} | {} | {} | {} | {} | {} |",
                key,
                precision,
                m.correct,
                m.wrong_type,
                m.false_positive,
                m.unclear,
                m.missing,
                m.scored,
                m.status.as_str()
            );
        }

        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(component: &str, decision: &str) -> String {
        format!(
            r#"{{"timestamp":"2025-01-01T00:00:00Z","detection_id":"d","page_url":"https://example.com/","component_key":"{component}","decision":"{decision}"}}"#
        )
    }

    fn labels(component: &str, decisions: &[(&str, usize)]) -> String {
        decisions
            .iter()
            .flat_map(|(d, n)| std::iter::repeat(line(component, d)).take(*n))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn computes_precision_over_scored_labels() {
        let text = labels(
            "hero",
            &[("correct", 8), ("wrong_type", 1), ("false_positive", 1), ("unclear", 2), ("missing", 1)],
        );
        let report = RegressionReport::from_labels(&text, "labels.jsonl", 10);
        let hero = &report.components["hero"];
        assert_eq!(hero.scored, 10);
        assert_eq!(hero.total_labels, 13);
        assert_eq!(hero.precision, Some(0.8));
        assert_eq!(hero.status, MetricStatus::Computed);
        assert_eq!(report.totals.rows, 13);
        assert_eq!(report.totals.parsed, 13);
    }

    #[test]
    fn small_samples_have_no_precision() {
        let text = labels("tabs", &[("correct", 9)]);
        let report = RegressionReport::from_labels(&text, "x", 10);
        assert_eq!(report.components["tabs"].precision, None);
        assert_eq!(report.components["tabs"].status, MetricStatus::InsufficientSample);
    }

    #[test]
    fn counts_bad_rows() {
        let text = format!(
            "{}\n\nnot json\n{{\"component_key\":\"hero\"}}\n{{\"decision\":\"correct\",\"component_key\":\"\"}}\n",
            line("hero", "correct")
        );
        let report = RegressionReport::from_labels(&text, "x", 10);
        assert_eq!(report.totals.rows, 4);
        assert_eq!(report.totals.parsed, 1);
        assert_eq!(report.totals.parse_errors, 1);
        assert_eq!(report.totals.invalid_rows, 2);
    }

    #[test]
    fn more_wrong_labels_never_raise_precision() {
        let base = labels("accordion", &[("correct", 10), ("false_positive", 2)]);
        let worse = labels("accordion", &[("correct", 10), ("false_positive", 5)]);
        let a = RegressionReport::from_labels(&base, "x", 10).components["accordion"].precision;
        let b = RegressionReport::from_labels(&worse, "x", 10).components["accordion"].precision;
        assert!(b.unwrap() <= a.unwrap());
    }

    #[test]
    fn markdown_lists_components() {
        let text = labels("hero", &[("correct", 10)]);
        let md = RegressionReport::from_labels(&text, "x", 10).to_markdown();
        assert!(md.contains("| hero | 100.0% | 10 | 0 | 0 | 0 | 0 | 10 | computed |"));
    }
}
