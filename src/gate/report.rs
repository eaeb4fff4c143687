//! Gate report rendering and validation.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{read_to_string, ClassSummary, ComponentVerdict, GateConfig, GateError, GateEvaluation, GateStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateInputs {
    pub regression_report: String,
    pub gates_config: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSummary {
    pub overall_status: GateStatus,
    pub min_sample_scored: u64,
    pub classes: BTreeMap<String, ClassSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    pub generated_at: String,
    pub inputs: GateInputs,
    pub summary: GateSummary,
    pub components: BTreeMap<String, ComponentVerdict>,
}

impl GateReport {
    pub fn new(evaluation: GateEvaluation, inputs: GateInputs) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            inputs,
            summary: GateSummary {
                overall_status: evaluation.overall_status,
                min_sample_scored: evaluation.min_sample_scored,
                classes: evaluation.classes,
            },
            components: evaluation.components,
        }
    }

    /// Count of components per status across all classes.
    pub fn status_counts(&self) -> (usize, usize, usize) {
        let count = |s: GateStatus| self.components.values().filter(|c| c.status == s).count();
        (
            count(GateStatus::Pass),
            count(GateStatus::Fail),
            count(GateStatus::InsufficientSample),
        )
    }

    /// Markdown rendering, one table per class in config order.
    pub fn to_markdown(&self, config: &GateConfig) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "# Quality Gate Report\n");
        let _ = writeln!(md, "**Generated:** {}", self.generated_at);
        let _ = writeln!(
            md,
            "**Overall Status:** {}",
            self.summary.overall_status.as_str().to_uppercase()
        );
        let _ = writeln!(md, "**Min Sample Scored:** {}\n", self.summary.min_sample_scored);

        for (name, class) in &config.classes {
            let Some(summary) = self.summary.classes.get(name) else {
                continue;
            };
            let _ = writeln!(md, "## Class {}\n", name);
            let _ = writeln!(md, "**Status:** {}", summary.status.as_str().to_uppercase());
            let _ = writeln!(
                md,
                "**Pass:** {} | **Fail:** {} | **Insufficient:** {}\n",
                summary.pass, summary.fail, summary.insufficient_sample
            );
            let _ = writeln!(md, "|Component|Threshold|Scored|Precision|Status|");
            let _ = writeln!(md, "|---|---|---|---|---|");
            for key in &class.components {
                let Some(verdict) = self.components.get(key) else {
                    continue;
                };
                let precision = verdict
                    .precision
                    .map(|p| format!("{:.2}", p))
                    .unwrap_or_else(|| "N/A".to_string());
                let _ = writeln!(
                    md,
                    "|{}|{}|{}|{}|{}|",
                    key, verdict.threshold, verdict.scored, precision, verdict.status
                );
            }
            md.push('\n');
        }

        md
    }
}

/// One class line read back from a gate report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLine {
    pub name: String,
    pub status: String,
    pub pass: u64,
    pub fail: u64,
    pub insufficient_sample: u64,
}

/// Result of validating a stored gate report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub overall_status: String,
    pub min_sample_scored: u64,
    pub classes: Vec<ClassLine>,
}

impl Validation {
    pub fn status(&self) -> Option<GateStatus> {
        GateStatus::from_str(&self.overall_status)
    }

    /// 0 pass, 1 fail or unknown status, 2 insufficient sample.
    pub fn exit_code(&self) -> i32 {
        self.status().map(|s| s.exit_code()).unwrap_or(1)
    }
}

/// Check a gate report's required summary fields.
pub fn validate_report(text: &str, source: &str) -> Result<Validation, GateError> {
    let report: Value = serde_json::from_str(text).map_err(|e| GateError::Json {
        path: source.to_string(),
        source: e,
    })?;

    let summary = report
        .get("summary")
        .filter(|v| v.is_object())
        .ok_or(GateError::MissingField("summary"))?;
    let overall_status = summary
        .get("overall_status")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(GateError::MissingField("summary.overall_status"))?;
    let min_sample_scored = summary
        .get("min_sample_scored")
        .and_then(Value::as_u64)
        .ok_or(GateError::MissingField("summary.min_sample_scored"))?;
    let classes = summary
        .get("classes")
        .and_then(Value::as_object)
        .ok_or(GateError::MissingField("summary.classes"))?;

    let count = |v: &Value, field: &str| v.get(field).and_then(Value::as_u64).unwrap_or(0);
    let classes = classes
        .iter()
        .map(|(name, v)| ClassLine {
            name: name.clone(),
            status: v
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            pass: count(v, "pass"),
            fail: count(v, "fail"),
            insufficient_sample: count(v, "insufficient_sample"),
        })
        .collect();

    Ok(Validation {
        overall_status: overall_status.to_string(),
        min_sample_scored,
        classes,
    })
}

pub fn validate_file(path: &Path) -> Result<Validation, GateError> {
    let text = read_to_string(path)?;
    validate_report(&text, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{evaluate, GateClass, RegressionReport};

    fn sample_report(threshold: f64) -> (GateReport, GateConfig) {
        let labels: String = std::iter::repeat(r#"{"component_key":"hero","decision":"correct"}"#)
            .take(8)
            .chain(std::iter::repeat(r#"{"component_key":"hero","decision":"false_positive"}"#).take(2))
            .collect::<Vec<_>>()
            .join("\n");
        let regression = RegressionReport::from_labels(&labels, "labels.jsonl", 10);
        let config = GateConfig {
            version: "v1".into(),
            min_sample_scored: 10,
            precision_denominator: vec![],
            excluded_from_precision: vec![],
            classes: BTreeMap::from([(
                "A".to_string(),
                GateClass {
                    min_precision: threshold,
                    components: vec!["hero".into()],
                },
            )]),
            status_if_insufficient: "insufficient_sample".into(),
        };
        let eval = evaluate(&regression, &config).unwrap();
        let inputs = GateInputs {
            regression_report: "regression-report.json".into(),
            gates_config: "quality-gates.v1.json".into(),
        };
        (GateReport::new(eval, inputs), config)
    }

    #[test]
    fn report_round_trips_through_validation() {
        let (report, _) = sample_report(0.75);
        let json = serde_json::to_string_pretty(&report).unwrap();
        let validation = validate_report(&json, "gate-report.json").unwrap();
        assert_eq!(validation.overall_status, "pass");
        assert_eq!(validation.exit_code(), 0);
        assert_eq!(validation.classes[0].pass, 1);

        let (failing, _) = sample_report(0.85);
        let json = serde_json::to_string(&failing).unwrap();
        assert_eq!(validate_report(&json, "x").unwrap().exit_code(), 1);
    }

    #[test]
    fn insufficient_exits_two() {
        let json = r#"{"summary":{"overall_status":"insufficient_sample","min_sample_scored":10,"classes":{}}}"#;
        assert_eq!(validate_report(json, "x").unwrap().exit_code(), 2);
    }

    #[test]
    fn missing_fields_are_reported() {
        let err = validate_report(r#"{"summary":{"overall_status":"pass","classes":{}}}"#, "x").unwrap_err();
        assert!(matches!(err, GateError::MissingField("summary.min_sample_scored")));
        let err = validate_report("{}", "x").unwrap_err();
        assert!(matches!(err, GateError::MissingField("summary")));
    }

    #[test]
    fn unknown_status_fails() {
        let json = r#"{"summary":{"overall_status":"maybe","min_sample_scored":10,"classes":{}}}"#;
        assert_eq!(validate_report(json, "x").unwrap().exit_code(), 1);
    }

    #[test]
    fn markdown_has_class_table() {
        let (report, config) = sample_report(0.85);
        let md = report.to_markdown(&config);
        assert!(md.contains("**Overall Status:** FAIL"));
        assert!(md.contains("|hero|0.85|10|0.80|fail|"));
    }
}
