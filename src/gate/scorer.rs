//! Gate evaluation: per-class precision thresholds over a regression report.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{read_json, GateError, GateStatus, RegressionReport};

/// One gate class: a precision floor shared by a set of components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateClass {
    pub min_precision: f64,
    pub components: Vec<String>,
}

/// Quality gate definition (`quality-gates.v1.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    pub version: String,
    pub min_sample_scored: u64,
    #[serde(default)]
    pub precision_denominator: Vec<String>,
    #[serde(default)]
    pub excluded_from_precision: Vec<String>,
    pub classes: BTreeMap<String, GateClass>,
    #[serde(default = "default_insufficient")]
    pub status_if_insufficient: String,
}

fn default_insufficient() -> String {
    GateStatus::InsufficientSample.as_str().to_string()
}

impl GateConfig {
    pub fn load(path: &Path) -> Result<Self, GateError> {
        read_json(path)
    }
}

/// Verdict for one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentVerdict {
    pub class: String,
    pub threshold: f64,
    pub scored: u64,
    pub precision: Option<f64>,
    pub status: GateStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub status: GateStatus,
    pub pass: u64,
    pub fail: u64,
    pub insufficient_sample: u64,
}

impl ClassSummary {
    fn tally<'a>(verdicts: impl IntoIterator<Item = &'a ComponentVerdict>) -> Self {
        let mut summary = ClassSummary {
            status: GateStatus::Pass,
            pass: 0,
            fail: 0,
            insufficient_sample: 0,
        };
        let mut statuses = Vec::new();
        for verdict in verdicts {
            match verdict.status {
                GateStatus::Pass => summary.pass += 1,
                GateStatus::Fail => summary.fail += 1,
                GateStatus::InsufficientSample => summary.insufficient_sample += 1,
            }
            statuses.push(verdict.status);
        }
        summary.status = GateStatus::combine(statuses);
        summary
    }
}

/// Result of evaluating a gate config against a regression report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateEvaluation {
    pub overall_status: GateStatus,
    pub min_sample_scored: u64,
    pub classes: BTreeMap<String, ClassSummary>,
    pub components: BTreeMap<String, ComponentVerdict>,
}

fn judge(
    class: &str,
    gate: &GateClass,
    key: &str,
    report: &RegressionReport,
    min_scored: u64,
) -> Result<ComponentVerdict, GateError> {
    let verdict = |scored: u64, precision: Option<f64>, status: GateStatus| ComponentVerdict {
        class: class.to_string(),
        threshold: gate.min_precision,
        scored,
        precision,
        status,
    };

    let Some(metrics) = report.components.get(key) else {
        return Ok(verdict(0, None, GateStatus::InsufficientSample));
    };

    if metrics.scored < min_scored {
        return Ok(verdict(metrics.scored, None, GateStatus::InsufficientSample));
    }

    let precision = metrics.precision.ok_or_else(|| GateError::Inconsistent {
        component: key.to_string(),
        scored: metrics.scored,
        min: min_scored,
    })?;

    let status = if precision >= gate.min_precision {
        GateStatus::Pass
    } else {
        GateStatus::Fail
    };
    Ok(verdict(metrics.scored, Some(precision), status))
}

/// Evaluate every class of `config` against `report`.
///
/// A component with enough scored labels but no precision means the report
/// and config disagree on the sample minimum; that aborts the evaluation.
pub fn evaluate(report: &RegressionReport, config: &GateConfig) -> Result<GateEvaluation, GateError> {
    let min_scored = config.min_sample_scored;
    let mut components = BTreeMap::new();
    let mut classes = BTreeMap::new();

    for (class_name, gate) in &config.classes {
        let mut verdicts = Vec::with_capacity(gate.components.len());
        for key in &gate.components {
            let verdict = judge(class_name, gate, key, report, min_scored)?;
            components.insert(key.clone(), verdict.clone());
            verdicts.push(verdict);
        }
        classes.insert(class_name.clone(), ClassSummary::tally(&verdicts));
    }

    let overall_status = GateStatus::combine(classes.values().map(|c: &ClassSummary| c.status));

    Ok(GateEvaluation {
        overall_status,
        min_sample_scored: min_scored,
        classes,
        components,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::regression::{ComponentMetrics, MetricStatus, RegressionTotals};

    fn metrics(correct: u64, wrong: u64, min: u64) -> ComponentMetrics {
        let scored = correct + wrong;
        let computed = scored >= min && scored > 0;
        ComponentMetrics {
            total_labels: scored,
            scored,
            correct,
            wrong_type: 0,
            false_positive: wrong,
            unclear: 0,
            missing: 0,
            precision: computed.then(|| correct as f64 / scored as f64),
            status: if computed {
                MetricStatus::Computed
            } else {
                MetricStatus::InsufficientSample
            },
        }
    }

    fn report(entries: &[(&str, ComponentMetrics)]) -> RegressionReport {
        RegressionReport {
            generated_at: "2025-01-01T00:00:00.000Z".into(),
            source: "labels.jsonl".into(),
            totals: RegressionTotals::default(),
            components: entries
                .iter()
                .map(|(k, m)| (k.to_string(), m.clone()))
                .collect(),
        }
    }

    fn config(threshold: f64, components: &[&str]) -> GateConfig {
        GateConfig {
            version: "v1".into(),
            min_sample_scored: 10,
            precision_denominator: vec!["correct".into(), "wrong_type".into(), "false_positive".into()],
            excluded_from_precision: vec!["unclear".into(), "missing".into()],
            classes: BTreeMap::from([(
                "A".to_string(),
                GateClass {
                    min_precision: threshold,
                    components: components.iter().map(|c| c.to_string()).collect(),
                },
            )]),
            status_if_insufficient: "insufficient_sample".into(),
        }
    }

    #[test]
    fn threshold_decides_pass_or_fail() {
        let r = report(&[("hero", metrics(8, 2, 10))]);

        let strict = evaluate(&r, &config(0.85, &["hero"])).unwrap();
        assert_eq!(strict.components["hero"].status, GateStatus::Fail);
        assert_eq!(strict.components["hero"].precision, Some(0.8));
        assert_eq!(strict.overall_status, GateStatus::Fail);

        let lenient = evaluate(&r, &config(0.75, &["hero"])).unwrap();
        assert_eq!(lenient.components["hero"].status, GateStatus::Pass);
        assert_eq!(lenient.overall_status, GateStatus::Pass);
    }

    #[test]
    fn missing_or_small_samples_are_insufficient() {
        let r = report(&[("tabs", metrics(5, 0, 10))]);
        let eval = evaluate(&r, &config(0.5, &["tabs", "accordion"])).unwrap();

        assert_eq!(eval.components["tabs"].status, GateStatus::InsufficientSample);
        assert_eq!(eval.components["tabs"].scored, 5);
        assert_eq!(eval.components["tabs"].precision, None);
        assert_eq!(eval.components["accordion"].scored, 0);
        assert_eq!(eval.classes["A"].insufficient_sample, 2);
        assert_eq!(eval.overall_status, GateStatus::InsufficientSample);
    }

    #[test]
    fn null_precision_with_enough_labels_is_fatal() {
        // Report computed with a higher minimum than the gate uses.
        let r = report(&[("hero", metrics(10, 2, 20))]);
        let err = evaluate(&r, &config(0.5, &["hero"])).unwrap_err();
        assert!(matches!(err, GateError::Inconsistent { scored: 12, min: 10, .. }));
    }

    #[test]
    fn zero_minimum_with_zero_scored_is_inconsistent() {
        let r = report(&[("hero", metrics(0, 0, 0))]);
        let mut cfg = config(0.5, &["hero", "tabs"]);
        cfg.min_sample_scored = 0;
        let err = evaluate(&r, &cfg).unwrap_err();
        assert!(matches!(err, GateError::Inconsistent { scored: 0, min: 0, .. }));
    }

    #[test]
    fn lowering_threshold_never_turns_pass_into_fail() {
        let r = report(&[("hero", metrics(9, 3, 10))]);
        let mut previous = GateStatus::Fail;
        for step in (0..=20).rev() {
            let threshold = step as f64 / 20.0;
            let status = evaluate(&r, &config(threshold, &["hero"])).unwrap().overall_status;
            if previous == GateStatus::Pass {
                assert_eq!(status, GateStatus::Pass);
            }
            previous = status;
        }
        assert_eq!(previous, GateStatus::Pass);
    }
}
