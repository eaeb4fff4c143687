//! Precision gate: per-component precision from review labels, checked
//! against per-class thresholds.
//!
//! The flow is labels JSONL -> [`RegressionReport`] -> [`GateReport`] ->
//! validation exit code. Each stage reads and writes plain JSON so stages can
//! run separately.

pub mod regression;
pub mod report;
pub mod scorer;

use std::fmt;
use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

pub use regression::{ComponentMetrics, MetricStatus, RegressionReport, RegressionTotals};
pub use report::{validate_file, validate_report, ClassLine, GateInputs, GateReport, GateSummary, Validation};
pub use scorer::{evaluate, ClassSummary, ComponentVerdict, GateClass, GateConfig, GateEvaluation};

/// Minimum scored labels before a regression precision is reported.
pub const DEFAULT_REGRESSION_MIN: u64 = 10;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(
        "component `{component}` has scored={scored} >= min_sample_scored={min}, but precision is null"
    )]
    Inconsistent {
        component: String,
        scored: u64,
        min: u64,
    },
    #[error("gate report missing '{0}' field")]
    MissingField(&'static str),
}

/// Verdict for a component, a class, or the whole gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Pass,
    Fail,
    InsufficientSample,
}

impl GateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::InsufficientSample => "insufficient_sample",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pass" => Some(Self::Pass),
            "fail" => Some(Self::Fail),
            "insufficient_sample" => Some(Self::InsufficientSample),
            _ => None,
        }
    }

    /// Process exit code for CI: 0 pass, 1 fail, 2 insufficient sample.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Pass => 0,
            Self::Fail => 1,
            Self::InsufficientSample => 2,
        }
    }

    /// Fold statuses: any fail fails, else any insufficient is insufficient,
    /// else pass.
    pub fn combine(statuses: impl IntoIterator<Item = GateStatus>) -> GateStatus {
        let mut result = GateStatus::Pass;
        for status in statuses {
            match status {
                GateStatus::Fail => return GateStatus::Fail,
                GateStatus::InsufficientSample => result = GateStatus::InsufficientSample,
                GateStatus::Pass => {}
            }
        }
        result
    }
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn read_to_string(path: &Path) -> Result<String, GateError> {
    std::fs::read_to_string(path).map_err(|source| GateError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, GateError> {
    let text = read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| GateError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Write `value` as pretty JSON, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), GateError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| GateError::Json {
        path: path.display().to_string(),
        source,
    })?;
    write_text(path, &json)
}

pub fn write_text(path: &Path, text: &str) -> Result<(), GateError> {
    let io_err = |source| GateError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, text).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_prefers_fail_then_insufficient() {
        use GateStatus::*;
        assert_eq!(GateStatus::combine([Pass, Pass]), Pass);
        assert_eq!(GateStatus::combine([Pass, InsufficientSample]), InsufficientSample);
        assert_eq!(GateStatus::combine([InsufficientSample, Fail, Pass]), Fail);
        assert_eq!(GateStatus::combine([]), Pass);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(GateStatus::Pass.exit_code(), 0);
        assert_eq!(GateStatus::Fail.exit_code(), 1);
        assert_eq!(GateStatus::InsufficientSample.exit_code(), 2);
    }
}
