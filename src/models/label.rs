//! Human review labels.

use serde::{Deserialize, Serialize};

/// Reviewer verdict on a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Correct,
    WrongType,
    FalsePositive,
    Missing,
    Unclear,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::WrongType => "wrong_type",
            Self::FalsePositive => "false_positive",
            Self::Missing => "missing",
            Self::Unclear => "unclear",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "correct" => Some(Self::Correct),
            "wrong_type" => Some(Self::WrongType),
            "false_positive" => Some(Self::FalsePositive),
            "missing" => Some(Self::Missing),
            "unclear" => Some(Self::Unclear),
            _ => None,
        }
    }

    /// Whether this decision counts towards the precision denominator.
    pub fn is_scored(&self) -> bool {
        matches!(self, Self::Correct | Self::WrongType | Self::FalsePositive)
    }
}

/// One append-only label event, as written by the review tool (JSON lines).
///
/// Required fields are optional here so that a row missing them can be
/// counted as invalid instead of failing to parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Label {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub detection_id: Option<String>,
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub component_key: Option<String>,
    #[serde(default)]
    pub decision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_component_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Label {
    /// Component key, treating an empty string as absent.
    pub fn component(&self) -> Option<&str> {
        self.component_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Raw decision text, treating an empty string as absent.
    pub fn decision_text(&self) -> Option<&str> {
        self.decision.as_deref().filter(|d| !d.is_empty())
    }

    pub fn decision(&self) -> Option<Decision> {
        self.decision_text().and_then(Decision::from_str)
    }
}
