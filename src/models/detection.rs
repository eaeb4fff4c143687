//! Component detection models.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Known component types the detection engine can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKey {
    Tabs,
    Accordion,
    AnchorNav,
    ImageCarousel,
    CardCarousel,
    CardsSection,
    IconGrid,
    MediaTextSplit,
    InfoSpecs,
    NextActionPanel,
    Hero,
    PromoSection,
}

impl ComponentKey {
    pub const ALL: [ComponentKey; 12] = [
        Self::Tabs,
        Self::Accordion,
        Self::AnchorNav,
        Self::ImageCarousel,
        Self::CardCarousel,
        Self::CardsSection,
        Self::IconGrid,
        Self::MediaTextSplit,
        Self::InfoSpecs,
        Self::NextActionPanel,
        Self::Hero,
        Self::PromoSection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tabs => "tabs",
            Self::Accordion => "accordion",
            Self::AnchorNav => "anchor_nav",
            Self::ImageCarousel => "image_carousel",
            Self::CardCarousel => "card_carousel",
            Self::CardsSection => "cards_section",
            Self::IconGrid => "icon_grid",
            Self::MediaTextSplit => "media_text_split",
            Self::InfoSpecs => "info_specs",
            Self::NextActionPanel => "next_action_panel",
            Self::Hero => "hero",
            Self::PromoSection => "promo_section",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == s)
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualitative strength of a detection's signal.
///
/// Semantic role attributes give `High`; class-name and structural
/// heuristics give `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// A component found on one page by one rule firing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub component_key: ComponentKey,
    pub instance_count: u32,
    pub confidence: Confidence,
    /// Short summary of what the rule saw (counts, item lists, variants).
    pub evidence: String,
}

impl Detection {
    pub fn new(
        component_key: ComponentKey,
        instance_count: u32,
        confidence: Confidence,
        evidence: impl Into<String>,
    ) -> Self {
        Self {
            component_key,
            instance_count: instance_count.max(1),
            confidence,
            evidence: evidence.into(),
        }
    }
}

/// A detection persisted against an inventoried URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDetection {
    pub id: i64,
    pub url_id: i64,
    /// Kept as text so rows written by older rule sets still load.
    pub component_key: String,
    pub instance_count: u32,
    pub confidence: Option<String>,
    pub evidence: Option<String>,
    pub created_at: DateTime<Utc>,
}
