//! Actionability bands.

use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Actionability tier, ordered from least to most actionable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Band {
    Exploratory,
    Informed,
    Confident,
    Actionable,
}

impl Band {
    /// Every band, lowest first.
    pub const ALL: [Band; 4] = [Band::Exploratory, Band::Informed, Band::Confident, Band::Actionable];

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exploratory => "EXPLORATORY",
            Self::Informed => "INFORMED",
            Self::Confident => "CONFIDENT",
            Self::Actionable => "ACTIONABLE",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Banding result for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ConfidenceBand {
    /// Entity banded
    pub entity_id: String,
    /// Aggregate confidence (0.0 - 1.0)
    pub final_confidence: f64,
    /// Actionability band
    pub band: Band,
    /// Number of validated signals
    pub accept_count: usize,
    /// Distinct categories among validated signals
    pub unique_categories: usize,
    /// Whether the entity is actionable
    pub is_actionable: bool,
}
