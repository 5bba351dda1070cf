//! Hop types and the hop audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "typescript")]
use ts_rs::TS;

use crate::hypothesis::Decision;
use crate::signal::SignalType;

/// Category of source a hop searches.
///
/// Closed set: every per-hop behavior is an exhaustive `match`, so a new
/// variant cannot silently fall through to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum HopType {
    /// Careers / vacancies pages
    CareersPage,
    /// The entity's official website
    OfficialSite,
    /// RFP, tender and procurement pages
    RfpPage,
    /// Press releases and news
    PressRelease,
    /// PDF documents (annual reports, tender packs)
    PdfDocument,
}

impl HopType {
    /// Every hop type, in selection order.
    pub const ALL: [HopType; 5] = [
        HopType::RfpPage,
        HopType::PdfDocument,
        HopType::OfficialSite,
        HopType::PressRelease,
        HopType::CareersPage,
    ];

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CareersPage => "careers_page",
            Self::OfficialSite => "official_site",
            Self::RfpPage => "rfp_page",
            Self::PressRelease => "press_release",
            Self::PdfDocument => "pdf_document",
        }
    }

    /// Credibility assigned to evidence from this source category.
    pub fn default_credibility(&self) -> f64 {
        match self {
            Self::RfpPage => 0.9,
            Self::PdfDocument => 0.85,
            Self::OfficialSite => 0.8,
            Self::PressRelease => 0.7,
            Self::CareersPage => 0.6,
        }
    }

    /// Signal type assumed when the evaluator does not name one.
    pub fn default_signal_type(&self) -> SignalType {
        match self {
            Self::RfpPage => SignalType::RfpDetected,
            Self::PdfDocument => SignalType::TenderNotice,
            Self::OfficialSite => SignalType::TechnologyAdoption,
            Self::PressRelease => SignalType::Partnership,
            Self::CareersPage => SignalType::Hiring,
        }
    }
}

impl fmt::Display for HopType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record of one accumulator invocation.
///
/// Append-only; a hop that yields several evaluated items produces one
/// attempt per item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopAttempt {
    /// Hypothesis the hop was pursued for
    pub hypothesis_id: String,
    /// Hop type
    pub hop_type: HopType,
    /// Query that produced the content (empty when no query yielded anything)
    pub query: String,
    /// URL the content came from (empty on NO_PROGRESS)
    pub source_url: String,
    /// Characters of content fetched
    pub chars_fetched: usize,
    /// Decision applied
    pub decision: Decision,
    /// Confidence change actually applied
    pub confidence_delta: f64,
    /// When the attempt was recorded
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_all_unique() {
        let unique: HashSet<_> = HopType::ALL.iter().collect();
        assert_eq!(unique.len(), HopType::ALL.len());
        for hop in HopType::ALL {
            assert!(hop.default_credibility() > 0.0);
        }
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&HopType::PdfDocument).unwrap();
        assert_eq!(json, "\"pdf_document\"");
        assert_eq!(HopType::RfpPage.to_string(), "rfp_page");
    }
}
