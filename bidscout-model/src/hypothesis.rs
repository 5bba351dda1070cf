//! Hypotheses and the evaluator decision vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "typescript")]
use ts_rs::TS;

use crate::evidence::EvidenceItem;
use crate::hop::HopType;
use crate::signal::SignalType;

/// Lifecycle status of a hypothesis.
///
/// `Active` is the only non-terminal status; once a hypothesis leaves it,
/// neither confidence nor status change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HypothesisStatus {
    /// Still being explored
    Active,
    /// Confidence threshold reached with enough evidence
    Accepted,
    /// Explicitly rejected by the evaluator
    Rejected,
    /// Iteration budget or diminishing returns exhausted
    Saturated,
}

impl HypothesisStatus {
    /// Whether the status is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Saturated => "SATURATED",
        }
    }
}

/// Evaluator decision for one piece of evidence against a hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Evidence supports the hypothesis
    Accept,
    /// Evidence weakly supports the hypothesis
    WeakAccept,
    /// Evidence is irrelevant or absent
    NoProgress,
    /// Evidence contradicts the hypothesis
    Reject,
}

impl Decision {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "ACCEPT",
            Self::WeakAccept => "WEAK_ACCEPT",
            Self::NoProgress => "NO_PROGRESS",
            Self::Reject => "REJECT",
        }
    }

    /// Whether the decision counts as supporting evidence.
    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Accept | Self::WeakAccept)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a decision label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown decision: {0}")]
pub struct ParseDecisionError(pub String);

impl FromStr for Decision {
    type Err = ParseDecisionError;

    /// Accepts the canonical labels in any case, with `-` or spaces in place of `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "ACCEPT" => Ok(Self::Accept),
            "WEAK_ACCEPT" => Ok(Self::WeakAccept),
            "NO_PROGRESS" => Ok(Self::NoProgress),
            "REJECT" => Ok(Self::Reject),
            _ => Err(ParseDecisionError(s.to_string())),
        }
    }
}

/// A signal descriptor collected from an accepted evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Type of signal
    pub signal_type: SignalType,
    /// Signal category (e.g. "CRM", "Ticketing")
    pub category: String,
    /// Short description of the opportunity
    pub description: String,
    /// Hop type the finding came from
    pub hop_type: HopType,
    /// URL the finding came from
    pub source_url: String,
}

/// A claim about an entity whose confidence is refined by evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Unique hypothesis ID
    pub id: String,
    /// Entity the hypothesis is about
    pub entity_id: String,
    /// Signal category
    pub category: String,
    /// Human-readable statement
    pub statement: String,
    /// Confidence at creation
    pub prior_confidence: f64,
    /// Running confidence (0.0 - 1.0)
    pub current_confidence: f64,
    /// Expected information gain, recomputed each round
    pub eig: f64,
    /// Lifecycle status
    pub status: HypothesisStatus,
    /// Number of supporting evidence items
    pub evidence_count: usize,
    /// Hops pursued for this hypothesis
    pub iteration_count: u32,
    /// Hops in a row that made no progress
    #[serde(default)]
    pub consecutive_no_progress: u32,
    /// Supporting evidence bundle
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
    /// Accepted signal descriptors
    #[serde(default)]
    pub findings: Vec<Finding>,
}

impl Hypothesis {
    /// Create an active hypothesis from a category prior.
    ///
    /// The id is derived from entity and category so repeated runs over the
    /// same entity produce the same hypothesis ids.
    pub fn new(
        entity_id: impl Into<String>,
        category: impl Into<String>,
        statement: impl Into<String>,
        prior_confidence: f64,
    ) -> Self {
        let entity_id = entity_id.into();
        let category = category.into();
        let prior = prior_confidence.clamp(0.0, 1.0);
        Self {
            id: Self::id_for(&entity_id, &category),
            entity_id,
            category,
            statement: statement.into(),
            prior_confidence: prior,
            current_confidence: prior,
            eig: 0.0,
            status: HypothesisStatus::Active,
            evidence_count: 0,
            iteration_count: 0,
            consecutive_no_progress: 0,
            evidence: Vec::new(),
            findings: Vec::new(),
        }
    }

    /// Hypothesis id for an entity and category.
    pub fn id_for(entity_id: &str, category: &str) -> String {
        format!("hyp_{}_{}", slug(entity_id), Self::category_key(category))
    }

    /// The part of the hypothesis id derived from a category name.
    ///
    /// Categories with equal keys map to the same hypothesis id.
    pub fn category_key(category: &str) -> String {
        slug(category)
    }

    /// Whether the hypothesis is still being explored.
    pub fn is_active(&self) -> bool {
        self.status == HypothesisStatus::Active
    }

    /// Whether the hypothesis has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Attach a supporting evidence item.
    pub fn attach_evidence(&mut self, item: EvidenceItem) {
        self.evidence.push(item);
        self.evidence_count = self.evidence.len();
    }
}

/// Lowercase ASCII slug: alphanumerics kept, runs of anything else become `_`.
fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_sep = true;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_sep = false;
        } else if !last_sep {
            out.push('_');
            last_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_parsing() {
        assert_eq!("accept".parse::<Decision>().unwrap(), Decision::Accept);
        assert_eq!("Weak-Accept".parse::<Decision>().unwrap(), Decision::WeakAccept);
        assert_eq!(" no progress ".parse::<Decision>().unwrap(), Decision::NoProgress);
        assert_eq!("REJECT".parse::<Decision>().unwrap(), Decision::Reject);
        assert!("maybe".parse::<Decision>().is_err());
    }

    #[test]
    fn test_decision_serde() {
        let json = serde_json::to_string(&Decision::WeakAccept).unwrap();
        assert_eq!(json, "\"WEAK_ACCEPT\"");
    }

    #[test]
    fn test_new_hypothesis() {
        let h = Hypothesis::new("arsenal-fc", "Digital Transformation", "Arsenal seeks a partner", 0.6);
        assert_eq!(h.id, "hyp_arsenal_fc_digital_transformation");
        assert_eq!(h.current_confidence, 0.6);
        assert!(h.is_active());
        assert_eq!(h.evidence_count, 0);
    }

    #[test]
    fn test_category_key_collisions() {
        assert_eq!(Hypothesis::category_key("Data & Analytics"), "data_analytics");
        assert_eq!(
            Hypothesis::category_key("Data & Analytics"),
            Hypothesis::category_key("data analytics")
        );
        assert_eq!(Hypothesis::category_key("&&"), "");
        assert_eq!(
            Hypothesis::id_for("arsenal", "Data Analytics"),
            Hypothesis::new("arsenal", "Data & Analytics", "x", 0.5).id
        );
    }

    #[test]
    fn test_prior_clamped() {
        let h = Hypothesis::new("e", "c", "s", 1.4);
        assert_eq!(h.prior_confidence, 1.0);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!HypothesisStatus::Active.is_terminal());
        assert!(HypothesisStatus::Accepted.is_terminal());
        assert!(HypothesisStatus::Rejected.is_terminal());
        assert!(HypothesisStatus::Saturated.is_terminal());
    }
}
