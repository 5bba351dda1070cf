//! Candidate and validated signals, and the Ralph validation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "typescript")]
use ts_rs::TS;

use crate::evidence::EvidenceItem;

/// Type of procurement signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    /// Published request for proposal
    RfpDetected,
    /// Tender or procurement notice
    TenderNotice,
    /// Hiring for a role that implies a buying project
    Hiring,
    /// New partnership or vendor relationship
    Partnership,
    /// Adoption of a new technology or platform
    TechnologyAdoption,
    /// Leadership change in a buying function
    ExecutiveChange,
}

impl SignalType {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RfpDetected => "RFP_DETECTED",
            Self::TenderNotice => "TENDER_NOTICE",
            Self::Hiring => "HIRING",
            Self::Partnership => "PARTNERSHIP",
            Self::TechnologyAdoption => "TECHNOLOGY_ADOPTION",
            Self::ExecutiveChange => "EXECUTIVE_CHANGE",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "RFP_DETECTED" | "RFP" => Ok(Self::RfpDetected),
            "TENDER_NOTICE" | "TENDER" => Ok(Self::TenderNotice),
            "HIRING" | "JOB_POSTING" => Ok(Self::Hiring),
            "PARTNERSHIP" => Ok(Self::Partnership),
            "TECHNOLOGY_ADOPTION" | "TECHNOLOGY" => Ok(Self::TechnologyAdoption),
            "EXECUTIVE_CHANGE" => Ok(Self::ExecutiveChange),
            _ => Err(format!("Unknown signal type: {}", s)),
        }
    }
}

/// Deterministic signal id.
///
/// SHA-256 over the identifying fields, hex-encoded and truncated to 128 bits.
pub fn signal_id(
    entity_id: &str,
    hypothesis_id: &str,
    category: &str,
    signal_type: SignalType,
    description: &str,
) -> String {
    let mut hasher = Sha256::new();
    for part in [entity_id, hypothesis_id, category, signal_type.as_str(), description.trim()] {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    let digest = hasher.finalize();
    format!("sig_{}", hex::encode(&digest[..16]))
}

/// A signal emitted by an accepted hypothesis, pending validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSignal {
    /// Deterministic signal ID
    pub id: String,
    /// Entity the signal is about
    pub entity_id: String,
    /// Hypothesis that emitted the signal
    pub hypothesis_id: String,
    /// Type of signal
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    /// Signal category
    pub category: String,
    /// Short description
    pub description: String,
    /// Confidence of the emitting hypothesis at acceptance
    pub confidence: f64,
    /// Supporting evidence bundle
    pub evidence: Vec<EvidenceItem>,
    /// When the candidate was emitted
    pub detected_at: DateTime<Utc>,
}

impl CandidateSignal {
    /// Create a candidate; the id is derived from the identifying fields.
    pub fn new(
        entity_id: impl Into<String>,
        hypothesis_id: impl Into<String>,
        signal_type: SignalType,
        category: impl Into<String>,
        description: impl Into<String>,
        confidence: f64,
        evidence: Vec<EvidenceItem>,
    ) -> Self {
        let entity_id = entity_id.into();
        let hypothesis_id = hypothesis_id.into();
        let category = category.into();
        let description = description.into();
        Self {
            id: signal_id(&entity_id, &hypothesis_id, &category, signal_type, &description),
            entity_id,
            hypothesis_id,
            signal_type,
            category,
            description,
            confidence: confidence.clamp(0.0, 1.0),
            evidence,
            detected_at: Utc::now(),
        }
    }

    /// Mean credibility of the evidence bundle (0.0 when empty).
    pub fn mean_credibility(&self) -> f64 {
        if self.evidence.is_empty() {
            return 0.0;
        }
        self.evidence.iter().map(|e| e.credibility_score).sum::<f64>() / self.evidence.len() as f64
    }
}

/// The three Ralph validation passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum RalphPass {
    /// Pass 1: rule-based filter
    RuleFilter = 1,
    /// Pass 2: holistic LLM re-validation
    LlmRevalidation = 2,
    /// Pass 3: final consistency confirmation
    FinalConfirmation = 3,
}

impl RalphPass {
    /// Passes in execution order.
    pub const ORDER: [RalphPass; 3] = [
        RalphPass::RuleFilter,
        RalphPass::LlmRevalidation,
        RalphPass::FinalConfirmation,
    ];

    /// Pass number (1 - 3).
    pub fn number(&self) -> u8 {
        *self as u8
    }
}

/// Verdict of a validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    Reject,
}

/// Outcome of one validation pass for one signal.
///
/// `reason` is present exactly when the verdict is `Reject`; the
/// constructors are the only way to build a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// Signal validated
    pub signal_id: String,
    /// Pass that produced the record
    pub pass_number: RalphPass,
    /// Verdict
    pub verdict: Verdict,
    /// Rejection reason
    reason: Option<String>,
    /// When the pass ran
    pub recorded_at: DateTime<Utc>,
}

impl ValidationRecord {
    /// A PASS record.
    pub fn pass(signal_id: impl Into<String>, pass: RalphPass) -> Self {
        Self {
            signal_id: signal_id.into(),
            pass_number: pass,
            verdict: Verdict::Pass,
            reason: None,
            recorded_at: Utc::now(),
        }
    }

    /// A REJECT record with its reason.
    pub fn reject(signal_id: impl Into<String>, pass: RalphPass, reason: impl Into<String>) -> Self {
        Self {
            signal_id: signal_id.into(),
            pass_number: pass,
            verdict: Verdict::Reject,
            reason: Some(reason.into()),
            recorded_at: Utc::now(),
        }
    }

    /// Rejection reason, if rejected.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Whether the record is a PASS.
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

/// A candidate signal that cleared all three Ralph passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedSignal {
    signal: CandidateSignal,
    records: Vec<ValidationRecord>,
    validated_at: DateTime<Utc>,
}

impl ValidatedSignal {
    /// Promote a candidate given its validation records.
    ///
    /// Returns `None` unless `records` is exactly passes 1, 2, 3 in order,
    /// all PASS, all for this signal.
    pub fn from_records(signal: CandidateSignal, records: Vec<ValidationRecord>) -> Option<Self> {
        if records.len() != RalphPass::ORDER.len() {
            return None;
        }
        let complete = records.iter().zip(RalphPass::ORDER).all(|(record, pass)| {
            record.passed() && record.pass_number == pass && record.signal_id == signal.id
        });
        if !complete {
            return None;
        }
        Some(Self {
            signal,
            records,
            validated_at: Utc::now(),
        })
    }

    /// The underlying candidate.
    pub fn signal(&self) -> &CandidateSignal {
        &self.signal
    }

    /// The three PASS records.
    pub fn records(&self) -> &[ValidationRecord] {
        &self.records
    }

    /// When the third pass completed.
    pub fn validated_at(&self) -> DateTime<Utc> {
        self.validated_at
    }

    /// Signal id.
    pub fn id(&self) -> &str {
        &self.signal.id
    }
}
