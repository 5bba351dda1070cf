//! Pass 1: rule-based filter.
//!
//! Cheap structural checks on the evidence bundle. Runs on every candidate
//! before any evaluator call is spent.

use bidscout_model::CandidateSignal;

use crate::config::RalphConfig;

/// Evidence, confidence and credibility floors.
pub struct RuleFilter {
    min_evidence: usize,
    min_confidence: f64,
    credibility_floor: f64,
}

impl RuleFilter {
    /// Create from validation config.
    pub fn new(config: &RalphConfig) -> Self {
        Self {
            min_evidence: config.min_evidence,
            min_confidence: config.min_confidence,
            credibility_floor: config.credibility_floor,
        }
    }

    /// `Err(reason)` for the first rule the candidate breaks.
    pub fn check(&self, signal: &CandidateSignal) -> Result<(), String> {
        if signal.evidence.len() < self.min_evidence {
            return Err(format!(
                "insufficient evidence: {} items, {} required",
                signal.evidence.len(),
                self.min_evidence
            ));
        }

        if signal.confidence < self.min_confidence {
            return Err(format!(
                "confidence {:.3} below minimum {:.3}",
                signal.confidence, self.min_confidence
            ));
        }

        let mean = signal.mean_credibility();
        if mean < self.credibility_floor {
            return Err(format!(
                "mean source credibility {:.3} below floor {:.3}",
                mean, self.credibility_floor
            ));
        }

        let item_floor = self.credibility_floor / 2.0;
        if let Some(weak) = signal.evidence.iter().find(|e| e.credibility_score < item_floor) {
            return Err(format!(
                "source {} credibility {:.3} below {:.3}",
                weak.source, weak.credibility_score, item_floor
            ));
        }

        Ok(())
    }
}
