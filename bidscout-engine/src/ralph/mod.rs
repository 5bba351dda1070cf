//! Ralph - three-pass validation gate.
//!
//! Every candidate signal must clear all three passes before it may be
//! written to the knowledge sink:
//!
//! 1. **Rule filter**: evidence count, confidence and credibility floors
//! 2. **Re-validation**: the evaluator re-examines the full evidence bundle
//! 3. **Final confirmation**: no contradicting rejection, no duplicate
//!
//! Passes are staged by cost: Pass 1 runs on the whole batch before any
//! evaluator call, and only Pass 1 survivors reach Pass 2. A rejection at any
//! pass is terminal for the signal and is recorded with its reason.

mod confirm;
mod revalidate;
mod rules;

pub use confirm::{FinalConfirmation, RejectLedger};
pub use revalidate::Revalidator;
pub use rules::RuleFilter;

use std::sync::Arc;
use tracing::{info, warn};

use bidscout_agent::EvidenceEvaluator;
use bidscout_model::{CandidateSignal, RalphPass, ValidatedSignal, ValidationRecord};

use crate::config::RalphConfig;

/// Outcome of validating one batch.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Every record produced, grouped by pass
    pub records: Vec<ValidationRecord>,
    /// Signals that cleared all three passes, in batch order
    pub validated: Vec<ValidatedSignal>,
}

impl ValidationReport {
    /// Rejections recorded at a pass.
    pub fn rejected_at(&self, pass: RalphPass) -> usize {
        self.records
            .iter()
            .filter(|r| r.pass_number == pass && !r.passed())
            .count()
    }

    /// Records attempted at a pass.
    pub fn attempted_at(&self, pass: RalphPass) -> usize {
        self.records.iter().filter(|r| r.pass_number == pass).count()
    }

    /// Records for one signal, in pass order.
    pub fn records_for(&self, signal_id: &str) -> Vec<&ValidationRecord> {
        self.records.iter().filter(|r| r.signal_id == signal_id).collect()
    }
}

/// The validation gate.
pub struct RalphPipeline {
    rules: RuleFilter,
    revalidator: Revalidator,
}

impl RalphPipeline {
    /// Create a pipeline; Pass 2 uses the given evaluator.
    pub fn new(config: &RalphConfig, evaluator: Arc<dyn EvidenceEvaluator>) -> Self {
        Self {
            rules: RuleFilter::new(config),
            revalidator: Revalidator::new(evaluator, config.pass2_concurrency),
        }
    }

    /// Validate a batch of candidates.
    ///
    /// Pass 1 and Pass 2 rejections are added to `ledger`, so later
    /// candidates of a rejected `(entity, category)` fail Pass 3.
    pub async fn validate(
        &self,
        candidates: Vec<CandidateSignal>,
        ledger: &mut RejectLedger,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();
        let total = candidates.len();
        // Trails are indexed by batch position; duplicate ids must not share one
        let mut trails: Vec<Vec<ValidationRecord>> = vec![Vec::new(); total];

        let mut survivors = Vec::with_capacity(total);
        for (index, signal) in candidates.into_iter().enumerate() {
            let record = match self.rules.check(&signal) {
                Ok(()) => ValidationRecord::pass(signal.id.clone(), RalphPass::RuleFilter),
                Err(reason) => {
                    ledger.record(&signal.entity_id, &signal.category);
                    ValidationRecord::reject(signal.id.clone(), RalphPass::RuleFilter, reason)
                }
            };
            if record.passed() {
                survivors.push((index, signal));
            }
            keep(&mut report, &mut trails[index], record);
        }

        let signals: Vec<CandidateSignal> = survivors.iter().map(|(_, s)| s.clone()).collect();
        let verdicts = self.revalidator.check_all(&signals).await;
        let mut confirmed = Vec::with_capacity(survivors.len());
        for ((index, signal), verdict) in survivors.into_iter().zip(verdicts) {
            let record = match verdict {
                Ok(()) => ValidationRecord::pass(signal.id.clone(), RalphPass::LlmRevalidation),
                Err(reason) => {
                    ledger.record(&signal.entity_id, &signal.category);
                    ValidationRecord::reject(signal.id.clone(), RalphPass::LlmRevalidation, reason)
                }
            };
            if record.passed() {
                confirmed.push((index, signal));
            }
            keep(&mut report, &mut trails[index], record);
        }

        let mut confirmation = FinalConfirmation::new(ledger);
        for (index, signal) in confirmed {
            let record = match confirmation.check(&signal) {
                Ok(()) => ValidationRecord::pass(signal.id.clone(), RalphPass::FinalConfirmation),
                Err(reason) => ValidationRecord::reject(signal.id.clone(), RalphPass::FinalConfirmation, reason),
            };
            let passed = record.passed();
            keep(&mut report, &mut trails[index], record);
            if !passed {
                continue;
            }

            let signal_id = signal.id.clone();
            match ValidatedSignal::from_records(signal, std::mem::take(&mut trails[index])) {
                Some(validated) => report.validated.push(validated),
                None => warn!(signal_id = %signal_id, "Incomplete validation trail, signal dropped"),
            }
        }

        info!(
            candidates = total,
            pass1_rejected = report.rejected_at(RalphPass::RuleFilter),
            pass2_rejected = report.rejected_at(RalphPass::LlmRevalidation),
            pass3_rejected = report.rejected_at(RalphPass::FinalConfirmation),
            validated = report.validated.len(),
            "Validation complete"
        );
        report
    }
}

fn keep(report: &mut ValidationReport, trail: &mut Vec<ValidationRecord>, record: ValidationRecord) {
    if let Some(reason) = record.reason() {
        info!(
            signal_id = %record.signal_id,
            pass = record.pass_number.number(),
            reason = %reason,
            "Signal rejected"
        );
    }
    trail.push(record.clone());
    report.records.push(record);
}
