//! Pass 2: holistic re-validation by the evaluator.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use bidscout_agent::EvidenceEvaluator;
use bidscout_model::{CandidateSignal, Verdict};

/// Runs evaluator re-validation under a concurrency cap.
pub struct Revalidator {
    evaluator: Arc<dyn EvidenceEvaluator>,
    semaphore: Arc<Semaphore>,
}

impl Revalidator {
    /// Create with at most `concurrency` evaluator calls in flight.
    pub fn new(evaluator: Arc<dyn EvidenceEvaluator>, concurrency: usize) -> Self {
        Self {
            evaluator,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Re-validate one candidate. Evaluator failure is a rejection.
    pub async fn check(&self, signal: &CandidateSignal) -> Result<(), String> {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return Err("re-validation unavailable: limiter closed".to_string()),
        };

        match self.evaluator.validate(signal).await {
            Ok(verdict) if verdict.verdict == Verdict::Pass => {
                debug!(signal_id = %signal.id, "Re-validation passed");
                Ok(())
            }
            Ok(verdict) => Err(verdict
                .reason
                .unwrap_or_else(|| "rejected on re-validation".to_string())),
            Err(e) => {
                warn!(signal_id = %signal.id, error = %e, "Re-validation failed");
                Err(format!("re-validation error: {}", e))
            }
        }
    }

    /// Re-validate a batch; results are in input order.
    pub async fn check_all(&self, signals: &[CandidateSignal]) -> Vec<Result<(), String>> {
        join_all(signals.iter().map(|s| self.check(s))).await
    }
}
