//! Per-entity discovery runner.
//!
//! One entity's run is a loop over
//! select → plan → fetch → evaluate → accumulate → stop-check,
//! followed by validation, sink writes and banding. All run state lives in
//! an explicit `DiscoveryState` so a cancelled run can be resumed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use bidscout_agent::EvidenceEvaluator;
use bidscout_model::{
    CandidateSignal, ConfidenceBand, Entity, HopAttempt, Hypothesis, HypothesisStatus,
};

use crate::accumulator::{ConfidenceAccumulator, HopContext, HopEvent};
use crate::bander::ConfidenceBander;
use crate::config::{CategoryPrior, EngineConfig};
use crate::fetcher::EvidenceFetcher;
use crate::query::{HopOutcome, QueryGenerator};
use crate::ralph::{RalphPipeline, RejectLedger, ValidationReport};
use crate::selector::{HopSelector, Selection};
use crate::sink::{Episode, SinkWriter, WriteOutcome};
use crate::stopping::{StopReason, StoppingController};
use crate::types::{CancellationFlag, Result};

/// Everything known about one entity's exploration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryState {
    /// Entity explored
    pub entity: Entity,
    /// One hypothesis per configured category
    pub hypotheses: Vec<Hypothesis>,
    /// Every hop attempt, in order
    pub attempts: Vec<HopAttempt>,
    /// Categories seen in accepted evidence
    pub seen_categories: BTreeSet<String>,
    /// Categories of hypotheses the evaluator rejected
    pub rejected_categories: BTreeSet<String>,
    /// Hops run for this entity
    pub entity_iterations: u32,
    /// Why exploration last stopped
    pub stop_reason: Option<StopReason>,
    /// When exploration began
    pub started_at: DateTime<Utc>,
}

impl DiscoveryState {
    /// Fresh state with one active hypothesis per category prior.
    pub fn seed(entity: Entity, categories: &[CategoryPrior]) -> Self {
        let hypotheses = categories
            .iter()
            .map(|c| Hypothesis::new(entity.id.clone(), c.name.clone(), c.statement_for(&entity.name), c.prior))
            .collect();

        Self {
            entity,
            hypotheses,
            attempts: Vec::new(),
            seen_categories: BTreeSet::new(),
            rejected_categories: BTreeSet::new(),
            entity_iterations: 0,
            stop_reason: None,
            started_at: Utc::now(),
        }
    }

    /// Mean prior of the entity's hypotheses (0.0 when there are none).
    pub fn entity_prior(&self) -> f64 {
        if self.hypotheses.is_empty() {
            return 0.0;
        }
        self.hypotheses.iter().map(|h| h.prior_confidence).sum::<f64>() / self.hypotheses.len() as f64
    }

    /// Look up a hypothesis.
    pub fn hypothesis(&self, id: &str) -> Option<&Hypothesis> {
        self.hypotheses.iter().find(|h| h.id == id)
    }

    /// Hypotheses with a given status.
    pub fn count_status(&self, status: HypothesisStatus) -> usize {
        self.hypotheses.iter().filter(|h| h.status == status).count()
    }

    /// Candidate signals: one per distinct finding of each accepted
    /// hypothesis, in first-seen order.
    ///
    /// A finding repeated across hops yields the same signal id and is
    /// validated once.
    pub fn candidates(&self) -> Vec<CandidateSignal> {
        let mut seen = HashSet::new();
        self.hypotheses
            .iter()
            .filter(|h| h.status == HypothesisStatus::Accepted)
            .flat_map(|h| {
                h.findings.iter().map(move |f| {
                    CandidateSignal::new(
                        h.entity_id.clone(),
                        h.id.clone(),
                        f.signal_type,
                        f.category.clone(),
                        f.description.clone(),
                        h.current_confidence,
                        h.evidence.clone(),
                    )
                })
            })
            .filter(|c| seen.insert(c.id.clone()))
            .collect()
    }
}

/// Outcome of one entity's run.
#[derive(Debug, Clone)]
pub struct EntityRun {
    /// Final discovery state
    pub state: DiscoveryState,
    /// Why exploration stopped
    pub stop_reason: StopReason,
    /// Validation records and survivors
    pub validation: ValidationReport,
    /// Entity band over validated signals
    pub band: ConfidenceBand,
    /// Episodes stored by the sink
    pub episodes_written: usize,
    /// Episodes waiting in the outbox
    pub episodes_queued: usize,
}

impl EntityRun {
    /// Entity id.
    pub fn entity_id(&self) -> &str {
        &self.state.entity.id
    }

    /// Whether the run was cut short by cancellation.
    pub fn cancelled(&self) -> bool {
        self.stop_reason == StopReason::Cancelled
    }
}

/// Runs discovery for single entities.
pub struct DiscoveryEngine {
    config: EngineConfig,
    fetcher: Arc<dyn EvidenceFetcher>,
    evaluator: Arc<dyn EvidenceEvaluator>,
    sink: SinkWriter,
    queries: QueryGenerator,
    selector: HopSelector,
    accumulator: ConfidenceAccumulator,
    stopping: StoppingController,
    ralph: RalphPipeline,
    bander: ConfidenceBander,
}

impl DiscoveryEngine {
    /// Create an engine. The configuration is validated here, before any
    /// entity runs.
    pub fn new(
        config: EngineConfig,
        fetcher: Arc<dyn EvidenceFetcher>,
        evaluator: Arc<dyn EvidenceEvaluator>,
        sink: SinkWriter,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            queries: QueryGenerator::new(&config.query),
            selector: HopSelector::new(config.selector.clone(), &config.categories),
            accumulator: ConfidenceAccumulator::new(config.accumulator.clone()),
            stopping: StoppingController::new(config.discovery.clone()),
            ralph: RalphPipeline::new(&config.ralph, Arc::clone(&evaluator)),
            bander: ConfidenceBander::new(config.banding.clone()),
            config,
            fetcher,
            evaluator,
            sink,
        })
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The sink writer (shared outbox).
    pub fn sink(&self) -> &SinkWriter {
        &self.sink
    }

    /// Run discovery for an entity from fresh hypotheses.
    pub async fn run_entity(&self, entity: &Entity, cancel: &CancellationFlag) -> EntityRun {
        let state = DiscoveryState::seed(entity.clone(), &self.config.categories);
        info!(
            entity_id = %entity.id,
            entity = %entity.name,
            hypotheses = state.hypotheses.len(),
            "Starting discovery"
        );
        self.resume(state, cancel).await
    }

    /// Continue discovery from saved state.
    ///
    /// A cancelled run returns its state with no validation or sink writes;
    /// the band is computed over an empty validated set.
    pub async fn resume(&self, mut state: DiscoveryState, cancel: &CancellationFlag) -> EntityRun {
        state.stop_reason = None;
        let stop_reason = self.explore(&mut state, cancel).await;

        if stop_reason == StopReason::Cancelled {
            info!(
                entity_id = %state.entity.id,
                iterations = state.entity_iterations,
                "Discovery cancelled, state preserved"
            );
            let band = self.bander.band(&state.entity.id, state.entity_prior(), &[]);
            return EntityRun {
                state,
                stop_reason,
                validation: ValidationReport::default(),
                band,
                episodes_written: 0,
                episodes_queued: 0,
            };
        }

        self.finalize(state, stop_reason).await
    }

    /// Hop loop until the stopping controller ends it.
    async fn explore(&self, state: &mut DiscoveryState, cancel: &CancellationFlag) -> StopReason {
        loop {
            if let Some(reason) =
                self.stopping
                    .should_stop(&state.hypotheses, state.entity_iterations, cancel.is_cancelled())
            {
                state.stop_reason = Some(reason);
                debug!(entity_id = %state.entity.id, reason = %reason, "Exploration stopped");
                return reason;
            }

            self.selector.refresh_eig(&mut state.hypotheses);
            let Some(selection) = self.selector.select_next(&state.hypotheses, &state.attempts) else {
                state.stop_reason = Some(StopReason::AllTerminal);
                return StopReason::AllTerminal;
            };

            self.step(state, &selection).await;
            state.entity_iterations += 1;
        }
    }

    /// Run one hop for the selected hypothesis and commit its result.
    async fn step(&self, state: &mut DiscoveryState, selection: &Selection) {
        let Some(index) = state.hypotheses.iter().position(|h| h.id == selection.hypothesis_id) else {
            return;
        };
        let hop = selection.hop_type;
        let outcome = self
            .queries
            .run_hop(self.fetcher.as_ref(), hop, &state.entity.name)
            .await;

        let hypothesis = &state.hypotheses[index];
        let (ctx, events) = match outcome {
            HopOutcome::Content { query, url, content, chars } => {
                let events = match self.evaluator.evaluate(hypothesis, &content).await {
                    Ok(evaluation) => HopEvent::from_evaluation(&evaluation, hypothesis, &content),
                    Err(e) => {
                        warn!(
                            hypothesis_id = %hypothesis.id,
                            hop = %hop,
                            url = %url,
                            error = %e,
                            "Evaluation failed, recording no progress"
                        );
                        Vec::new()
                    }
                };
                let ctx = HopContext {
                    hop_type: hop,
                    query,
                    source_url: url,
                    chars_fetched: chars,
                    timestamp: Utc::now(),
                };
                (ctx, events)
            }
            HopOutcome::NoProgress { query, reason } => {
                debug!(hypothesis_id = %hypothesis.id, hop = %hop, reason = %reason, "Hop found nothing");
                let ctx = HopContext {
                    hop_type: hop,
                    query,
                    source_url: String::new(),
                    chars_fetched: 0,
                    timestamp: Utc::now(),
                };
                (ctx, Vec::new())
            }
        };

        let update = self
            .accumulator
            .apply_hop(hypothesis, &events, &ctx, &state.seen_categories);

        if update.rejected() {
            state.rejected_categories.insert(update.hypothesis.category.clone());
        }
        state.hypotheses[index] = update.hypothesis;
        state.attempts.extend(update.attempts);
        state.seen_categories = update.seen_categories;

        self.stopping.check_hypothesis(&mut state.hypotheses[index]);
    }

    /// Validate candidates, write survivors and band the entity.
    async fn finalize(&self, state: DiscoveryState, stop_reason: StopReason) -> EntityRun {
        let entity_id = state.entity.id.clone();
        let candidates = state.candidates();
        let mut ledger = RejectLedger::for_entity(&entity_id, &state.rejected_categories);
        let validation = self.ralph.validate(candidates, &mut ledger).await;

        let mut episodes_written = 0;
        let mut episodes_queued = 0;
        for validated in &validation.validated {
            match self.sink.write(Episode::from_validated(validated)).await {
                Ok(WriteOutcome::Written(_)) => episodes_written += 1,
                Ok(WriteOutcome::Queued) => episodes_queued += 1,
                Err(e) => warn!(
                    entity_id = %entity_id,
                    signal_id = %validated.id(),
                    error = %e,
                    "Episode write failed"
                ),
            }
        }

        let band = self.bander.band(&entity_id, state.entity_prior(), &validation.validated);
        info!(
            entity_id = %entity_id,
            stop_reason = %stop_reason,
            iterations = state.entity_iterations,
            accepted = state.count_status(HypothesisStatus::Accepted),
            rejected = state.count_status(HypothesisStatus::Rejected),
            saturated = state.count_status(HypothesisStatus::Saturated),
            validated = validation.validated.len(),
            band = %band.band,
            final_confidence = band.final_confidence,
            "Discovery complete"
        );

        EntityRun {
            state,
            stop_reason,
            validation,
            band,
            episodes_written,
            episodes_queued,
        }
    }
}
