//! Stopping Controller.
//!
//! Saturates hypotheses that have run out of budget or progress, and decides
//! when exploration of an entity ends.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use bidscout_model::{Hypothesis, HypothesisStatus};

use crate::config::DiscoveryConfig;

/// Why exploration of an entity ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every hypothesis reached a terminal status
    AllTerminal,
    /// The per-entity iteration cap was hit
    EntityIterationCap,
    /// Cancellation was requested
    Cancelled,
}

impl StopReason {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllTerminal => "all_terminal",
            Self::EntityIterationCap => "entity_iteration_cap",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies the per-hypothesis and per-entity stopping rules.
pub struct StoppingController {
    config: DiscoveryConfig,
}

impl StoppingController {
    /// Create a controller.
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Saturate an active hypothesis that hit its iteration budget or its
    /// no-progress limit. Returns whether the status changed.
    pub fn check_hypothesis(&self, hypothesis: &mut Hypothesis) -> bool {
        if !hypothesis.is_active() {
            return false;
        }

        let exhausted = hypothesis.iteration_count >= self.config.max_iterations;
        let stalled = hypothesis.consecutive_no_progress >= self.config.no_progress_limit;
        if !(exhausted || stalled) {
            return false;
        }

        hypothesis.status = HypothesisStatus::Saturated;
        info!(
            hypothesis_id = %hypothesis.id,
            iterations = hypothesis.iteration_count,
            no_progress = hypothesis.consecutive_no_progress,
            confidence = hypothesis.current_confidence,
            "Hypothesis saturated"
        );
        true
    }

    /// Whether the entity's exploration loop should end.
    pub fn should_stop(
        &self,
        hypotheses: &[Hypothesis],
        entity_iterations: u32,
        cancelled: bool,
    ) -> Option<StopReason> {
        if cancelled {
            return Some(StopReason::Cancelled);
        }
        if hypotheses.iter().all(Hypothesis::is_terminal) {
            return Some(StopReason::AllTerminal);
        }
        if entity_iterations >= self.config.max_entity_iterations {
            return Some(StopReason::EntityIterationCap);
        }
        None
    }
}
