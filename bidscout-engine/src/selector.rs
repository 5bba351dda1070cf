//! Hop Selector - the exploration policy.
//!
//! Ranks active hypotheses by expected information gain and picks a hop
//! type for the winner. Deterministic for a given state.

use std::cmp::Ordering;
use std::collections::HashMap;

use bidscout_model::{HopAttempt, HopType, Hypothesis};

use crate::config::{CategoryPrior, SelectorConfig};

/// EIG values closer than this are treated as equal.
const EIG_QUANTUM: f64 = 1e-6;

/// Expected information gain of one more observation.
///
/// `eig = 4p(1-p) * (1 + v) / (1 + damping * n)`: highest for uncertain
/// confidence, high-variance categories and thin evidence.
pub fn expected_information_gain(confidence: f64, variance: f64, evidence_count: usize, damping: f64) -> f64 {
    let p = confidence.clamp(0.0, 1.0);
    let uncertainty = 4.0 * p * (1.0 - p);
    uncertainty * (1.0 + variance.clamp(0.0, 1.0)) / (1.0 + damping.max(0.0) * evidence_count as f64)
}

/// The chosen (hypothesis, hop type) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Hypothesis to pursue
    pub hypothesis_id: String,
    /// Hop type to run
    pub hop_type: HopType,
}

/// Per-hop-type attempt history for one hypothesis.
#[derive(Debug, Clone, Copy, Default)]
struct HopHistory {
    attempts: usize,
    productive: usize,
}

/// Chooses the next hop.
pub struct HopSelector {
    config: SelectorConfig,
    variances: HashMap<String, f64>,
}

impl HopSelector {
    /// Create a selector with category variance priors.
    pub fn new(config: SelectorConfig, categories: &[CategoryPrior]) -> Self {
        Self {
            variances: categories.iter().map(|c| (c.name.clone(), c.variance)).collect(),
            config,
        }
    }

    fn variance(&self, category: &str) -> f64 {
        self.variances
            .get(category)
            .copied()
            .unwrap_or(self.config.default_variance)
    }

    /// EIG of a hypothesis under this selector's priors.
    pub fn eig(&self, hypothesis: &Hypothesis) -> f64 {
        expected_information_gain(
            hypothesis.current_confidence,
            self.variance(&hypothesis.category),
            hypothesis.evidence_count,
            self.config.damping,
        )
    }

    /// Recompute and store EIG on every active hypothesis.
    pub fn refresh_eig(&self, hypotheses: &mut [Hypothesis]) {
        for hypothesis in hypotheses.iter_mut().filter(|h| h.is_active()) {
            hypothesis.eig = self.eig(hypothesis);
        }
    }

    /// Pick the next (hypothesis, hop type), or `None` when nothing is active.
    ///
    /// Ranking: EIG descending, then hypotheses with an untried hop type,
    /// then hypothesis id.
    pub fn select_next(&self, hypotheses: &[Hypothesis], attempts: &[HopAttempt]) -> Option<Selection> {
        let histories = history_by_hypothesis(attempts);
        let empty = HashMap::new();

        let best = hypotheses
            .iter()
            .filter(|h| h.is_active())
            .map(|h| {
                let history = histories.get(h.id.as_str()).unwrap_or(&empty);
                let quantized = (self.eig(h) / EIG_QUANTUM).round() as i64;
                let has_untried = HopType::ALL.iter().any(|hop| !history.contains_key(hop));
                (h, history, quantized, has_untried)
            })
            .min_by(|a, b| {
                b.2.cmp(&a.2)
                    .then_with(|| b.3.cmp(&a.3))
                    .then_with(|| a.0.id.cmp(&b.0.id))
            })?;

        let (hypothesis, history, _, _) = best;
        Some(Selection {
            hypothesis_id: hypothesis.id.clone(),
            hop_type: choose_hop(history),
        })
    }
}

fn history_by_hypothesis(attempts: &[HopAttempt]) -> HashMap<&str, HashMap<HopType, HopHistory>> {
    let mut histories: HashMap<&str, HashMap<HopType, HopHistory>> = HashMap::new();
    for attempt in attempts {
        let entry = histories
            .entry(attempt.hypothesis_id.as_str())
            .or_default()
            .entry(attempt.hop_type)
            .or_default();
        entry.attempts += 1;
        if attempt.decision.is_positive() {
            entry.productive += 1;
        }
    }
    histories
}

/// First untried hop type; otherwise most productive, then least tried.
fn choose_hop(history: &HashMap<HopType, HopHistory>) -> HopType {
    if let Some(untried) = HopType::ALL.iter().find(|hop| !history.contains_key(*hop)) {
        return *untried;
    }

    let mut best = HopType::ALL[0];
    let mut best_stats = history.get(&best).copied().unwrap_or_default();
    for hop in HopType::ALL.iter().skip(1) {
        let stats = history.get(hop).copied().unwrap_or_default();
        let better = match stats.productive.cmp(&best_stats.productive) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => stats.attempts < best_stats.attempts,
        };
        if better {
            best = *hop;
            best_stats = stats;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidscout_model::Decision;
    use chrono::Utc;

    fn selector() -> HopSelector {
        HopSelector::new(
            SelectorConfig::default(),
            &[
                CategoryPrior::new("CRM", "{entity} buys CRM", 0.6, 0.6),
                CategoryPrior::new("Ticketing", "{entity} buys ticketing", 0.6, 0.2),
            ],
        )
    }

    fn attempt(hypothesis_id: &str, hop_type: HopType, decision: Decision) -> HopAttempt {
        HopAttempt {
            hypothesis_id: hypothesis_id.to_string(),
            hop_type,
            query: String::new(),
            source_url: String::new(),
            chars_fetched: 0,
            decision,
            confidence_delta: 0.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_eig_shape() {
        let at_half = expected_information_gain(0.5, 0.5, 0, 0.25);
        let confident = expected_information_gain(0.9, 0.5, 0, 0.25);
        let evidenced = expected_information_gain(0.5, 0.5, 8, 0.25);
        assert!((at_half - 1.5).abs() < 1e-12);
        assert!(confident < at_half);
        assert!(evidenced < at_half);
        assert_eq!(expected_information_gain(1.0, 0.5, 0, 0.25), 0.0);
    }

    #[test]
    fn test_higher_variance_category_wins() {
        let hypotheses = vec![
            Hypothesis::new("arsenal", "Ticketing", "t", 0.6),
            Hypothesis::new("arsenal", "CRM", "c", 0.6),
        ];
        let selection = selector().select_next(&hypotheses, &[]).unwrap();
        assert_eq!(selection.hypothesis_id, "hyp_arsenal_crm");
        assert_eq!(selection.hop_type, HopType::ALL[0]);
    }

    #[test]
    fn test_ties_prefer_untried_then_id() {
        let hypotheses = vec![
            Hypothesis::new("arsenal", "CRM", "c", 0.6),
            Hypothesis::new("chelsea", "CRM", "c", 0.6),
        ];
        let attempts: Vec<HopAttempt> = HopType::ALL
            .iter()
            .map(|hop| attempt("hyp_arsenal_crm", *hop, Decision::NoProgress))
            .collect();

        let selection = selector().select_next(&hypotheses, &attempts).unwrap();
        assert_eq!(selection.hypothesis_id, "hyp_chelsea_crm");

        let selection = selector().select_next(&hypotheses, &[]).unwrap();
        assert_eq!(selection.hypothesis_id, "hyp_arsenal_crm");
    }

    #[test]
    fn test_novelty_before_repetition() {
        let hypotheses = vec![Hypothesis::new("arsenal", "CRM", "c", 0.6)];
        let attempts = vec![attempt("hyp_arsenal_crm", HopType::ALL[0], Decision::Accept)];

        let selection = selector().select_next(&hypotheses, &attempts).unwrap();
        assert_eq!(selection.hop_type, HopType::ALL[1]);
    }

    #[test]
    fn test_all_tried_prefers_productive() {
        let mut attempts: Vec<HopAttempt> = HopType::ALL
            .iter()
            .map(|hop| attempt("h", *hop, Decision::NoProgress))
            .collect();
        attempts.push(attempt("h", HopType::PressRelease, Decision::WeakAccept));

        let history = history_by_hypothesis(&attempts);
        assert_eq!(choose_hop(&history["h"]), HopType::PressRelease);
    }

    #[test]
    fn test_none_when_nothing_active() {
        let mut hypothesis = Hypothesis::new("arsenal", "CRM", "c", 0.6);
        hypothesis.status = bidscout_model::HypothesisStatus::Saturated;
        assert!(selector().select_next(&[hypothesis], &[]).is_none());
    }

    #[test]
    fn test_deterministic() {
        let hypotheses = vec![
            Hypothesis::new("arsenal", "CRM", "c", 0.55),
            Hypothesis::new("arsenal", "Ticketing", "t", 0.7),
        ];
        let first = selector().select_next(&hypotheses, &[]);
        for _ in 0..10 {
            assert_eq!(selector().select_next(&hypotheses, &[]), first);
        }
    }
}
