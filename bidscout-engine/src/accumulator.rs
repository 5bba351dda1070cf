//! Confidence Accumulator.
//!
//! Folds evaluator decisions into a hypothesis's confidence with bounded,
//! saturating deltas. A hop's evaluation is split into events (one per
//! finding) and each event is one accumulator call producing exactly one
//! `HopAttempt`. All mutations land on a working copy that the caller
//! commits once the whole hop has been processed.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{debug, info};

use bidscout_agent::Evaluation;
use bidscout_model::{
    Decision, EvidenceItem, Finding, HopAttempt, HopType, Hypothesis, HypothesisStatus, SignalType,
};

use crate::config::AccumulatorConfig;

/// Excerpt length taken from page content when the evaluator quotes nothing.
const EXCERPT_CHARS: usize = 280;

/// One unit of evaluator judgment.
#[derive(Debug, Clone, PartialEq)]
pub struct HopEvent {
    /// Decision for this event
    pub decision: Decision,
    /// Evaluator-suggested delta
    pub suggested_delta: f64,
    /// Signal category
    pub category: String,
    /// Signal type, if named
    pub signal_type: Option<SignalType>,
    /// Description of the finding
    pub description: String,
    /// Supporting text
    pub excerpt: String,
}

impl HopEvent {
    /// A bare decision in the hypothesis's own category.
    pub fn bare(decision: Decision, hypothesis: &Hypothesis) -> Self {
        Self {
            decision,
            suggested_delta: 0.0,
            category: hypothesis.category.clone(),
            signal_type: None,
            description: String::new(),
            excerpt: String::new(),
        }
    }

    /// Split an evaluation into events.
    ///
    /// A REJECT or an evaluation without items is a single event; otherwise
    /// there is one event per item.
    pub fn from_evaluation(evaluation: &Evaluation, hypothesis: &Hypothesis, content: &str) -> Vec<Self> {
        let fallback_excerpt: String = content.chars().take(EXCERPT_CHARS).collect();

        if evaluation.decision == Decision::Reject || evaluation.items.is_empty() {
            return vec![Self {
                decision: evaluation.decision,
                suggested_delta: evaluation.confidence_delta,
                category: hypothesis.category.clone(),
                signal_type: None,
                description: evaluation.reasoning.clone(),
                excerpt: fallback_excerpt,
            }];
        }

        evaluation
            .items
            .iter()
            .map(|item| Self {
                decision: item.decision,
                suggested_delta: item.confidence_delta,
                category: item.category.clone(),
                signal_type: item.signal_type,
                description: item.description.clone(),
                excerpt: if item.excerpt.is_empty() {
                    fallback_excerpt.clone()
                } else {
                    item.excerpt.clone()
                },
            })
            .collect()
    }
}

/// Where a hop's content came from.
#[derive(Debug, Clone, PartialEq)]
pub struct HopContext {
    /// Hop type run
    pub hop_type: HopType,
    /// Query used
    pub query: String,
    /// URL fetched (empty when nothing was fetched)
    pub source_url: String,
    /// Characters fetched
    pub chars_fetched: usize,
    /// When the hop ran; shared by all its attempts
    pub timestamp: DateTime<Utc>,
}

/// Uncommitted result of one hop.
#[derive(Debug, Clone)]
pub struct HopUpdate {
    /// Working copy of the hypothesis
    pub hypothesis: Hypothesis,
    /// One attempt per event
    pub attempts: Vec<HopAttempt>,
    /// Entity categories seen in accepted evidence, including this hop
    pub seen_categories: BTreeSet<String>,
}

impl HopUpdate {
    /// Whether the hop moved the hypothesis into REJECTED.
    pub fn rejected(&self) -> bool {
        self.hypothesis.status == HypothesisStatus::Rejected
    }
}

/// Applies the bounded update rule.
pub struct ConfidenceAccumulator {
    config: AccumulatorConfig,
}

impl ConfidenceAccumulator {
    /// Create an accumulator.
    pub fn new(config: AccumulatorConfig) -> Self {
        Self { config }
    }

    /// Largest change any single call may make.
    pub fn per_call_cap(&self) -> f64 {
        self.config.max_accept_delta
    }

    /// Delta for a positive decision at the current confidence, bonus included.
    pub fn bounded_delta(&self, decision: Decision, suggested: f64, current: f64, bonus: f64) -> f64 {
        let c = &self.config;
        let raw = match decision {
            Decision::Accept => {
                let base = if suggested > 0.0 { suggested } else { c.default_accept_delta };
                (base.min(c.max_accept_delta) + bonus).min(c.max_accept_delta)
            }
            Decision::WeakAccept => {
                let base = if suggested > 0.0 { suggested } else { c.max_weak_accept_delta };
                base.min(c.max_weak_accept_delta)
            }
            Decision::NoProgress | Decision::Reject => return 0.0,
        };

        let headroom = (1.0 - current).max(0.0);
        if headroom <= c.saturation_epsilon || raw >= headroom {
            raw.min(headroom * c.saturation_factor)
        } else {
            raw
        }
    }

    /// Apply one event to a working hypothesis.
    pub fn apply(
        &self,
        hypothesis: &mut Hypothesis,
        event: &HopEvent,
        ctx: &HopContext,
        seen_categories: &mut BTreeSet<String>,
    ) -> HopAttempt {
        let mut applied = 0.0;

        match hypothesis.status {
            HypothesisStatus::Active => match event.decision {
                Decision::Accept | Decision::WeakAccept => {
                    let is_accept = event.decision == Decision::Accept;
                    let bonus = if is_accept && !seen_categories.contains(&event.category) {
                        self.config.diversity_bonus
                    } else {
                        0.0
                    };
                    applied = self.bounded_delta(
                        event.decision,
                        event.suggested_delta,
                        hypothesis.current_confidence,
                        bonus,
                    );
                    hypothesis.current_confidence =
                        (hypothesis.current_confidence + applied).clamp(0.0, 1.0);
                    attach(hypothesis, event, ctx);

                    if is_accept {
                        seen_categories.insert(event.category.clone());
                        if hypothesis.current_confidence >= self.config.acceptance_threshold
                            && hypothesis.evidence_count >= self.config.min_evidence_for_accept
                        {
                            hypothesis.status = HypothesisStatus::Accepted;
                            info!(
                                hypothesis_id = %hypothesis.id,
                                confidence = hypothesis.current_confidence,
                                evidence = hypothesis.evidence_count,
                                "Hypothesis accepted"
                            );
                        }
                    }
                }
                Decision::NoProgress => {}
                Decision::Reject => {
                    hypothesis.status = HypothesisStatus::Rejected;
                    info!(
                        hypothesis_id = %hypothesis.id,
                        confidence = hypothesis.current_confidence,
                        "Hypothesis rejected by evaluator"
                    );
                }
            },
            // Corroboration arriving in the same hop that accepted the hypothesis
            HypothesisStatus::Accepted if event.decision.is_positive() => {
                attach(hypothesis, event, ctx);
                if event.decision == Decision::Accept {
                    seen_categories.insert(event.category.clone());
                }
            }
            _ => {}
        }

        debug!(
            hypothesis_id = %hypothesis.id,
            hop = %ctx.hop_type,
            decision = %event.decision,
            delta = applied,
            confidence = hypothesis.current_confidence,
            "Accumulated event"
        );

        HopAttempt {
            hypothesis_id: hypothesis.id.clone(),
            hop_type: ctx.hop_type,
            query: ctx.query.clone(),
            source_url: ctx.source_url.clone(),
            chars_fetched: ctx.chars_fetched,
            decision: event.decision,
            confidence_delta: applied,
            timestamp: ctx.timestamp,
        }
    }

    /// Apply every event of one hop to a working copy.
    ///
    /// Terminal hypotheses come back unchanged with no attempts. The hop
    /// counts as one iteration; a hop without positive events extends the
    /// no-progress streak.
    pub fn apply_hop(
        &self,
        hypothesis: &Hypothesis,
        events: &[HopEvent],
        ctx: &HopContext,
        seen_categories: &BTreeSet<String>,
    ) -> HopUpdate {
        let mut working = hypothesis.clone();
        let mut seen = seen_categories.clone();

        if working.is_terminal() {
            return HopUpdate {
                hypothesis: working,
                attempts: Vec::new(),
                seen_categories: seen,
            };
        }

        let mut attempts = Vec::with_capacity(events.len().max(1));
        if events.is_empty() {
            let event = HopEvent::bare(Decision::NoProgress, &working);
            attempts.push(self.apply(&mut working, &event, ctx, &mut seen));
        }
        for event in events {
            attempts.push(self.apply(&mut working, event, ctx, &mut seen));
        }

        working.iteration_count += 1;
        if attempts.iter().any(|a| a.decision.is_positive()) {
            working.consecutive_no_progress = 0;
        } else {
            working.consecutive_no_progress += 1;
        }

        HopUpdate {
            hypothesis: working,
            attempts,
            seen_categories: seen,
        }
    }
}

fn attach(hypothesis: &mut Hypothesis, event: &HopEvent, ctx: &HopContext) {
    if !ctx.source_url.is_empty() {
        hypothesis.attach_evidence(EvidenceItem::new(
            &ctx.source_url,
            &event.excerpt,
            ctx.hop_type,
            &event.category,
        ));
    }

    let description = if event.description.trim().is_empty() {
        hypothesis.statement.clone()
    } else {
        event.description.trim().to_string()
    };
    hypothesis.findings.push(Finding {
        signal_type: event.signal_type.unwrap_or_else(|| ctx.hop_type.default_signal_type()),
        category: event.category.clone(),
        description,
        hop_type: ctx.hop_type,
        source_url: ctx.source_url.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidscout_agent::EvaluatedItem;

    fn accumulator() -> ConfidenceAccumulator {
        ConfidenceAccumulator::new(AccumulatorConfig::default())
    }

    fn ctx() -> HopContext {
        HopContext {
            hop_type: HopType::PdfDocument,
            query: "\"Arsenal\" tender filetype:pdf".to_string(),
            source_url: "https://arsenal.com/tender.pdf".to_string(),
            chars_fetched: 12_000,
            timestamp: Utc::now(),
        }
    }

    fn event(decision: Decision, delta: f64, category: &str) -> HopEvent {
        HopEvent {
            decision,
            suggested_delta: delta,
            category: category.to_string(),
            signal_type: None,
            description: format!("{} opportunity", category),
            excerpt: "excerpt".to_string(),
        }
    }

    fn hypothesis(prior: f64) -> Hypothesis {
        Hypothesis::new("arsenal", "Digital Transformation", "Arsenal is transforming", prior)
    }

    #[test]
    fn test_accept_delta_capped_and_bonus_included() {
        let acc = accumulator();
        assert!((acc.bounded_delta(Decision::Accept, 0.5, 0.5, 0.0) - 0.10).abs() < 1e-12);
        assert!((acc.bounded_delta(Decision::Accept, 0.0, 0.5, 0.0) - 0.06).abs() < 1e-12);
        assert!((acc.bounded_delta(Decision::Accept, 0.09, 0.5, 0.02) - 0.10).abs() < 1e-12);
        assert!((acc.bounded_delta(Decision::WeakAccept, 0.08, 0.5, 0.0) - 0.03).abs() < 1e-12);
        assert_eq!(acc.bounded_delta(Decision::NoProgress, 0.08, 0.5, 0.0), 0.0);
    }

    #[test]
    fn test_saturation_never_reaches_one() {
        let acc = accumulator();
        let mut c: f64 = 0.9;
        for _ in 0..40 {
            let delta = acc.bounded_delta(Decision::Accept, 0.10, c, 0.0);
            assert!(delta <= 0.10);
            c += delta;
            assert!(c < 1.0);
        }
        assert!(c > 0.99);
    }

    #[test]
    fn test_weak_accept_never_accepts() {
        let acc = accumulator();
        let mut h = hypothesis(0.74);
        let mut seen = BTreeSet::new();
        for _ in 0..5 {
            acc.apply(&mut h, &event(Decision::WeakAccept, 0.03, "CRM"), &ctx(), &mut seen);
        }
        assert!(h.current_confidence >= 0.75);
        assert_eq!(h.status, HypothesisStatus::Active);
        assert!(seen.is_empty());
    }

    #[test]
    fn test_reject_changes_status_not_score() {
        let acc = accumulator();
        let h = hypothesis(0.55);
        let update = acc.apply_hop(&h, &[event(Decision::Reject, 0.0, "CRM")], &ctx(), &BTreeSet::new());

        assert!(update.rejected());
        assert_eq!(update.hypothesis.current_confidence, 0.55);
        assert_eq!(update.attempts.len(), 1);
        assert_eq!(update.attempts[0].confidence_delta, 0.0);
    }

    #[test]
    fn test_no_progress_hop() {
        let acc = accumulator();
        let h = hypothesis(0.6);
        let update = acc.apply_hop(&h, &[], &ctx(), &BTreeSet::new());

        assert_eq!(update.attempts.len(), 1);
        assert_eq!(update.attempts[0].decision, Decision::NoProgress);
        assert_eq!(update.hypothesis.current_confidence, 0.6);
        assert_eq!(update.hypothesis.iteration_count, 1);
        assert_eq!(update.hypothesis.consecutive_no_progress, 1);
        assert_eq!(update.hypothesis.evidence_count, 0);
    }

    #[test]
    fn test_single_document_with_many_accepts() {
        let acc = accumulator();
        let h = hypothesis(0.60);
        let categories = ["Digital Transformation", "CRM", "Ticketing", "Data & Analytics", "Fan Engagement", "Cloud"];
        let events: Vec<HopEvent> = (0..11)
            .map(|i| event(Decision::Accept, 0.06, categories[i % categories.len()]))
            .collect();

        let update = acc.apply_hop(&h, &events, &ctx(), &BTreeSet::new());
        let w = &update.hypothesis;

        assert_eq!(w.status, HypothesisStatus::Accepted);
        assert!(w.current_confidence >= 0.75);
        assert!((w.current_confidence - 0.84).abs() < 1e-9);
        assert_eq!(update.attempts.len(), 11);
        assert_eq!(w.evidence_count, 11);
        assert_eq!(w.findings.len(), 11);
        assert_eq!(w.iteration_count, 1);
        assert_eq!(update.seen_categories.len(), 6);
        for attempt in &update.attempts {
            assert!(attempt.confidence_delta <= acc.per_call_cap() + 1e-12);
        }
        assert!(update.attempts[3..].iter().all(|a| a.confidence_delta == 0.0));
        // Input hypothesis untouched until the caller commits
        assert_eq!(h.current_confidence, 0.60);
    }

    #[test]
    fn test_events_after_reject_attach_nothing() {
        let acc = accumulator();
        let h = hypothesis(0.6);
        let events = vec![event(Decision::Reject, 0.0, "CRM"), event(Decision::Accept, 0.1, "CRM")];

        let update = acc.apply_hop(&h, &events, &ctx(), &BTreeSet::new());
        assert_eq!(update.attempts.len(), 2);
        assert_eq!(update.hypothesis.evidence_count, 0);
        assert_eq!(update.hypothesis.current_confidence, 0.6);
    }

    #[test]
    fn test_terminal_hypothesis_untouched() {
        let acc = accumulator();
        let mut h = hypothesis(0.8);
        h.status = HypothesisStatus::Saturated;
        let update = acc.apply_hop(&h, &[event(Decision::Accept, 0.1, "CRM")], &ctx(), &BTreeSet::new());

        assert!(update.attempts.is_empty());
        assert_eq!(update.hypothesis, h);
    }

    #[test]
    fn test_events_from_evaluation() {
        let h = hypothesis(0.6);
        let bare = Evaluation::bare(Decision::NoProgress, 0.0);
        assert_eq!(HopEvent::from_evaluation(&bare, &h, "text").len(), 1);

        let itemized = Evaluation {
            decision: Decision::Accept,
            confidence_delta: 0.08,
            reasoning: "two signals".to_string(),
            items: vec![
                EvaluatedItem {
                    decision: Decision::Accept,
                    confidence_delta: 0.07,
                    category: "CRM".to_string(),
                    signal_type: Some(SignalType::TenderNotice),
                    description: "CRM tender".to_string(),
                    excerpt: String::new(),
                },
                EvaluatedItem {
                    decision: Decision::WeakAccept,
                    confidence_delta: 0.02,
                    category: "Ticketing".to_string(),
                    signal_type: None,
                    description: "Ticketing review".to_string(),
                    excerpt: "quoted".to_string(),
                },
            ],
        };
        let events = HopEvent::from_evaluation(&itemized, &h, "page text");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].excerpt, "page text");
        assert_eq!(events[1].excerpt, "quoted");
    }
}
