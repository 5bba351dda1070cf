//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bidscout_agent::{
    EvaluatedItem, Evaluation, EvaluationError, EvidenceEvaluator, ValidationVerdict,
};
use bidscout_engine::{
    CancellationFlag, CategoryPrior, DiscoveryEngine, EngineConfig, InMemoryKnowledgeSink,
    SearchResult, SinkWriter, StaticFetcher,
};
use bidscout_model::{CandidateSignal, Decision, Entity, Hypothesis, SignalType};

pub const DOCUMENT_URL: &str = "https://www.arsenal.com/procurement/digital-tender.pdf";

pub const SIX_CATEGORIES: [&str; 6] = [
    "Digital Transformation",
    "CRM",
    "Ticketing",
    "Data & Analytics",
    "Fan Engagement",
    "Cloud Infrastructure",
];

/// Evaluator double with a fixed evaluation and call counters.
pub struct ScriptedEvaluator {
    evaluation: Result<Evaluation, ()>,
    reject_containing: Option<String>,
    cancel_on_evaluate: Option<CancellationFlag>,
    pub evaluate_calls: AtomicUsize,
    pub validate_calls: AtomicUsize,
    evaluated_entities: Mutex<Vec<String>>,
}

impl ScriptedEvaluator {
    pub fn returning(evaluation: Evaluation) -> Self {
        Self {
            evaluation: Ok(evaluation),
            reject_containing: None,
            cancel_on_evaluate: None,
            evaluate_calls: AtomicUsize::new(0),
            validate_calls: AtomicUsize::new(0),
            evaluated_entities: Mutex::new(Vec::new()),
        }
    }

    /// Every evaluate call fails after retries.
    pub fn failing() -> Self {
        Self {
            evaluation: Err(()),
            ..Self::returning(Evaluation::bare(Decision::NoProgress, 0.0))
        }
    }

    /// Re-validation rejects signals whose description contains `needle`.
    pub fn rejecting_validation(mut self, needle: &str) -> Self {
        self.reject_containing = Some(needle.to_string());
        self
    }

    /// Request cancellation from inside the first evaluate call.
    pub fn cancelling(mut self, flag: CancellationFlag) -> Self {
        self.cancel_on_evaluate = Some(flag);
        self
    }

    pub fn evaluations(&self) -> usize {
        self.evaluate_calls.load(Ordering::SeqCst)
    }

    pub fn validations(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    /// Entity ids in the order of their first evaluate call.
    pub fn entity_order(&self) -> Vec<String> {
        self.evaluated_entities.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl EvidenceEvaluator for ScriptedEvaluator {
    async fn evaluate(&self, hypothesis: &Hypothesis, _text: &str) -> Result<Evaluation, EvaluationError> {
        self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut order = self.evaluated_entities.lock().unwrap();
            if !order.contains(&hypothesis.entity_id) {
                order.push(hypothesis.entity_id.clone());
            }
        }
        if let Some(flag) = &self.cancel_on_evaluate {
            flag.cancel();
        }
        self.evaluation
            .clone()
            .map_err(|_| EvaluationError::Timeout(30_000))
    }

    async fn validate(&self, signal: &CandidateSignal) -> Result<ValidationVerdict, EvaluationError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        match &self.reject_containing {
            Some(needle) if signal.description.contains(needle.as_str()) => {
                Ok(ValidationVerdict::reject("not a procurement opportunity"))
            }
            _ => Ok(ValidationVerdict::pass()),
        }
    }
}

/// Eleven ACCEPT findings over six categories, as from a single tender pack.
pub fn tender_pack_evaluation() -> Evaluation {
    let items = (0..11)
        .map(|i| {
            let category = SIX_CATEGORIES[i % SIX_CATEGORIES.len()];
            EvaluatedItem {
                decision: Decision::Accept,
                confidence_delta: 0.06,
                category: category.to_string(),
                signal_type: Some(SignalType::TenderNotice),
                description: format!("{} workstream {} in digital tender", category, i + 1),
                excerpt: format!("Lot {}: {}", i + 1, category),
            }
        })
        .collect();

    Evaluation {
        decision: Decision::Accept,
        confidence_delta: 0.06,
        reasoning: "Tender pack lists eleven technology lots".to_string(),
        items,
    }
}

pub fn arsenal() -> Entity {
    Entity::new("arsenal", "Arsenal", "football_club")
}

/// Default config with a single hypothesis category.
pub fn single_category_config(category: &str, prior: f64) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.categories = vec![CategoryPrior::new(category, "{entity} is buying technology", prior, 0.5)];
    config
}

/// Every query for the entity finds the tender document.
pub fn document_fetcher() -> StaticFetcher {
    StaticFetcher::new()
        .with_results(
            "Arsenal",
            vec![SearchResult::new(
                "Arsenal digital transformation tender",
                DOCUMENT_URL,
                "Invitation to tender for digital services",
            )],
        )
        .with_page(DOCUMENT_URL, "Arsenal Football Club invites tenders for eleven technology lots.")
}

pub struct Harness {
    pub engine: Arc<DiscoveryEngine>,
    pub evaluator: Arc<ScriptedEvaluator>,
    pub sink: Arc<InMemoryKnowledgeSink>,
}

pub fn harness(config: EngineConfig, fetcher: StaticFetcher, evaluator: ScriptedEvaluator) -> Harness {
    let evaluator = Arc::new(evaluator);
    let sink = Arc::new(InMemoryKnowledgeSink::new());
    let engine = DiscoveryEngine::new(
        config,
        Arc::new(fetcher),
        evaluator.clone(),
        SinkWriter::new(sink.clone()),
    )
    .expect("valid config");

    Harness {
        engine: Arc::new(engine),
        evaluator,
        sink,
    }
}
