//! The Evidence Evaluator contract and its LLM-backed implementation.
//!
//! The engine only sees the closed `Decision` vocabulary plus a numeric
//! delta; prompt construction and reply parsing stay behind this boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use bidscout_model::{CandidateSignal, Decision, Hypothesis, SignalType, Verdict};

use crate::audit::{AuditEntry, AuditKind, EvaluationAudit};
use crate::backend::traits::{CompletionRequest, LlmBackend, LlmError, Message};
use crate::prompt::EvaluationPrompt;
use crate::retry::RetryPolicy;

/// Error types for evaluator calls.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// Backend call failed
    #[error("Backend error: {0}")]
    Backend(#[from] LlmError),

    /// Reply did not match the JSON contract
    #[error("Malformed evaluator reply: {0}")]
    Malformed(String),

    /// Call exceeded its time budget
    #[error("Evaluator timed out after {0}ms")]
    Timeout(u64),

    /// No backend is configured or available
    #[error("No LLM backend available")]
    NoBackendAvailable,
}

impl EvaluationError {
    fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::NoBackendAvailable | Self::Backend(LlmError::ContentFiltered { .. })
        )
    }
}

/// One signal the evaluator found in the evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedItem {
    /// Decision for this item
    pub decision: Decision,
    /// Suggested confidence change
    pub confidence_delta: f64,
    /// Signal category; the hypothesis category when the evaluator gives none
    pub category: String,
    /// Signal type, if the evaluator named one
    pub signal_type: Option<SignalType>,
    /// One-line description
    pub description: String,
    /// Supporting text
    pub excerpt: String,
}

/// Result of evaluating one piece of evidence against a hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Overall decision
    pub decision: Decision,
    /// Suggested confidence change
    pub confidence_delta: f64,
    /// Evaluator's explanation
    pub reasoning: String,
    /// Individual signals found in the evidence
    pub items: Vec<EvaluatedItem>,
}

impl Evaluation {
    /// A bare decision with no itemized findings.
    pub fn bare(decision: Decision, confidence_delta: f64) -> Self {
        Self {
            decision,
            confidence_delta,
            reasoning: String::new(),
            items: Vec::new(),
        }
    }
}

/// Result of holistic re-validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    /// PASS or REJECT
    pub verdict: Verdict,
    /// Reason, present on REJECT
    pub reason: Option<String>,
}

impl ValidationVerdict {
    /// A passing verdict.
    pub fn pass() -> Self {
        Self {
            verdict: Verdict::Pass,
            reason: None,
        }
    }

    /// A rejecting verdict.
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Reject,
            reason: Some(reason.into()),
        }
    }
}

/// Judges evidence against hypotheses and re-validates candidate signals.
#[async_trait]
pub trait EvidenceEvaluator: Send + Sync {
    /// Classify fetched evidence text against a hypothesis.
    async fn evaluate(
        &self,
        hypothesis: &Hypothesis,
        evidence_text: &str,
    ) -> Result<Evaluation, EvaluationError>;

    /// Re-examine a candidate signal's full evidence bundle.
    async fn validate(&self, signal: &CandidateSignal) -> Result<ValidationVerdict, EvaluationError>;
}

/// Settings for LLM-backed evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Max tokens per reply
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Per-attempt timeout (ms)
    pub timeout_ms: u64,
    /// Retry policy for failed or malformed replies
    pub retry: RetryPolicy,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.0,
            timeout_ms: 30_000,
            retry: RetryPolicy::evaluator(),
        }
    }
}

/// Evaluator that asks an LLM backend and parses the JSON reply.
pub struct LlmEvaluator {
    /// Backends in preference order
    backends: Vec<Arc<dyn LlmBackend>>,
    /// Configuration
    config: EvaluatorConfig,
    /// Audit log
    audit: EvaluationAudit,
}

impl LlmEvaluator {
    /// Create an evaluator over the given backends.
    pub fn new(backends: Vec<Arc<dyn LlmBackend>>) -> Self {
        Self {
            backends,
            config: EvaluatorConfig::default(),
            audit: EvaluationAudit::new(),
        }
    }

    /// Create with configuration.
    pub fn with_config(mut self, config: EvaluatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing audit log.
    pub fn with_audit(mut self, audit: EvaluationAudit) -> Self {
        self.audit = audit;
        self
    }

    /// The audit log.
    pub fn audit(&self) -> &EvaluationAudit {
        &self.audit
    }

    /// Select the first available backend.
    async fn select_backend(&self) -> Result<Arc<dyn LlmBackend>, EvaluationError> {
        if let [only] = self.backends.as_slice() {
            return Ok(Arc::clone(only));
        }
        for backend in &self.backends {
            if backend.is_available().await {
                return Ok(Arc::clone(backend));
            }
        }
        Err(EvaluationError::NoBackendAvailable)
    }

    /// Call the backend until the reply parses, retrying per policy.
    ///
    /// A malformed reply is echoed back with a repair instruction so the
    /// retry sees what went wrong.
    async fn call<T>(
        &self,
        backend: Arc<dyn LlmBackend>,
        mut entry: AuditEntry,
        request: CompletionRequest,
        parse: impl Fn(&str) -> Result<T, EvaluationError>,
        label: impl Fn(&T) -> String,
    ) -> Result<T, EvaluationError> {
        entry.backend = Some(backend.id().to_string());

        let policy = &self.config.retry;
        let attempts = policy.attempts();
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let mut request = request;
        let mut attempt = 1;

        loop {
            entry.attempts = attempt;
            let outcome = match tokio::time::timeout(timeout, backend.complete(request.clone())).await {
                Err(_) => Err(EvaluationError::Timeout(self.config.timeout_ms)),
                Ok(Err(err)) => Err(EvaluationError::Backend(err)),
                Ok(Ok(response)) => {
                    entry.tokens += response.usage.total();
                    match parse(&response.content) {
                        Ok(value) => Ok(value),
                        Err(err) => {
                            request.messages.push(Message::assistant(response.content));
                            request
                                .messages
                                .push(Message::user(EvaluationPrompt::repair(&err.to_string())));
                            Err(err)
                        }
                    }
                }
            };

            match outcome {
                Ok(value) => {
                    self.audit.record(entry.with_outcome(label(&value))).await;
                    return Ok(value);
                }
                Err(err) if attempt < attempts && err.is_retryable() => {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        subject_id = %entry.subject_id,
                        attempt,
                        attempts,
                        error = %err,
                        "Evaluator call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    self.audit.record(entry.with_error(err.to_string())).await;
                    return Err(err);
                }
            }
        }
    }
}

#[async_trait]
impl EvidenceEvaluator for LlmEvaluator {
    async fn evaluate(
        &self,
        hypothesis: &Hypothesis,
        evidence_text: &str,
    ) -> Result<Evaluation, EvaluationError> {
        let backend = self.select_backend().await?;
        let user = EvaluationPrompt::evaluation_user(hypothesis, evidence_text, backend.capabilities());
        let request = CompletionRequest::user(user)
            .with_system(EvaluationPrompt::evaluation_system())
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature)
            .with_json_output();

        debug!(hypothesis_id = %hypothesis.id, chars = evidence_text.len(), "Evaluating evidence");

        let entry = AuditEntry::started(AuditKind::Evaluate, &hypothesis.id);
        self.call(
            backend,
            entry,
            request,
            |content| parse_evaluation(content, &hypothesis.category),
            |evaluation| evaluation.decision.as_str().to_string(),
        )
        .await
    }

    async fn validate(&self, signal: &CandidateSignal) -> Result<ValidationVerdict, EvaluationError> {
        let backend = self.select_backend().await?;
        let user = EvaluationPrompt::validation_user(signal, backend.capabilities());
        let request = CompletionRequest::user(user)
            .with_system(EvaluationPrompt::validation_system())
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature)
            .with_json_output();

        debug!(signal_id = %signal.id, evidence = signal.evidence.len(), "Re-validating signal");

        let entry = AuditEntry::started(AuditKind::Validate, &signal.id);
        self.call(backend, entry, request, parse_verdict, |verdict| {
            match verdict.verdict {
                Verdict::Pass => "PASS",
                Verdict::Reject => "REJECT",
            }
            .to_string()
        })
        .await
    }
}

#[derive(Debug, Deserialize)]
struct RawEvaluation {
    decision: String,
    #[serde(default)]
    confidence_delta: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    signals: Vec<RawSignal>,
}

#[derive(Debug, Deserialize)]
struct RawSignal {
    #[serde(default, rename = "type")]
    signal_type: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    excerpt: Option<String>,
    #[serde(default)]
    decision: Option<String>,
    #[serde(default)]
    confidence_delta: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    verdict: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Slice out the JSON object from a reply that may carry fences or prose.
fn extract_json(content: &str) -> Result<&str, EvaluationError> {
    let start = content.find('{');
    let end = content.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => Ok(&content[start..=end]),
        _ => Err(EvaluationError::Malformed("no JSON object in reply".to_string())),
    }
}

fn parse_delta(value: Option<f64>) -> Result<f64, EvaluationError> {
    let delta = value.unwrap_or(0.0);
    if !delta.is_finite() {
        return Err(EvaluationError::Malformed(format!("non-finite confidence_delta {}", delta)));
    }
    Ok(delta)
}

fn parse_decision(label: &str) -> Result<Decision, EvaluationError> {
    Decision::from_str(label).map_err(|e| EvaluationError::Malformed(e.to_string()))
}

/// Parse an evaluation reply into the closed decision vocabulary.
pub fn parse_evaluation(content: &str, default_category: &str) -> Result<Evaluation, EvaluationError> {
    let raw: RawEvaluation = serde_json::from_str(extract_json(content)?)
        .map_err(|e| EvaluationError::Malformed(e.to_string()))?;

    let decision = parse_decision(&raw.decision)?;
    let confidence_delta = parse_delta(raw.confidence_delta)?;

    let mut items = Vec::with_capacity(raw.signals.len());
    for signal in raw.signals {
        let item_decision = match signal.decision.as_deref() {
            Some(label) => parse_decision(label)?,
            None => decision,
        };
        let signal_type = match signal.signal_type.as_deref() {
            Some(label) => Some(SignalType::from_str(label).map_err(EvaluationError::Malformed)?),
            None => None,
        };
        let category = signal
            .category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| default_category.to_string());

        items.push(EvaluatedItem {
            decision: item_decision,
            confidence_delta: parse_delta(signal.confidence_delta)?,
            category,
            signal_type,
            description: signal.description.unwrap_or_default(),
            excerpt: signal.excerpt.unwrap_or_default(),
        });
    }

    Ok(Evaluation {
        decision,
        confidence_delta,
        reasoning: raw.reasoning.unwrap_or_default(),
        items,
    })
}

/// Parse a re-validation reply.
pub fn parse_verdict(content: &str) -> Result<ValidationVerdict, EvaluationError> {
    let raw: RawVerdict = serde_json::from_str(extract_json(content)?)
        .map_err(|e| EvaluationError::Malformed(e.to_string()))?;

    match raw.verdict.trim().to_ascii_uppercase().as_str() {
        "PASS" => Ok(ValidationVerdict::pass()),
        "REJECT" => Ok(ValidationVerdict::reject(
            raw.reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| "rejected without reason".to_string()),
        )),
        other => Err(EvaluationError::Malformed(format!("Unknown verdict: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use bidscout_model::{EvidenceItem, HopType};

    fn hypothesis() -> Hypothesis {
        Hypothesis::new("arsenal", "CRM", "Arsenal is procuring a CRM platform", 0.6)
    }

    fn fast_config() -> EvaluatorConfig {
        EvaluatorConfig {
            retry: RetryPolicy {
                max_attempts: 2,
                initial_backoff_ms: 1,
                max_backoff_ms: 1,
            },
            ..EvaluatorConfig::default()
        }
    }

    #[test]
    fn test_parse_evaluation_with_fences_and_items() {
        let reply = r#"Here you go:
```json
{"decision": "accept", "confidence_delta": 0.08, "reasoning": "RFP found",
 "signals": [
   {"type": "RFP", "category": "CRM", "description": "CRM RFP", "excerpt": "issues RFP", "decision": "ACCEPT", "confidence_delta": 0.07},
   {"description": "Hiring CRM lead", "decision": "WEAK_ACCEPT"}
 ]}
```"#;

        let evaluation = parse_evaluation(reply, "Ticketing").unwrap();
        assert_eq!(evaluation.decision, Decision::Accept);
        assert_eq!(evaluation.items.len(), 2);
        assert_eq!(evaluation.items[0].signal_type, Some(SignalType::RfpDetected));
        assert_eq!(evaluation.items[1].category, "Ticketing");
        assert_eq!(evaluation.items[1].decision, Decision::WeakAccept);
        assert_eq!(evaluation.items[1].confidence_delta, 0.0);
    }

    #[test]
    fn test_parse_rejects_unknown_decision() {
        let result = parse_evaluation(r#"{"decision": "MAYBE"}"#, "CRM");
        assert!(matches!(result, Err(EvaluationError::Malformed(_))));

        let result = parse_evaluation("I think this is relevant", "CRM");
        assert!(matches!(result, Err(EvaluationError::Malformed(_))));
    }

    #[test]
    fn test_parse_verdict() {
        assert_eq!(parse_verdict(r#"{"verdict":"PASS"}"#).unwrap(), ValidationVerdict::pass());

        let reject = parse_verdict(r#"{"verdict":"reject","reason":"incoherent"}"#).unwrap();
        assert_eq!(reject.verdict, Verdict::Reject);
        assert_eq!(reject.reason.as_deref(), Some("incoherent"));

        let bare = parse_verdict(r#"{"verdict":"REJECT"}"#).unwrap();
        assert!(bare.reason.is_some());
    }

    #[tokio::test]
    async fn test_evaluate_accept() {
        let backend = Arc::new(
            MockBackend::default()
                .with_response(r#"{"decision":"ACCEPT","confidence_delta":0.06,"reasoning":"ok"}"#),
        );
        let evaluator = LlmEvaluator::new(vec![backend.clone()]);

        let evaluation = tokio_test::assert_ok!(evaluator.evaluate(&hypothesis(), "CRM RFP").await);

        assert_eq!(evaluation.decision, Decision::Accept);
        assert_eq!(evaluation.confidence_delta, 0.06);
        assert_eq!(backend.call_count(), 1);
        assert_eq!(evaluator.audit().stats().await.evaluations, 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_retried_once() {
        let backend = Arc::new(
            MockBackend::default()
                .then_respond("not json at all")
                .then_respond(r#"{"decision":"WEAK_ACCEPT","confidence_delta":0.02}"#),
        );
        let evaluator = LlmEvaluator::new(vec![backend.clone()]).with_config(fast_config());

        let evaluation = evaluator.evaluate(&hypothesis(), "text").await.unwrap();

        assert_eq!(evaluation.decision, Decision::WeakAccept);
        assert_eq!(backend.call_count(), 2);
        let entries = evaluator.audit().get_by_subject("hyp_arsenal_crm").await;
        assert_eq!(entries[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_repeated_failure_is_error_not_accept() {
        let backend = Arc::new(MockBackend::default().then_fail("down").then_respond("garbage"));
        let evaluator = LlmEvaluator::new(vec![backend.clone()]).with_config(fast_config());

        let result = evaluator.evaluate(&hypothesis(), "text").await;

        tokio_test::assert_err!(&result);
        assert!(matches!(result, Err(EvaluationError::Malformed(_))));
        assert_eq!(backend.call_count(), 2);
        assert_eq!(evaluator.audit().stats().await.failed, 1);
    }

    #[tokio::test]
    async fn test_validate_reject() {
        let backend = Arc::new(
            MockBackend::default().with_response(r#"{"verdict":"REJECT","reason":"stale tender"}"#),
        );
        let evaluator = LlmEvaluator::new(vec![backend]);
        let signal = CandidateSignal::new(
            "arsenal",
            "hyp_arsenal_crm",
            SignalType::TenderNotice,
            "CRM",
            "CRM tender",
            0.8,
            vec![EvidenceItem::new("https://a.com/t.pdf", "tender", HopType::PdfDocument, "CRM")],
        );

        let verdict = evaluator.validate(&signal).await.unwrap();
        assert_eq!(verdict, ValidationVerdict::reject("stale tender"));
        assert_eq!(evaluator.audit().stats().await.validations, 1);
    }

    #[tokio::test]
    async fn test_no_available_backend() {
        let a: Arc<dyn LlmBackend> = Arc::new(MockBackend::new("a").with_available(false));
        let b: Arc<dyn LlmBackend> = Arc::new(MockBackend::new("b").with_available(false));
        let evaluator = LlmEvaluator::new(vec![a, b]);

        let result = evaluator.evaluate(&hypothesis(), "text").await;
        assert!(matches!(result, Err(EvaluationError::NoBackendAvailable)));
    }
}
