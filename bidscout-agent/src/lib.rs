//! Bidscout Agent - the Evidence Evaluator boundary
//!
//! Owns the contract between the discovery engine and the LLM judgment call:
//! - Trait-based LLM backends (OpenAI-compatible, mock)
//! - Prompts for per-hop evaluation and holistic signal re-validation
//! - Strict parsing into the closed decision vocabulary
//! - Explicit retry policy shared with the fetcher boundary
//! - Audit trail of every evaluator call
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        EvidenceEvaluator (trait)        │
//! │   evaluate(hypothesis, text)            │
//! │   validate(candidate signal)            │
//! └────────────────┬────────────────────────┘
//!                  │ LlmEvaluator
//!      ┌───────────┴───────────┐
//!      ▼                       ▼
//! ┌─────────────┐       ┌─────────────┐
//! │ LlmBackend  │       │ RetryPolicy │
//! │ (OpenAI/    │       │ + Audit     │
//! │  Mock)      │       │             │
//! └─────────────┘       └─────────────┘
//! ```

pub mod audit;
pub mod backend;
pub mod evaluator;
pub mod prompt;
pub mod retry;

// Re-export main types for convenience
pub use audit::{AuditEntry, AuditKind, AuditStats, EvaluationAudit};
pub use backend::traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError};
pub use backend::{MockBackend, OpenAiBackend};
pub use evaluator::{
    EvaluatedItem, Evaluation, EvaluationError, EvaluatorConfig, EvidenceEvaluator, LlmEvaluator,
    ValidationVerdict,
};
pub use prompt::EvaluationPrompt;
pub use retry::RetryPolicy;
