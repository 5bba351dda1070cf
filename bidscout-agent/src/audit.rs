//! Audit trail for evaluator calls.
//!
//! Every evaluation and re-validation call is logged with its outcome,
//! attempt count and token usage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Maximum entries in the audit log before pruning.
const MAX_AUDIT_ENTRIES: usize = 10_000;

/// Which evaluator operation was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Per-hop evidence evaluation
    Evaluate,
    /// Holistic signal re-validation
    Validate,
}

/// An entry in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID
    pub entry_id: String,
    /// Operation called
    pub kind: AuditKind,
    /// Hypothesis or signal ID the call was about
    pub subject_id: String,
    /// Backend that served the call
    pub backend: Option<String>,
    /// Decision or verdict label on success
    pub outcome: Option<String>,
    /// Error message on failure
    pub error: Option<String>,
    /// Attempts made, including retries
    pub attempts: u32,
    /// Total tokens across attempts
    pub tokens: u32,
    /// When the call started
    pub requested_at: DateTime<Utc>,
    /// Wall-clock duration in ms
    pub duration_ms: u64,
}

impl AuditEntry {
    /// Create an entry for a call that just started.
    pub fn started(kind: AuditKind, subject_id: impl Into<String>) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            kind,
            subject_id: subject_id.into(),
            backend: None,
            outcome: None,
            error: None,
            attempts: 0,
            tokens: 0,
            requested_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Whether the call produced a usable outcome.
    pub fn succeeded(&self) -> bool {
        self.outcome.is_some()
    }

    fn finish(&mut self) {
        self.duration_ms = (Utc::now() - self.requested_at).num_milliseconds().max(0) as u64;
    }

    /// Record a successful outcome.
    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self.finish();
        self
    }

    /// Record a failure.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.finish();
        self
    }
}

/// Audit log shared by evaluator instances.
#[derive(Clone)]
pub struct EvaluationAudit {
    /// Log entries (newest first)
    entries: Arc<RwLock<VecDeque<AuditEntry>>>,
    /// Maximum entries to retain
    max_entries: usize,
}

impl EvaluationAudit {
    /// Create a new audit log.
    pub fn new() -> Self {
        Self::with_max_entries(MAX_AUDIT_ENTRIES)
    }

    /// Create with custom max entries.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries,
        }
    }

    /// Append a finished entry.
    pub async fn record(&self, entry: AuditEntry) {
        let mut entries = self.entries.write().await;
        entries.push_front(entry);

        // Prune if over limit
        while entries.len() > self.max_entries {
            entries.pop_back();
        }
    }

    /// Get recent entries.
    pub async fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().take(limit).cloned().collect()
    }

    /// Get entries about a hypothesis or signal.
    pub async fn get_by_subject(&self, subject_id: &str) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.subject_id == subject_id)
            .cloned()
            .collect()
    }

    /// Get statistics.
    pub async fn stats(&self) -> AuditStats {
        let entries = self.entries.read().await;

        let count_kind = |kind: AuditKind| entries.iter().filter(|e| e.kind == kind).count();
        let total = entries.len();
        let failed = entries.iter().filter(|e| !e.succeeded()).count();
        let retried = entries.iter().filter(|e| e.attempts > 1).count();
        let total_tokens = entries.iter().map(|e| e.tokens as u64).sum();

        let avg_duration_ms = if total > 0 {
            entries.iter().map(|e| e.duration_ms).sum::<u64>() / total as u64
        } else {
            0
        };

        AuditStats {
            total_calls: total,
            evaluations: count_kind(AuditKind::Evaluate),
            validations: count_kind(AuditKind::Validate),
            failed,
            retried,
            total_tokens,
            avg_duration_ms,
        }
    }

    /// Get count.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for EvaluationAudit {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics from the audit log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditStats {
    /// Total calls logged
    pub total_calls: usize,
    /// Per-hop evaluations
    pub evaluations: usize,
    /// Pass 2 re-validations
    pub validations: usize,
    /// Calls that ended in an error
    pub failed: usize,
    /// Calls that needed more than one attempt
    pub retried: usize,
    /// Tokens consumed
    pub total_tokens: u64,
    /// Average call duration
    pub avg_duration_ms: u64,
}
