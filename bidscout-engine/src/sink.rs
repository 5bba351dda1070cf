//! Knowledge Sink boundary.
//!
//! Only validated signals are written, as episodes keyed by
//! `(entity_id, signal_id)`. Writes are idempotent: a second write of the
//! same key returns the original episode id and changes nothing.
//!
//! `SinkWriter` adds an outbox so an unreachable sink pauses writes instead
//! of dropping validated signals.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use bidscout_model::{SignalType, ValidatedSignal};

/// Sink errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SinkError {
    /// Sink unreachable; the write may be retried later
    #[error("Knowledge sink unavailable: {0}")]
    Unavailable(String),

    /// Sink refused the episode
    #[error("Episode rejected by sink: {0}")]
    Rejected(String),

    /// Local I/O or encoding failure
    #[error("Sink I/O error: {0}")]
    Io(String),
}

/// Identifier assigned by the sink to a stored episode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeId(pub String);

impl EpisodeId {
    /// A fresh random id.
    pub fn generate() -> Self {
        Self(format!("ep_{}", uuid::Uuid::new_v4()))
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated signal as persisted in the knowledge store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Entity the signal belongs to
    pub entity_id: String,
    /// Deterministic signal id
    pub signal_id: String,
    /// Signal type
    pub signal_type: SignalType,
    /// Human-readable description
    pub description: String,
    /// Confidence at validation
    pub confidence: f64,
    /// When the signal cleared the final pass
    pub timestamp: DateTime<Utc>,
    /// Category, hypothesis, evidence and validation trail
    pub metadata: serde_json::Value,
}

impl Episode {
    /// Build the episode for a validated signal.
    pub fn from_validated(validated: &ValidatedSignal) -> Self {
        let signal = validated.signal();
        let evidence: Vec<serde_json::Value> = signal
            .evidence
            .iter()
            .map(|e| {
                serde_json::json!({
                    "url": e.url,
                    "source": e.source,
                    "hop_type": e.hop_type,
                    "credibility": e.credibility_score,
                })
            })
            .collect();
        let passes: Vec<u8> = validated.records().iter().map(|r| r.pass_number.number()).collect();

        Self {
            entity_id: signal.entity_id.clone(),
            signal_id: signal.id.clone(),
            signal_type: signal.signal_type,
            description: signal.description.clone(),
            confidence: signal.confidence,
            timestamp: validated.validated_at(),
            metadata: serde_json::json!({
                "category": signal.category,
                "hypothesis_id": signal.hypothesis_id,
                "detected_at": signal.detected_at,
                "evidence": evidence,
                "validation_passes": passes,
            }),
        }
    }

    /// Idempotency key.
    pub fn key(&self) -> (String, String) {
        (self.entity_id.clone(), self.signal_id.clone())
    }
}

/// Durable store for validated signals.
#[async_trait::async_trait]
pub trait KnowledgeSink: Send + Sync {
    /// Sink identifier for logging.
    fn id(&self) -> &str;

    /// Write an episode, idempotent on `(entity_id, signal_id)`.
    async fn write_episode(&self, episode: &Episode) -> Result<EpisodeId, SinkError>;
}

/// In-memory sink for tests and embedding.
pub struct InMemoryKnowledgeSink {
    episodes: DashMap<(String, String), (EpisodeId, Episode)>,
    available: AtomicBool,
}

impl InMemoryKnowledgeSink {
    /// Create an empty, reachable sink.
    pub fn new() -> Self {
        Self {
            episodes: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle reachability; an unavailable sink fails every write.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored episodes.
    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    /// Whether nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    /// Stored episode for a key.
    pub fn get(&self, entity_id: &str, signal_id: &str) -> Option<Episode> {
        self.episodes
            .get(&(entity_id.to_string(), signal_id.to_string()))
            .map(|entry| entry.value().1.clone())
    }

    /// All episodes for an entity, ordered by signal id.
    pub fn episodes_for(&self, entity_id: &str) -> Vec<Episode> {
        let mut episodes: Vec<Episode> = self
            .episodes
            .iter()
            .filter(|entry| entry.key().0 == entity_id)
            .map(|entry| entry.value().1.clone())
            .collect();
        episodes.sort_by(|a, b| a.signal_id.cmp(&b.signal_id));
        episodes
    }
}

impl Default for InMemoryKnowledgeSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl KnowledgeSink for InMemoryKnowledgeSink {
    fn id(&self) -> &str {
        "memory"
    }

    async fn write_episode(&self, episode: &Episode) -> Result<EpisodeId, SinkError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("in-memory sink disabled".to_string()));
        }

        let entry = self
            .episodes
            .entry(episode.key())
            .or_insert_with(|| (EpisodeId::generate(), episode.clone()));
        Ok(entry.value().0.clone())
    }
}

/// Result of handing an episode to the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Stored (or already present) under this id
    Written(EpisodeId),
    /// Sink unreachable; held in the outbox
    Queued,
}

/// Sink wrapper with an outbox for unreachable periods.
#[derive(Clone)]
pub struct SinkWriter {
    sink: Arc<dyn KnowledgeSink>,
    outbox: Arc<RwLock<VecDeque<Episode>>>,
}

impl SinkWriter {
    /// Wrap a sink.
    pub fn new(sink: Arc<dyn KnowledgeSink>) -> Self {
        Self {
            sink,
            outbox: Arc::new(RwLock::new(VecDeque::new())),
        }
    }

    /// Write an episode, queueing it if the sink is unavailable.
    ///
    /// While earlier episodes are pending the new one joins the queue, so
    /// writes reach the sink in order.
    pub async fn write(&self, episode: Episode) -> Result<WriteOutcome, SinkError> {
        if self.pending_count().await > 0 {
            self.flush_pending().await;
            if self.pending_count().await > 0 {
                self.enqueue(episode).await;
                return Ok(WriteOutcome::Queued);
            }
        }

        match self.sink.write_episode(&episode).await {
            Ok(id) => {
                debug!(
                    sink = self.sink.id(),
                    entity_id = %episode.entity_id,
                    signal_id = %episode.signal_id,
                    episode_id = %id,
                    "Episode written"
                );
                Ok(WriteOutcome::Written(id))
            }
            Err(SinkError::Unavailable(reason)) => {
                warn!(
                    sink = self.sink.id(),
                    signal_id = %episode.signal_id,
                    reason = %reason,
                    "Sink unavailable, episode queued"
                );
                self.enqueue(episode).await;
                Ok(WriteOutcome::Queued)
            }
            Err(e) => Err(e),
        }
    }

    async fn enqueue(&self, episode: Episode) {
        let mut outbox = self.outbox.write().await;
        if !outbox.iter().any(|queued| queued.key() == episode.key()) {
            outbox.push_back(episode);
        }
    }

    /// Retry queued episodes in order, stopping at the first that still
    /// cannot be delivered. Returns the ids written.
    pub async fn flush_pending(&self) -> Vec<EpisodeId> {
        let mut outbox = self.outbox.write().await;
        let mut written = Vec::new();

        while let Some(episode) = outbox.front() {
            match self.sink.write_episode(episode).await {
                Ok(id) => {
                    written.push(id);
                    outbox.pop_front();
                }
                Err(SinkError::Unavailable(_)) => break,
                Err(e) => {
                    warn!(
                        sink = self.sink.id(),
                        signal_id = %episode.signal_id,
                        error = %e,
                        "Dropping episode refused by sink"
                    );
                    outbox.pop_front();
                }
            }
        }

        if !written.is_empty() {
            info!(sink = self.sink.id(), flushed = written.len(), pending = outbox.len(), "Outbox flushed");
        }
        written
    }

    /// Episodes waiting for the sink.
    pub async fn pending_count(&self) -> usize {
        self.outbox.read().await.len()
    }
}
