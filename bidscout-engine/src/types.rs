//! Shared engine types: errors and the cancellation flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::sink::SinkError;

/// Error types for the discovery engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid configuration; fatal before any entity runs
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another worker holds the entity's lease
    #[error("Entity {0} is already leased by another worker")]
    LeaseHeld(String),

    /// Discovery was cancelled
    #[error("Discovery cancelled for entity {0}")]
    Cancelled(String),

    /// Knowledge sink failure other than unavailability
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// A worker task panicked or was aborted
    #[error("Worker task failed: {0}")]
    Worker(String),

    /// Config file could not be parsed
    #[error("Config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Cooperative cancellation flag shared between a controller and workers.
///
/// Checked between hops only; an in-flight fetch is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_shared_across_clones() {
        let flag = CancellationFlag::new();
        let worker = flag.clone();
        assert!(!worker.is_cancelled());

        flag.cancel();
        assert!(worker.is_cancelled());
    }
}
