//! Bidscout discovery engine.
//!
//! Adaptive, evidence-driven discovery of procurement signals for tracked
//! entities, gated by three-pass validation:
//!
//! - **Exploration policy**: the next hop goes to the hypothesis with the
//!   highest expected information gain
//! - **Bounded accumulation**: every evaluator decision moves confidence by a
//!   capped, saturating delta
//! - **Ralph validation**: rule filter, evaluator re-validation and final
//!   confirmation before anything reaches the knowledge sink
//! - **Banding**: entities are tiered EXPLORATORY → ACTIONABLE from their
//!   validated signals
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       DiscoveryPool                          │
//! │        (one leased worker per entity, max_workers)           │
//! │                                                              │
//! │  ┌──────────┐  ┌─────────┐  ┌─────────┐  ┌──────────┐        │
//! │  │ Selector │──│  Query  │──│ Fetcher │──│ Evaluator│        │
//! │  └──────────┘  └─────────┘  └─────────┘  └────┬─────┘        │
//! │       ▲                                       │              │
//! │  ┌────┴─────┐                          ┌──────▼──────┐       │
//! │  │ Stopping │◄─────────────────────────│ Accumulator │       │
//! │  └────┬─────┘                          └─────────────┘       │
//! │       │ terminal                                             │
//! │  ┌────▼─────┐  ┌──────────┐  ┌────────┐                      │
//! │  │  Ralph   │──│   Sink   │  │ Bander │                      │
//! │  │ 1 → 2 → 3│  │ (outbox) │  └────────┘                      │
//! │  └──────────┘  └──────────┘                                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod accumulator;
pub mod bander;
pub mod config;
pub mod discovery;
pub mod fetcher;
pub mod pool;
pub mod query;
pub mod ralph;
pub mod reporting;
pub mod selector;
pub mod sink;
pub mod stopping;
pub mod types;

// Re-export main types
pub use accumulator::{ConfidenceAccumulator, HopContext, HopEvent, HopUpdate};
pub use bander::ConfidenceBander;
pub use config::{CategoryPrior, EngineConfig};
pub use discovery::{DiscoveryEngine, DiscoveryState, EntityRun};
pub use fetcher::{
    EvidenceFetcher, FetchError, FetchedContent, HttpEvidenceFetcher, RetryingFetcher,
    SearchResult, StaticFetcher,
};
pub use pool::{DiscoveryPool, EntityLease, LeaseTable, PoolFailure, PoolReport};
pub use query::{ExclusionFilter, HopOutcome, HopStrategy, QueryGenerator};
pub use ralph::{RalphPipeline, RejectLedger, ValidationReport};
pub use reporting::DiscoveryReport;
pub use selector::{expected_information_gain, HopSelector, Selection};
pub use sink::{
    Episode, EpisodeId, InMemoryKnowledgeSink, KnowledgeSink, SinkError, SinkWriter, WriteOutcome,
};
pub use stopping::{StopReason, StoppingController};
pub use types::{CancellationFlag, EngineError, Result};
