//! Domain model for procurement signal discovery.
//!
//! Shared by the evaluator boundary (`bidscout-agent`) and the discovery
//! engine (`bidscout-engine`). Everything here is plain data plus the few
//! pure rules that must hold wherever the data travels:
//!
//! - **Hypotheses** carry a bounded confidence and a one-way status machine
//! - **Hop types** are a closed set; per-hop defaults are exhaustive matches
//! - **Signals** get deterministic ids so knowledge-sink writes stay idempotent
//! - **Validated signals** can only be built from three in-order PASS records
//!
//! With the `typescript` feature enabled, the reporting-facing types derive
//! `ts_rs::TS` for the dashboard.

pub mod band;
pub mod entity;
pub mod evidence;
pub mod hop;
pub mod hypothesis;
pub mod signal;

pub use band::{Band, ConfidenceBand};
pub use entity::{Entity, PriorityTier};
pub use evidence::EvidenceItem;
pub use hop::{HopAttempt, HopType};
pub use hypothesis::{Decision, Finding, Hypothesis, HypothesisStatus, ParseDecisionError};
pub use signal::{
    signal_id, CandidateSignal, RalphPass, SignalType, ValidatedSignal, ValidationRecord, Verdict,
};
