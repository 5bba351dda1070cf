//! Aggregate reporting over entity runs.
//!
//! Everything here is derived from run outputs (hop attempts, validation
//! records, validated signals and bands); nothing is stored separately.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[cfg(feature = "typescript")]
use ts_rs::TS;

use bidscout_model::{Band, HopType, HypothesisStatus, RalphPass};

use crate::config::ReportingConfig;
use crate::discovery::EntityRun;

/// Entities in one band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct BandCount {
    pub band: Band,
    pub entities: usize,
}

/// Entities per band, lowest band first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct BandDistribution {
    pub counts: Vec<BandCount>,
    pub total: usize,
}

impl BandDistribution {
    /// Count entities per band.
    pub fn from_runs(runs: &[EntityRun]) -> Self {
        let counts = Band::ALL
            .iter()
            .map(|band| BandCount {
                band: *band,
                entities: runs.iter().filter(|r| r.band.band == *band).count(),
            })
            .collect();
        Self {
            counts,
            total: runs.len(),
        }
    }

    /// Entities in a band.
    pub fn count(&self, band: Band) -> usize {
        self.counts
            .iter()
            .find(|c| c.band == band)
            .map(|c| c.entities)
            .unwrap_or(0)
    }
}

/// Saturation and health of one entity cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ClusterHealth {
    pub cluster: String,
    pub entities: usize,
    pub hypotheses: usize,
    pub active: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub saturated: usize,
    /// Saturated share of all hypotheses
    pub saturation_ratio: f64,
    pub mean_final_confidence: f64,
    pub actionable: usize,
}

impl ClusterHealth {
    /// One entry per cluster, ordered by cluster name.
    pub fn from_runs(runs: &[EntityRun]) -> Vec<Self> {
        let mut by_cluster: BTreeMap<&str, Vec<&EntityRun>> = BTreeMap::new();
        for run in runs {
            by_cluster.entry(run.state.entity.cluster.as_str()).or_default().push(run);
        }

        by_cluster
            .into_iter()
            .map(|(cluster, runs)| {
                let count = |status: HypothesisStatus| -> usize {
                    runs.iter().map(|r| r.state.count_status(status)).sum()
                };
                let hypotheses: usize = runs.iter().map(|r| r.state.hypotheses.len()).sum();
                let saturated = count(HypothesisStatus::Saturated);

                Self {
                    cluster: cluster.to_string(),
                    entities: runs.len(),
                    hypotheses,
                    active: count(HypothesisStatus::Active),
                    accepted: count(HypothesisStatus::Accepted),
                    rejected: count(HypothesisStatus::Rejected),
                    saturated,
                    saturation_ratio: ratio(saturated as f64, hypotheses as f64),
                    mean_final_confidence: ratio(
                        runs.iter().map(|r| r.band.final_confidence).sum(),
                        runs.len() as f64,
                    ),
                    actionable: runs.iter().filter(|r| r.band.is_actionable).count(),
                }
            })
            .collect()
    }
}

/// One stage of the band funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct FunnelStage {
    pub band: Band,
    /// Entities at or above this band
    pub entities: usize,
    /// Share of the previous stage that reached this one
    pub conversion_rate: f64,
    pub bottleneck: bool,
}

/// EXPLORATORY → INFORMED → CONFIDENT → ACTIONABLE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct LifecycleFunnel {
    pub stages: Vec<FunnelStage>,
}

impl LifecycleFunnel {
    /// Build the funnel; a conversion below `threshold` from a non-empty
    /// stage is a bottleneck.
    pub fn from_runs(runs: &[EntityRun], threshold: f64) -> Self {
        let mut stages = Vec::with_capacity(Band::ALL.len());
        let mut previous: Option<usize> = None;

        for band in Band::ALL {
            let entities = runs.iter().filter(|r| r.band.band >= band).count();
            let (conversion_rate, bottleneck) = match previous {
                None => (1.0, false),
                Some(0) => (0.0, false),
                Some(prev) => {
                    let rate = entities as f64 / prev as f64;
                    (rate, rate < threshold)
                }
            };
            stages.push(FunnelStage {
                band,
                entities,
                conversion_rate,
                bottleneck,
            });
            previous = Some(entities);
        }

        Self { stages }
    }

    /// Stages flagged as bottlenecks.
    pub fn bottlenecks(&self) -> Vec<Band> {
        self.stages.iter().filter(|s| s.bottleneck).map(|s| s.band).collect()
    }
}

/// Impact and cost of one hop type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct SourceEffectiveness {
    pub hop_type: HopType,
    pub attempts: usize,
    pub productive_attempts: usize,
    pub chars_fetched: usize,
    /// Sum of positive confidence deltas
    pub impact: f64,
    /// Validated signals with evidence from this hop type
    pub validated_signals: usize,
    /// Attempts per unit of impact; absent when there was no impact
    pub cost_per_impact: Option<f64>,
}

impl SourceEffectiveness {
    /// One entry per hop type, in selection order.
    pub fn from_runs(runs: &[EntityRun]) -> Vec<Self> {
        HopType::ALL
            .iter()
            .map(|hop| {
                let attempts: Vec<_> = runs
                    .iter()
                    .flat_map(|r| r.state.attempts.iter())
                    .filter(|a| a.hop_type == *hop)
                    .collect();

                // Events of one hop share the fetch; count its characters once
                let mut hops = HashSet::new();
                let chars_fetched = attempts
                    .iter()
                    .filter(|a| hops.insert((a.hypothesis_id.as_str(), a.timestamp, a.source_url.as_str())))
                    .map(|a| a.chars_fetched)
                    .sum();

                let impact: f64 = attempts
                    .iter()
                    .map(|a| a.confidence_delta)
                    .filter(|d| *d > 0.0)
                    .sum();

                let validated_signals = runs
                    .iter()
                    .flat_map(|r| r.validation.validated.iter())
                    .filter(|v| v.signal().evidence.iter().any(|e| e.hop_type == *hop))
                    .count();

                Self {
                    hop_type: *hop,
                    attempts: attempts.len(),
                    productive_attempts: attempts.iter().filter(|a| a.decision.is_positive()).count(),
                    chars_fetched,
                    impact,
                    validated_signals,
                    cost_per_impact: (impact > 0.0).then(|| attempts.len() as f64 / impact),
                }
            })
            .collect()
    }
}

/// Validation funnel across all runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ValidationSummary {
    pub candidates: usize,
    pub pass1_rejected: usize,
    pub pass2_rejected: usize,
    pub pass3_rejected: usize,
    pub validated: usize,
}

impl ValidationSummary {
    /// Sum validation outcomes over runs.
    pub fn from_runs(runs: &[EntityRun]) -> Self {
        let mut summary = Self::default();
        for run in runs {
            let v = &run.validation;
            summary.candidates += v.attempted_at(RalphPass::RuleFilter);
            summary.pass1_rejected += v.rejected_at(RalphPass::RuleFilter);
            summary.pass2_rejected += v.rejected_at(RalphPass::LlmRevalidation);
            summary.pass3_rejected += v.rejected_at(RalphPass::FinalConfirmation);
            summary.validated += v.validated.len();
        }
        summary
    }
}

/// Aggregate report over a set of entity runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct DiscoveryReport {
    pub entities: usize,
    pub cancelled: usize,
    pub band_distribution: BandDistribution,
    pub clusters: Vec<ClusterHealth>,
    pub funnel: LifecycleFunnel,
    pub sources: Vec<SourceEffectiveness>,
    pub validation: ValidationSummary,
    pub episodes_written: usize,
    pub episodes_queued: usize,
}

impl DiscoveryReport {
    /// Build the full report.
    pub fn build(runs: &[EntityRun], config: &ReportingConfig) -> Self {
        Self {
            entities: runs.len(),
            cancelled: runs.iter().filter(|r| r.cancelled()).count(),
            band_distribution: BandDistribution::from_runs(runs),
            clusters: ClusterHealth::from_runs(runs),
            funnel: LifecycleFunnel::from_runs(runs, config.funnel_bottleneck_threshold),
            sources: SourceEffectiveness::from_runs(runs),
            validation: ValidationSummary::from_runs(runs),
            episodes_written: runs.iter().map(|r| r.episodes_written).sum(),
            episodes_queued: runs.iter().map(|r| r.episodes_queued).sum(),
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
