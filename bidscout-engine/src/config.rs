//! Configuration for the discovery engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use bidscout_agent::{EvaluatorConfig, RetryPolicy};
use bidscout_model::Hypothesis;

use crate::types::{EngineError, Result};

/// Number of Ralph passes; not tunable.
pub const RALPH_PASSES: u8 = 3;

/// Configuration for a discovery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Iteration budgets
    pub discovery: DiscoveryConfig,
    /// Confidence update rule
    pub accumulator: AccumulatorConfig,
    /// Exploration policy
    pub selector: SelectorConfig,
    /// Query generation and result exclusion
    pub query: QueryConfig,
    /// Validation gate
    pub ralph: RalphConfig,
    /// Band thresholds and aggregate weights
    pub banding: BandingConfig,
    /// Worker pool
    pub pool: PoolConfig,
    /// Evidence fetcher boundary
    pub fetcher: FetcherConfig,
    /// Evidence evaluator boundary
    pub evaluator: EvaluatorConfig,
    /// Aggregate reporting
    pub reporting: ReportingConfig,
    /// Hypothesis categories seeded for every entity
    pub categories: Vec<CategoryPrior>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            accumulator: AccumulatorConfig::default(),
            selector: SelectorConfig::default(),
            query: QueryConfig::default(),
            ralph: RalphConfig::default(),
            banding: BandingConfig::default(),
            pool: PoolConfig::default(),
            fetcher: FetcherConfig::default(),
            evaluator: EvaluatorConfig::default(),
            reporting: ReportingConfig::default(),
            categories: CategoryPrior::defaults(),
        }
    }
}

impl EngineConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Look up a category by name.
    pub fn category(&self, name: &str) -> Option<&CategoryPrior> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Reject out-of-range thresholds before any entity is processed.
    pub fn validate(&self) -> Result<()> {
        let a = &self.accumulator;
        check_unit("accumulator.default_accept_delta", a.default_accept_delta)?;
        check_unit("accumulator.max_accept_delta", a.max_accept_delta)?;
        check_unit("accumulator.max_weak_accept_delta", a.max_weak_accept_delta)?;
        check_unit("accumulator.acceptance_threshold", a.acceptance_threshold)?;
        check_unit("accumulator.diversity_bonus", a.diversity_bonus)?;
        check_unit("accumulator.saturation_epsilon", a.saturation_epsilon)?;
        check_unit("accumulator.saturation_factor", a.saturation_factor)?;
        if a.max_weak_accept_delta > a.max_accept_delta {
            return Err(config_error(
                "accumulator.max_weak_accept_delta must not exceed max_accept_delta",
            ));
        }
        check_positive("accumulator.min_evidence_for_accept", a.min_evidence_for_accept)?;

        let d = &self.discovery;
        check_positive("discovery.max_iterations", d.max_iterations as usize)?;
        check_positive("discovery.no_progress_limit", d.no_progress_limit as usize)?;
        check_positive("discovery.max_entity_iterations", d.max_entity_iterations as usize)?;

        check_unit("selector.default_variance", self.selector.default_variance)?;
        if !(self.selector.damping.is_finite() && self.selector.damping >= 0.0) {
            return Err(config_error("selector.damping must be a non-negative number"));
        }

        check_positive("query.results_per_query", self.query.results_per_query)?;

        let r = &self.ralph;
        check_unit("ralph.min_confidence", r.min_confidence)?;
        check_unit("ralph.credibility_floor", r.credibility_floor)?;
        check_positive("ralph.min_evidence", r.min_evidence)?;
        check_positive("ralph.pass2_concurrency", r.pass2_concurrency)?;
        if r.max_passes != RALPH_PASSES {
            return Err(config_error(format!(
                "ralph.max_passes is fixed at {}, got {}",
                RALPH_PASSES, r.max_passes
            )));
        }

        let b = &self.banding;
        check_unit("banding.baseline_weight", b.baseline_weight)?;
        check_unit("banding.signal_weight", b.signal_weight)?;
        check_unit("banding.category_bonus", b.category_bonus)?;
        check_unit("banding.informed_threshold", b.informed_threshold)?;
        check_unit("banding.confident_threshold", b.confident_threshold)?;
        check_unit("banding.actionable_threshold", b.actionable_threshold)?;
        if !(b.informed_threshold < b.confident_threshold
            && b.confident_threshold < b.actionable_threshold)
        {
            return Err(config_error("band thresholds must be strictly increasing"));
        }
        check_positive("banding.min_unique_categories", b.min_unique_categories)?;

        check_positive("pool.max_workers", self.pool.max_workers)?;
        check_positive("fetcher.max_concurrent", self.fetcher.max_concurrent)?;
        check_positive("fetcher.max_chars", self.fetcher.max_chars)?;

        check_unit(
            "reporting.funnel_bottleneck_threshold",
            self.reporting.funnel_bottleneck_threshold,
        )?;

        if self.categories.is_empty() {
            return Err(config_error("at least one category is required"));
        }
        // Each category seeds one hypothesis; their ids must not collide
        let mut keys: HashMap<String, &str> = HashMap::new();
        for category in &self.categories {
            let key = Hypothesis::category_key(&category.name);
            if key.is_empty() {
                return Err(config_error(format!(
                    "category name {:?} must contain a letter or digit",
                    category.name
                )));
            }
            check_unit(&format!("categories.{}.prior", category.name), category.prior)?;
            check_unit(&format!("categories.{}.variance", category.name), category.variance)?;
            if let Some(first) = keys.insert(key, &category.name) {
                return Err(config_error(format!(
                    "categories {:?} and {:?} map to the same hypothesis",
                    first, category.name
                )));
            }
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> EngineError {
    EngineError::Config(message.into())
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(config_error(format!("{} must be within [0, 1], got {}", name, value)))
    }
}

fn check_positive(name: &str, value: usize) -> Result<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(config_error(format!("{} must be positive", name)))
    }
}

/// Iteration budgets for the Stopping Controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Hops per hypothesis before it saturates
    pub max_iterations: u32,
    /// Consecutive unproductive hops before early saturation
    pub no_progress_limit: u32,
    /// Hops per entity across all hypotheses
    pub max_entity_iterations: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            no_progress_limit: 3,
            max_entity_iterations: 40,
        }
    }
}

/// Constants of the bounded confidence update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulatorConfig {
    /// ACCEPT delta used when the evaluator supplies none
    pub default_accept_delta: f64,
    /// Cap on a single ACCEPT event, bonus included
    pub max_accept_delta: f64,
    /// Cap on a single WEAK_ACCEPT event
    pub max_weak_accept_delta: f64,
    /// Confidence at which a hypothesis may be accepted
    pub acceptance_threshold: f64,
    /// Evidence items required alongside the threshold
    pub min_evidence_for_accept: usize,
    /// Bonus for the first ACCEPT in a category new to the entity
    pub diversity_bonus: f64,
    /// Headroom below 1.0 where deltas start shrinking
    pub saturation_epsilon: f64,
    /// Fraction of the remaining headroom a saturated delta may take
    pub saturation_factor: f64,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            default_accept_delta: 0.06,
            max_accept_delta: 0.10,
            max_weak_accept_delta: 0.03,
            acceptance_threshold: 0.75,
            min_evidence_for_accept: 3,
            diversity_bonus: 0.02,
            saturation_epsilon: 0.05,
            saturation_factor: 0.5,
        }
    }
}

/// Exploration policy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Variance prior for categories that do not set one
    pub default_variance: f64,
    /// How fast EIG decays with evidence count
    pub damping: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            default_variance: 0.5,
            damping: 0.25,
        }
    }
}

/// Query generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Search results tried per query before moving to the next query
    pub results_per_query: usize,
    /// Phrases that mark a result as unrelated (case-insensitive)
    pub exclusions: Vec<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            results_per_query: 3,
            exclusions: [
                "stadium construction",
                "hotel",
                "hospitality",
                "merchandise",
                "ticket resale",
                "catering",
                "replica kit",
                "jersey",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Validation gate parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RalphConfig {
    /// Evidence items required at Pass 1
    pub min_evidence: usize,
    /// Confidence required at Pass 1
    pub min_confidence: f64,
    /// Mean credibility required at Pass 1; no item may fall below half of it
    pub credibility_floor: f64,
    /// Number of passes; must be 3
    pub max_passes: u8,
    /// Concurrent Pass 2 evaluator calls
    pub pass2_concurrency: usize,
}

impl Default for RalphConfig {
    fn default() -> Self {
        Self {
            min_evidence: 3,
            min_confidence: 0.7,
            credibility_floor: 0.5,
            max_passes: RALPH_PASSES,
            pass2_concurrency: 1,
        }
    }
}

/// Confidence Bander parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BandingConfig {
    /// Weight of the entity prior in the aggregate
    pub baseline_weight: f64,
    /// Weight of each validated signal's confidence
    pub signal_weight: f64,
    /// Bonus per validated category beyond the first
    pub category_bonus: f64,
    /// Lower bound of INFORMED
    pub informed_threshold: f64,
    /// Lower bound of CONFIDENT
    pub confident_threshold: f64,
    /// Lower bound of ACTIONABLE
    pub actionable_threshold: f64,
    /// Distinct validated categories required for ACTIONABLE
    pub min_unique_categories: usize,
}

impl Default for BandingConfig {
    fn default() -> Self {
        Self {
            baseline_weight: 0.5,
            signal_weight: 0.05,
            category_bonus: 0.02,
            informed_threshold: 0.30,
            confident_threshold: 0.60,
            actionable_threshold: 0.80,
            min_unique_categories: 2,
        }
    }
}

/// Worker pool parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Entities discovered concurrently
    pub max_workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_workers: 4 }
    }
}

/// Evidence fetcher boundary parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Concurrent calls against the search/fetch provider
    pub max_concurrent: usize,
    /// Per-call timeout (ms)
    pub timeout_ms: u64,
    /// Characters kept from a fetched page
    pub max_chars: usize,
    /// Retry policy for network and timeout failures
    pub retry: RetryPolicy,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            timeout_ms: 15_000,
            max_chars: 20_000,
            retry: RetryPolicy::fetcher(),
        }
    }
}

/// Aggregate reporting parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Funnel conversion below this is flagged as a bottleneck
    pub funnel_bottleneck_threshold: f64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            funnel_bottleneck_threshold: 0.5,
        }
    }
}

/// A hypothesis category with its prior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPrior {
    /// Category name
    pub name: String,
    /// Statement template; `{entity}` is replaced with the entity name
    pub statement: String,
    /// Starting confidence
    pub prior: f64,
    /// Historical variance of outcomes in this category
    pub variance: f64,
}

impl CategoryPrior {
    /// Create a category prior.
    pub fn new(name: impl Into<String>, statement: impl Into<String>, prior: f64, variance: f64) -> Self {
        Self {
            name: name.into(),
            statement: statement.into(),
            prior,
            variance,
        }
    }

    /// Statement for a specific entity.
    pub fn statement_for(&self, entity_name: &str) -> String {
        self.statement.replace("{entity}", entity_name)
    }

    /// Default categories for sports and entertainment organizations.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(
                "Digital Transformation",
                "{entity} is procuring a digital transformation programme",
                0.60,
                0.5,
            ),
            Self::new("CRM", "{entity} is procuring a CRM platform", 0.55, 0.6),
            Self::new("Ticketing", "{entity} is replacing its ticketing system", 0.50, 0.4),
            Self::new(
                "Data & Analytics",
                "{entity} is procuring a data and analytics platform",
                0.55,
                0.5,
            ),
            Self::new(
                "Fan Engagement",
                "{entity} is procuring fan engagement technology",
                0.50,
                0.7,
            ),
        ]
    }
}
