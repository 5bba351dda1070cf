//! Confidence Bander.
//!
//! Maps an entity's validated signal set to an actionability band. Pure: the
//! same inputs always give the same band.

use std::collections::BTreeSet;
use tracing::debug;

use bidscout_model::{Band, ConfidenceBand, ValidatedSignal};

use crate::config::BandingConfig;

/// Round to six decimals so threshold comparisons are stable.
fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Computes entity bands.
pub struct ConfidenceBander {
    config: BandingConfig,
}

impl ConfidenceBander {
    /// Create a bander.
    pub fn new(config: BandingConfig) -> Self {
        Self { config }
    }

    /// Band for a confidence value, before the ACTIONABLE gate.
    pub fn band_for(&self, confidence: f64) -> Band {
        let c = &self.config;
        if confidence >= c.actionable_threshold {
            Band::Actionable
        } else if confidence >= c.confident_threshold {
            Band::Confident
        } else if confidence >= c.informed_threshold {
            Band::Informed
        } else {
            Band::Exploratory
        }
    }

    /// Aggregate confidence from the entity prior and validated signals.
    pub fn final_confidence(&self, entity_prior: f64, accept_count: usize, unique: usize, confidence_sum: f64) -> f64 {
        let c = &self.config;
        let mut total = c.baseline_weight * entity_prior.clamp(0.0, 1.0);
        if accept_count > 0 {
            total += c.signal_weight * confidence_sum;
            total += c.category_bonus * unique.saturating_sub(1) as f64;
        }
        round6(total.clamp(0.0, 1.0))
    }

    /// Band an entity.
    ///
    /// ACTIONABLE requires at least one validated signal and
    /// `min_unique_categories` distinct categories; otherwise it is demoted
    /// to CONFIDENT.
    pub fn band(&self, entity_id: &str, entity_prior: f64, validated: &[ValidatedSignal]) -> ConfidenceBand {
        let accept_count = validated.len();
        let unique_categories = validated
            .iter()
            .map(|v| v.signal().category.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        let confidence_sum: f64 = validated.iter().map(|v| v.signal().confidence).sum();

        let final_confidence = self.final_confidence(entity_prior, accept_count, unique_categories, confidence_sum);
        let qualifies = accept_count >= 1 && unique_categories >= self.config.min_unique_categories;

        let mut band = self.band_for(final_confidence);
        if band == Band::Actionable && !qualifies {
            band = Band::Confident;
        }
        let is_actionable = band >= Band::Confident && qualifies;

        debug!(
            entity_id = %entity_id,
            final_confidence,
            band = %band,
            accept_count,
            unique_categories,
            "Entity banded"
        );

        ConfidenceBand {
            entity_id: entity_id.to_string(),
            final_confidence,
            band,
            accept_count,
            unique_categories,
            is_actionable,
        }
    }
}
