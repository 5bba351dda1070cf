//! Tracked organizational entities.

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Priority tier of a tracked entity.
///
/// Lower tiers are worked first when the pool has more entities than workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    /// Strategic accounts
    Tier1 = 1,
    /// Standard coverage
    Tier2 = 2,
    /// Opportunistic coverage
    Tier3 = 3,
}

impl Default for PriorityTier {
    fn default() -> Self {
        Self::Tier2
    }
}

/// An organization whose procurement signals are tracked.
///
/// Identity (`id`, `name`, `cluster`) is fixed at registration; the tier may
/// be changed as priorities move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Entity {
    /// Stable identifier
    pub id: String,
    /// Display name, used in search queries
    pub name: String,
    /// Category / cluster the entity belongs to (e.g. "football_club")
    pub cluster: String,
    /// Current priority tier
    #[serde(default)]
    pub priority_tier: PriorityTier,
}

impl Entity {
    /// Register a new entity with the default tier.
    pub fn new(id: impl Into<String>, name: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cluster: cluster.into(),
            priority_tier: PriorityTier::default(),
        }
    }

    /// Set the priority tier.
    pub fn with_tier(mut self, tier: PriorityTier) -> Self {
        self.priority_tier = tier;
        self
    }
}
