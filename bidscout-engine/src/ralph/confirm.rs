//! Pass 3: final consistency confirmation.

use std::collections::{BTreeSet, HashSet};

use bidscout_model::CandidateSignal;

/// `(entity_id, category)` pairs with a REJECT in the current run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RejectLedger {
    entries: BTreeSet<(String, String)>,
}

impl RejectLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from an entity's rejected hypothesis categories.
    pub fn for_entity<'a>(entity_id: &str, categories: impl IntoIterator<Item = &'a String>) -> Self {
        let mut ledger = Self::new();
        for category in categories {
            ledger.record(entity_id, category);
        }
        ledger
    }

    /// Record a rejection.
    pub fn record(&mut self, entity_id: &str, category: &str) {
        self.entries.insert((entity_id.to_string(), category.to_string()));
    }

    /// Whether the pair has a recorded rejection.
    pub fn contains(&self, entity_id: &str, category: &str) -> bool {
        self.entries.contains(&(entity_id.to_string(), category.to_string()))
    }

    /// Number of recorded pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was rejected.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sequential confirmation against the run's rejections and earlier
/// confirmations.
pub struct FinalConfirmation<'a> {
    ledger: &'a RejectLedger,
    confirmed: HashSet<String>,
}

impl<'a> FinalConfirmation<'a> {
    /// Start a confirmation pass over a batch.
    pub fn new(ledger: &'a RejectLedger) -> Self {
        Self {
            ledger,
            confirmed: HashSet::new(),
        }
    }

    /// Confirm the next candidate in batch order.
    pub fn check(&mut self, signal: &CandidateSignal) -> Result<(), String> {
        if self.ledger.contains(&signal.entity_id, &signal.category) {
            return Err(format!(
                "contradicted by a rejection of category {} for {}",
                signal.category, signal.entity_id
            ));
        }
        if !self.confirmed.insert(signal.id.clone()) {
            return Err(format!("duplicate of signal {} in this batch", signal.id));
        }
        Ok(())
    }
}
