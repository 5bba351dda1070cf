//! Worker pool with per-entity leases.
//!
//! Entities are discovered concurrently, at most `max_workers` at a time.
//! A lease guarantees a single worker per entity; leases are released when
//! the guard drops, including on panic.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use bidscout_model::Entity;

use crate::config::PoolConfig;
use crate::discovery::{DiscoveryEngine, EntityRun};
use crate::types::{CancellationFlag, EngineError, Result};

/// Holder of an entity lease.
#[derive(Debug, Clone)]
pub struct LeaseInfo {
    /// Worker holding the lease
    pub worker_id: String,
    /// When the lease was taken
    pub acquired_at: DateTime<Utc>,
}

/// Table of active entity leases.
#[derive(Debug, Default)]
pub struct LeaseTable {
    leases: DashMap<String, LeaseInfo>,
}

impl LeaseTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for an entity, failing if another worker holds it.
    pub fn acquire(self: &Arc<Self>, entity_id: &str, worker_id: &str) -> Result<EntityLease> {
        match self.leases.entry(entity_id.to_string()) {
            Entry::Occupied(held) => {
                debug!(
                    entity_id = %entity_id,
                    holder = %held.get().worker_id,
                    "Lease already held"
                );
                Err(EngineError::LeaseHeld(entity_id.to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(LeaseInfo {
                    worker_id: worker_id.to_string(),
                    acquired_at: Utc::now(),
                });
                Ok(EntityLease {
                    table: Arc::clone(self),
                    entity_id: entity_id.to_string(),
                })
            }
        }
    }

    /// Whether an entity is leased.
    pub fn is_leased(&self, entity_id: &str) -> bool {
        self.leases.contains_key(entity_id)
    }

    /// Current holder of an entity's lease.
    pub fn holder(&self, entity_id: &str) -> Option<LeaseInfo> {
        self.leases.get(entity_id).map(|l| l.value().clone())
    }

    /// Number of active leases.
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    /// Whether no lease is held.
    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}

/// RAII guard for an entity lease.
#[derive(Debug)]
pub struct EntityLease {
    table: Arc<LeaseTable>,
    entity_id: String,
}

impl EntityLease {
    /// Leased entity.
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }
}

impl Drop for EntityLease {
    fn drop(&mut self) {
        self.table.leases.remove(&self.entity_id);
    }
}

/// An entity the pool could not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolFailure {
    /// Entity affected
    pub entity_id: String,
    /// What went wrong
    pub error: String,
}

/// Result of a pool run.
#[derive(Debug, Clone, Default)]
pub struct PoolReport {
    /// Completed or cancelled entity runs, in scheduling order
    pub runs: Vec<EntityRun>,
    /// Entities that never ran or whose worker failed
    pub failures: Vec<PoolFailure>,
    /// Episodes still waiting for the sink after the final flush
    pub pending_episodes: usize,
}

impl PoolReport {
    /// Runs that ended by cancellation.
    pub fn cancelled(&self) -> usize {
        self.runs.iter().filter(|r| r.cancelled()).count()
    }
}

/// Runs discovery over many entities.
pub struct DiscoveryPool {
    engine: Arc<DiscoveryEngine>,
    leases: Arc<LeaseTable>,
    semaphore: Arc<Semaphore>,
    max_workers: usize,
}

impl DiscoveryPool {
    /// Create a pool with its own lease table.
    pub fn new(engine: Arc<DiscoveryEngine>, config: &PoolConfig) -> Self {
        let max_workers = config.max_workers.max(1);
        Self {
            engine,
            leases: Arc::new(LeaseTable::new()),
            semaphore: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    /// Share a lease table with other pools.
    pub fn with_leases(mut self, leases: Arc<LeaseTable>) -> Self {
        self.leases = leases;
        self
    }

    /// The lease table in use.
    pub fn leases(&self) -> &Arc<LeaseTable> {
        &self.leases
    }

    /// Run one entity under its lease.
    pub async fn run_one(&self, entity: &Entity, cancel: &CancellationFlag) -> Result<EntityRun> {
        let _lease = self.leases.acquire(&entity.id, "direct")?;
        Ok(self.engine.run_entity(entity, cancel).await)
    }

    /// Discover every entity, highest priority tier first.
    ///
    /// Workers are dispatched in queue order as permits free up. Entities
    /// not yet dispatched when cancellation is requested are reported as
    /// failures; started ones stop at their next hop boundary.
    pub async fn run(&self, entities: Vec<Entity>, cancel: &CancellationFlag) -> PoolReport {
        let mut seen = HashSet::new();
        let mut queue: Vec<Entity> = entities
            .into_iter()
            .filter(|e| {
                let fresh = seen.insert(e.id.clone());
                if !fresh {
                    warn!(entity_id = %e.id, "Duplicate entity skipped");
                }
                fresh
            })
            .collect();
        queue.sort_by(|a, b| a.priority_tier.cmp(&b.priority_tier).then_with(|| a.id.cmp(&b.id)));

        info!(entities = queue.len(), workers = self.max_workers, "Starting discovery pool");

        // Permits are taken here, in queue order, so workers start by priority
        let mut report = PoolReport::default();
        let mut handles = Vec::with_capacity(queue.len());
        for (slot, entity) in queue.into_iter().enumerate() {
            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    report.failures.push(PoolFailure {
                        entity_id: entity.id.clone(),
                        error: EngineError::Worker("worker pool closed".to_string()).to_string(),
                    });
                    continue;
                }
            };
            if cancel.is_cancelled() {
                debug!(entity_id = %entity.id, "Cancelled before dispatch");
                report.failures.push(PoolFailure {
                    error: EngineError::Cancelled(entity.id.clone()).to_string(),
                    entity_id: entity.id,
                });
                continue;
            }

            let engine = Arc::clone(&self.engine);
            let leases = Arc::clone(&self.leases);
            let cancel = cancel.clone();
            let worker_id = format!("worker-{}", slot % self.max_workers);
            let entity_id = entity.id.clone();

            debug!(entity_id = %entity_id, worker_id = %worker_id, "Dispatching entity");
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let _lease = leases.acquire(&entity.id, &worker_id)?;
                Ok::<_, EngineError>(engine.run_entity(&entity, &cancel).await)
            });
            handles.push((entity_id, handle));
        }

        let (ids, tasks): (Vec<String>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(tasks).await;

        for (entity_id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(Ok(run)) => report.runs.push(run),
                Ok(Err(e)) => {
                    warn!(entity_id = %entity_id, error = %e, "Entity not discovered");
                    report.failures.push(PoolFailure {
                        entity_id,
                        error: e.to_string(),
                    });
                }
                Err(join_error) => {
                    error!(entity_id = %entity_id, error = %join_error, "Worker task failed");
                    report.failures.push(PoolFailure {
                        entity_id,
                        error: EngineError::Worker(join_error.to_string()).to_string(),
                    });
                }
            }
        }

        self.engine.sink().flush_pending().await;
        report.pending_episodes = self.engine.sink().pending_count().await;

        info!(
            completed = report.runs.len(),
            cancelled = report.cancelled(),
            failed = report.failures.len(),
            pending_episodes = report.pending_episodes,
            "Discovery pool finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_is_exclusive() {
        let table = Arc::new(LeaseTable::new());
        let lease = table.acquire("arsenal", "worker-0").unwrap();
        assert_eq!(lease.entity_id(), "arsenal");

        let second = table.acquire("arsenal", "worker-1");
        assert!(matches!(second, Err(EngineError::LeaseHeld(id)) if id == "arsenal"));
        assert_eq!(table.holder("arsenal").unwrap().worker_id, "worker-0");

        assert!(table.acquire("chelsea", "worker-1").is_ok());
    }

    #[test]
    fn test_lease_released_on_drop() {
        let table = Arc::new(LeaseTable::new());
        {
            let _lease = table.acquire("arsenal", "worker-0").unwrap();
            assert!(table.is_leased("arsenal"));
        }
        assert!(!table.is_leased("arsenal"));
        assert!(table.acquire("arsenal", "worker-1").is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_acquire_single_winner() {
        let table = Arc::new(LeaseTable::new());
        let tasks = (0..16).map(|i| {
            let table = Arc::clone(&table);
            tokio::spawn(async move { table.acquire("arsenal", &format!("worker-{}", i)).map(std::mem::forget) })
        });

        let winners = join_all(tasks)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(()))))
            .count();
        assert_eq!(winners, 1);
    }
}
