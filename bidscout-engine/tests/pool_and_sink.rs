//! Worker pool, lease and knowledge sink integration tests
//!
//! - One worker per entity at a time
//! - Priority ordering and cancellation across a pool run
//! - Outbox behaviour while the sink is unreachable
//! - Configuration rejected before any entity runs
//! - Aggregate report over pool output

mod common;

use std::sync::Arc;

use bidscout_engine::reporting::DiscoveryReport;
use bidscout_engine::{
    CancellationFlag, DiscoveryEngine, DiscoveryPool, EngineError, InMemoryKnowledgeSink,
    SearchResult, SinkWriter, StaticFetcher,
};
use bidscout_model::{Band, Entity, HopType, PriorityTier};

use common::*;

// =============================================================================
// Leases
// =============================================================================

#[tokio::test]
async fn test_held_lease_blocks_second_worker() {
    let h = harness(
        single_category_config("CRM", 0.55),
        StaticFetcher::new(),
        ScriptedEvaluator::failing(),
    );
    let pool = DiscoveryPool::new(h.engine.clone(), &h.engine.config().pool);

    let held = pool.leases().acquire("arsenal", "external").unwrap();
    let result = pool.run_one(&arsenal(), &CancellationFlag::new()).await;
    assert!(matches!(result, Err(EngineError::LeaseHeld(id)) if id == "arsenal"));

    drop(held);
    let run = tokio_test::assert_ok!(pool.run_one(&arsenal(), &CancellationFlag::new()).await);
    assert_eq!(run.entity_id(), "arsenal");
    assert!(pool.leases().is_empty());
}

#[tokio::test]
async fn test_pool_runs_each_entity_once() {
    let mut config = single_category_config("CRM", 0.55);
    config.pool.max_workers = 2;
    let h = harness(config, StaticFetcher::new(), ScriptedEvaluator::failing());
    let pool = DiscoveryPool::new(h.engine.clone(), &h.engine.config().pool);

    let entities = vec![
        Entity::new("spurs", "Tottenham Hotspur", "football_club").with_tier(PriorityTier::Tier3),
        Entity::new("chelsea", "Chelsea", "football_club"),
        Entity::new("arsenal", "Arsenal", "football_club").with_tier(PriorityTier::Tier1),
        Entity::new("chelsea", "Chelsea", "football_club"),
    ];
    let report = pool.run(entities, &CancellationFlag::new()).await;

    let order: Vec<&str> = report.runs.iter().map(|r| r.entity_id()).collect();
    assert_eq!(order, vec!["arsenal", "chelsea", "spurs"]);
    assert!(report.failures.is_empty());
    assert!(pool.leases().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_worker_dispatches_by_priority() {
    let mut config = single_category_config("CRM", 0.55);
    config.pool.max_workers = 1;
    let fetcher = ["Arsenal", "Chelsea", "Tottenham"]
        .into_iter()
        .fold(StaticFetcher::new(), |fetcher, name| {
            let url = format!("https://www.example.com/{}/tender", name.to_lowercase());
            fetcher
                .with_results(name, vec![SearchResult::new(format!("{} tender", name), &url, "Tender")])
                .with_page(url, format!("{} invites tenders for a CRM platform.", name))
        });
    let h = harness(config, fetcher, ScriptedEvaluator::failing());
    let pool = DiscoveryPool::new(h.engine.clone(), &h.engine.config().pool);

    let entities = vec![
        Entity::new("spurs", "Tottenham Hotspur", "football_club").with_tier(PriorityTier::Tier3),
        Entity::new("chelsea", "Chelsea", "football_club"),
        Entity::new("arsenal", "Arsenal", "football_club").with_tier(PriorityTier::Tier1),
    ];
    let report = pool.run(entities, &CancellationFlag::new()).await;

    assert_eq!(report.runs.len(), 3);
    assert_eq!(h.evaluator.entity_order(), vec!["arsenal", "chelsea", "spurs"]);
    assert!(pool.leases().is_empty());
}

#[tokio::test]
async fn test_cancelled_pool_runs_nothing() {
    let h = harness(
        single_category_config("CRM", 0.55),
        StaticFetcher::new(),
        ScriptedEvaluator::failing(),
    );
    let pool = DiscoveryPool::new(h.engine.clone(), &h.engine.config().pool);
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let report = pool
        .run(vec![arsenal(), Entity::new("chelsea", "Chelsea", "football_club")], &cancel)
        .await;

    assert!(report.runs.is_empty());
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().all(|f| f.error.contains("cancelled")));
}

// =============================================================================
// Knowledge sink outbox
// =============================================================================

#[tokio::test]
async fn test_unavailable_sink_queues_validated_signals() {
    let h = harness(
        single_category_config("Digital Transformation", 0.60),
        document_fetcher(),
        ScriptedEvaluator::returning(tender_pack_evaluation()),
    );
    h.sink.set_available(false);

    let run = h.engine.run_entity(&arsenal(), &CancellationFlag::new()).await;

    // Validation state is kept; nothing is lost or rolled back
    assert_eq!(run.validation.validated.len(), 11);
    assert_eq!(run.episodes_written, 0);
    assert_eq!(run.episodes_queued, 11);
    assert_eq!(h.engine.sink().pending_count().await, 11);
    assert!(h.sink.is_empty());

    h.sink.set_available(true);
    let flushed = h.engine.sink().flush_pending().await;
    assert_eq!(flushed.len(), 11);
    assert_eq!(h.sink.len(), 11);
    assert_eq!(h.engine.sink().pending_count().await, 0);
}

#[tokio::test]
async fn test_pool_flushes_outbox_at_end() {
    let h = harness(
        single_category_config("Digital Transformation", 0.60),
        document_fetcher(),
        ScriptedEvaluator::returning(tender_pack_evaluation()),
    );
    let pool = DiscoveryPool::new(h.engine.clone(), &h.engine.config().pool);

    h.sink.set_available(false);
    let first = pool.run(vec![arsenal()], &CancellationFlag::new()).await;
    assert_eq!(first.pending_episodes, 11);

    h.sink.set_available(true);
    let second = pool.run(vec![arsenal()], &CancellationFlag::new()).await;
    assert_eq!(second.pending_episodes, 0);
    assert_eq!(h.sink.len(), 11);
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_invalid_config_rejected_before_any_run() {
    let mut config = single_category_config("CRM", 0.55);
    config.banding.confident_threshold = 0.9;

    let result = DiscoveryEngine::new(
        config,
        Arc::new(StaticFetcher::new()),
        Arc::new(ScriptedEvaluator::failing()),
        SinkWriter::new(Arc::new(InMemoryKnowledgeSink::new())),
    );
    assert!(matches!(result, Err(EngineError::Config(_))));
}

#[test]
fn test_categories_sharing_a_hypothesis_id_rejected() {
    let mut config = single_category_config("Data & Analytics", 0.55);
    config.categories.push(bidscout_engine::CategoryPrior::new(
        "Data Analytics",
        "{entity} is buying analytics",
        0.55,
        0.5,
    ));
    let evaluator = Arc::new(ScriptedEvaluator::returning(tender_pack_evaluation()));

    let result = DiscoveryEngine::new(
        config,
        Arc::new(document_fetcher()),
        evaluator.clone(),
        SinkWriter::new(Arc::new(InMemoryKnowledgeSink::new())),
    );
    assert!(matches!(result, Err(EngineError::Config(msg)) if msg.contains("same hypothesis")));
    assert_eq!(evaluator.evaluations(), 0);
}

// =============================================================================
// Reporting
// =============================================================================

#[tokio::test]
async fn test_report_over_pool_output() {
    let h = harness(
        single_category_config("Digital Transformation", 0.60),
        document_fetcher(),
        ScriptedEvaluator::returning(tender_pack_evaluation()),
    );
    let pool = DiscoveryPool::new(h.engine.clone(), &h.engine.config().pool);

    let report = pool.run(vec![arsenal()], &CancellationFlag::new()).await;
    let summary = DiscoveryReport::build(&report.runs, &h.engine.config().reporting);

    assert_eq!(summary.entities, 1);
    assert_eq!(summary.band_distribution.count(Band::Actionable), 1);
    assert_eq!(summary.validation.candidates, 11);
    assert_eq!(summary.validation.validated, 11);
    assert_eq!(summary.episodes_written, 11);

    let rfp = summary.sources.iter().find(|s| s.hop_type == HopType::RfpPage).unwrap();
    assert_eq!(rfp.attempts, 11);
    assert_eq!(rfp.validated_signals, 11);
    assert!((rfp.impact - 0.24).abs() < 1e-9);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["funnel"]["stages"][3]["band"], "ACTIONABLE");
}
