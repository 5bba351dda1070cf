//! Ralph validation gate integration tests
//!
//! Covers cost staging (Pass 1 before any evaluator call), hard rejects,
//! contradiction handling against the run's REJECT ledger, and the
//! completeness of every validated signal's trail.

mod common;

use std::sync::Arc;

use bidscout_agent::{EvaluatedItem, Evaluation};
use bidscout_engine::config::RalphConfig;
use bidscout_engine::{CancellationFlag, RalphPipeline, RejectLedger};
use bidscout_model::{CandidateSignal, Decision, EvidenceItem, HopType, RalphPass, SignalType, Verdict};

use common::*;

fn candidate(category: &str, description: &str, confidence: f64, evidence: usize) -> CandidateSignal {
    let items = (0..evidence)
        .map(|i| {
            EvidenceItem::new(
                format!("https://www.arsenal.com/news/{}", i),
                "Arsenal is retendering its CRM",
                HopType::PressRelease,
                category,
            )
        })
        .collect();
    CandidateSignal::new(
        "arsenal",
        "hyp_arsenal_crm",
        SignalType::RfpDetected,
        category,
        description,
        confidence,
        items,
    )
}

// =============================================================================
// Pass 1 staging
// =============================================================================

#[tokio::test]
async fn test_thin_evidence_rejected_before_any_evaluator_call() {
    let evaluator = Arc::new(ScriptedEvaluator::returning(tender_pack_evaluation()));
    let pipeline = RalphPipeline::new(&RalphConfig::default(), evaluator.clone());

    let signal = candidate("CRM", "CRM replacement", 0.72, 2);
    let id = signal.id.clone();
    let report = pipeline.validate(vec![signal], &mut RejectLedger::new()).await;

    assert_eq!(evaluator.validations(), 0);
    assert!(report.validated.is_empty());

    let records = report.records_for(&id);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].pass_number, RalphPass::RuleFilter);
    assert_eq!(records[0].verdict, Verdict::Reject);
    assert!(records[0].reason().unwrap().contains("insufficient evidence"));
}

#[tokio::test]
async fn test_pass2_calls_only_for_pass1_survivors() {
    let evaluator = Arc::new(ScriptedEvaluator::returning(tender_pack_evaluation()));
    let pipeline = RalphPipeline::new(&RalphConfig::default(), evaluator.clone());

    let batch = vec![
        candidate("CRM", "CRM replacement", 0.80, 3),
        candidate("Ticketing", "Ticketing retender", 0.65, 4),
        candidate("Data & Analytics", "Data platform", 0.90, 1),
        candidate("Fan Engagement", "Fan app", 0.75, 5),
    ];
    let report = pipeline.validate(batch, &mut RejectLedger::new()).await;

    assert_eq!(evaluator.validations(), 2);
    assert_eq!(report.attempted_at(RalphPass::RuleFilter), 4);
    assert_eq!(report.attempted_at(RalphPass::LlmRevalidation), 2);
    assert_eq!(report.attempted_at(RalphPass::FinalConfirmation), 2);
    assert_eq!(report.validated.len(), 2);
}

#[tokio::test]
async fn test_pass2_concurrency_does_not_change_outcome() {
    let config = RalphConfig {
        pass2_concurrency: 4,
        ..RalphConfig::default()
    };
    let evaluator = Arc::new(ScriptedEvaluator::returning(tender_pack_evaluation()).rejecting_validation("rumour"));
    let pipeline = RalphPipeline::new(&config, evaluator.clone());

    let batch: Vec<CandidateSignal> = SIX_CATEGORIES
        .iter()
        .map(|c| candidate(c, &format!("{} tender", c), 0.8, 3))
        .chain(std::iter::once(candidate("Cloud", "cloud rumour", 0.8, 3)))
        .collect();
    let report = pipeline.validate(batch, &mut RejectLedger::new()).await;

    assert_eq!(evaluator.validations(), 7);
    assert_eq!(report.validated.len(), 6);
    assert_eq!(report.rejected_at(RalphPass::LlmRevalidation), 1);
    let order: Vec<&str> = report
        .validated
        .iter()
        .map(|v| v.signal().category.as_str())
        .collect();
    assert_eq!(order, SIX_CATEGORIES.to_vec());
}

// =============================================================================
// Pass 3 contradictions
// =============================================================================

#[tokio::test]
async fn test_prior_reject_blocks_category() {
    let evaluator = Arc::new(ScriptedEvaluator::returning(tender_pack_evaluation()));
    let pipeline = RalphPipeline::new(&RalphConfig::default(), evaluator.clone());
    let mut ledger = RejectLedger::for_entity("arsenal", &["CRM".to_string()]);

    let report = pipeline
        .validate(
            vec![
                candidate("CRM", "CRM replacement", 0.8, 3),
                candidate("Ticketing", "Ticketing retender", 0.8, 3),
            ],
            &mut ledger,
        )
        .await;

    assert_eq!(report.validated.len(), 1);
    assert_eq!(report.validated[0].signal().category, "Ticketing");
    assert_eq!(report.rejected_at(RalphPass::FinalConfirmation), 1);
}

#[tokio::test]
async fn test_validated_signals_have_three_pass_records() {
    let h = harness(
        single_category_config("Digital Transformation", 0.60),
        document_fetcher(),
        ScriptedEvaluator::returning(tender_pack_evaluation()).rejecting_validation("workstream 2 "),
    );

    let run = h.engine.run_entity(&arsenal(), &CancellationFlag::new()).await;

    // Rejecting one CRM finding at Pass 2 blocks the other CRM finding at Pass 3
    assert_eq!(run.validation.rejected_at(RalphPass::LlmRevalidation), 1);
    assert_eq!(run.validation.rejected_at(RalphPass::FinalConfirmation), 1);
    assert_eq!(run.validation.validated.len(), 9);
    assert_eq!(h.sink.len(), 9);

    for validated in &run.validation.validated {
        let passes: Vec<RalphPass> = validated.records().iter().map(|r| r.pass_number).collect();
        assert_eq!(passes, RalphPass::ORDER.to_vec());
        assert!(validated.records().iter().all(|r| r.verdict == Verdict::Pass));
        assert!(h.sink.get("arsenal", validated.id()).is_some());
    }
}

#[tokio::test]
async fn test_repeated_finding_validated_once() {
    // The same lot is reported on every event, including after acceptance
    let item = EvaluatedItem {
        decision: Decision::Accept,
        confidence_delta: 0.06,
        category: "CRM".to_string(),
        signal_type: Some(SignalType::TenderNotice),
        description: "CRM platform tender".to_string(),
        excerpt: "Lot 1: CRM platform".to_string(),
    };
    let evaluation = Evaluation {
        decision: Decision::Accept,
        confidence_delta: 0.06,
        reasoning: "Tender repeats the CRM lot".to_string(),
        items: vec![item; 4],
    };
    let h = harness(
        single_category_config("CRM", 0.60),
        document_fetcher(),
        ScriptedEvaluator::returning(evaluation),
    );

    let run = h.engine.run_entity(&arsenal(), &CancellationFlag::new()).await;
    assert_eq!(run.state.hypotheses[0].findings.len(), 4);

    assert_eq!(run.validation.validated.len(), 1);
    assert_eq!(h.evaluator.validations(), 1);
    assert_eq!(run.validation.rejected_at(RalphPass::FinalConfirmation), 0);

    let id = run.validation.validated[0].id();
    let records = run.validation.records_for(id);
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.verdict == Verdict::Pass));
    assert_eq!(h.sink.len(), 1);
}
