//! # Batch Orchestrator Tests
//!
//! Runs whole batches against the scripted service and the in-memory store,
//! checking work selection per mode, per-item failure isolation, and the run
//! statistics.

mod common;

use crate::common::{instant_retry, setup_tracing};
use narrativelens::assets::{AssetError, DirectoryAssetSource};
use narrativelens::orchestrator::{ItemStatus, OrchestratorError};
use narrativelens::repair::RepairPolicy;
use narrativelens::schema::{FieldSpec, RecordSchema};
use narrativelens::tasks::AnalysisTask;
use narrativelens::{BatchOrchestrator, RunMode};
use narrativelens_test_utils::{
    assets, valid_ad_response, AssetDir, Call, MemoryFeatureStore, MockAnalysisService, Scripted,
};
use std::sync::Arc;

fn orchestrator(service: &MockAnalysisService, store: &MemoryFeatureStore) -> BatchOrchestrator {
    BatchOrchestrator::new(
        Box::new(service.clone()),
        Box::new(store.clone()),
        AnalysisTask::ad_features("Analyze this ad."),
    )
    .with_retry_policy(instant_retry(3))
}

fn script_valid(service: &MockAnalysisService, count: usize) {
    for _ in 0..count {
        service.push_analyze(Scripted::text(&valid_ad_response()));
    }
}

#[tokio::test]
async fn test_incremental_run_is_idempotent() {
    setup_tracing();
    let service = MockAnalysisService::new();
    let store = MemoryFeatureStore::new();
    let batch = assets(&["ad_001", "ad_002", "ad_003"]);
    script_valid(&service, 3);

    let first = orchestrator(&service, &store)
        .run(RunMode::Incremental, &batch)
        .await
        .unwrap();
    assert_eq!(first.stats.total, 3);
    assert_eq!(first.stats.succeeded, 3);
    assert_eq!(service.analyze_calls(), 3);

    let second = orchestrator(&service, &store)
        .run(RunMode::Incremental, &batch)
        .await
        .unwrap();
    assert_eq!(second.stats.total, 0);
    assert_eq!(second.stats.skipped, 3);
    assert_eq!(
        service.analyze_calls(),
        3,
        "a second run must not call the service again"
    );
}

#[tokio::test]
async fn test_failed_item_does_not_stop_the_batch() {
    setup_tracing();
    let service = MockAnalysisService::new();
    let store = MemoryFeatureStore::new();
    let batch = assets(&["ad_001", "ad_002", "ad_003"]);
    service.fail_upload("ad_002");
    script_valid(&service, 2);

    let report = orchestrator(&service, &store)
        .run(RunMode::Incremental, &batch)
        .await
        .unwrap();

    assert_eq!(report.stats.succeeded, 2);
    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.stats.failed_ids, vec!["ad_002"]);
    let statuses: Vec<ItemStatus> = report.items.iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        vec![ItemStatus::Done, ItemStatus::Failed, ItemStatus::Done]
    );
    assert!(store.document("ad_002").is_none(), "failed items are not persisted");
    assert_eq!(store.upserts(), vec!["ad_001", "ad_003"]);

    // The failed item is picked up again by the next incremental run.
    let retry_service = MockAnalysisService::new();
    script_valid(&retry_service, 1);
    let rerun = orchestrator(&retry_service, &store)
        .run(RunMode::Incremental, &batch)
        .await
        .unwrap();
    assert_eq!(rerun.stats.total, 1);
    assert_eq!(rerun.stats.succeeded, 1);
    assert_eq!(rerun.items[0].asset.id, "ad_002");
}

#[tokio::test]
async fn test_transient_analysis_failure_is_retried() {
    setup_tracing();
    let service = MockAnalysisService::new();
    let store = MemoryFeatureStore::new();
    service
        .push_analyze(Scripted::fail("deadline exceeded"))
        .push_analyze(Scripted::text(&valid_ad_response()));

    let report = orchestrator(&service, &store)
        .run(RunMode::Incremental, &assets(&["ad_001"]))
        .await
        .unwrap();

    assert_eq!(report.stats.succeeded, 1);
    assert_eq!(
        service.calls(),
        vec![
            Call::Upload("ad_001".into()),
            Call::Analyze("ad_001".into()),
            Call::Analyze("ad_001".into()),
        ],
        "the asset is uploaded once and only the analysis call is retried"
    );
}

#[tokio::test]
async fn test_exhausted_analysis_retries_fail_the_item() {
    setup_tracing();
    let service = MockAnalysisService::new();
    let store = MemoryFeatureStore::new();
    for _ in 0..3 {
        service.push_analyze(Scripted::fail("quota exceeded"));
    }
    script_valid(&service, 1);

    let report = orchestrator(&service, &store)
        .run(RunMode::Incremental, &assets(&["ad_001", "ad_002"]))
        .await
        .unwrap();

    assert_eq!(report.stats.failed_ids, vec!["ad_001"]);
    assert_eq!(report.stats.succeeded, 1);
    assert_eq!(service.analyze_calls(), 4);
}

#[tokio::test]
async fn test_unextractable_response_fails_without_repair() {
    setup_tracing();
    let service = MockAnalysisService::new();
    let store = MemoryFeatureStore::new();
    service.push_analyze(Scripted::text("I am unable to view videos."));

    let report = orchestrator(&service, &store)
        .run(RunMode::Incremental, &assets(&["ad_001"]))
        .await
        .unwrap();

    assert_eq!(report.stats.failed, 1);
    assert!(service.generate_calls().is_empty());
    assert!(store.upserts().is_empty());
}

#[tokio::test]
async fn test_repaired_record_is_persisted() {
    setup_tracing();
    let service = MockAnalysisService::new();
    let store = MemoryFeatureStore::new();
    let bogus = valid_ad_response().replace("Product-Centric", "Bogus");
    service.push_analyze(Scripted::text(&bogus));
    service
        .push_generate(Scripted::text(&bogus))
        .push_generate(Scripted::text(&bogus));

    let report = orchestrator(&service, &store)
        .run(RunMode::Incremental, &assets(&["ad_001"]))
        .await
        .unwrap();

    assert_eq!(report.stats.succeeded, 1);
    let doc = store.document("ad_001").unwrap();
    assert_eq!(doc["creative_theme"], "Not Applicable");
    assert_eq!(doc["talent_type"], "Influencers");
}

#[tokio::test]
async fn test_dry_run_processes_first_asset_and_never_persists() {
    setup_tracing();
    let service = MockAnalysisService::new();
    let store = MemoryFeatureStore::new();
    script_valid(&service, 1);

    let report = orchestrator(&service, &store)
        .run(RunMode::Dry, &assets(&["ad_001", "ad_002"]))
        .await
        .unwrap();

    assert_eq!(report.stats.total, 1);
    assert_eq!(report.stats.succeeded, 1);
    assert_eq!(report.stats.not_found, 0);
    assert!(store.upserts().is_empty());
    let (asset_id, record) = report.preview.expect("dry run returns its record");
    assert_eq!(asset_id, "ad_001");
    assert_eq!(record.get("campaign_objective"), Some("Sales"));
}

#[tokio::test]
async fn test_restricted_run_reprocesses_done_assets() {
    setup_tracing();
    let service = MockAnalysisService::new();
    let store = MemoryFeatureStore::new();
    let batch = assets(&["holdout_1", "holdout_2"]);
    script_valid(&service, 4);

    orchestrator(&service, &store)
        .run(RunMode::Restricted, &batch)
        .await
        .unwrap();
    let second = orchestrator(&service, &store)
        .run(RunMode::Restricted, &batch)
        .await
        .unwrap();

    assert_eq!(second.stats.total, 2);
    assert_eq!(second.stats.skipped, 0);
    assert_eq!(service.analyze_calls(), 4);
}

#[tokio::test]
async fn test_duplicate_identities_are_processed_once() {
    setup_tracing();
    let service = MockAnalysisService::new();
    let store = MemoryFeatureStore::new();
    script_valid(&service, 2);

    let report = orchestrator(&service, &store)
        .run(RunMode::Restricted, &assets(&["ad_001", "ad_001", "ad_002"]))
        .await
        .unwrap();

    assert_eq!(report.stats.total, 2);
    assert_eq!(report.stats.skipped, 1);
    assert_eq!(store.upserts(), vec!["ad_001", "ad_002"]);
}

#[tokio::test]
async fn test_new_documents_are_reported_as_not_found() {
    setup_tracing();
    let service = MockAnalysisService::new();
    let store = MemoryFeatureStore::new();
    store.register("ad_001");
    script_valid(&service, 2);

    let report = orchestrator(&service, &store)
        .run(RunMode::Incremental, &assets(&["ad_001", "ad_002"]))
        .await
        .unwrap();

    assert_eq!(report.stats.succeeded, 2);
    assert_eq!(report.stats.not_found, 1);
    assert_eq!(report.stats.not_found_ids, vec!["ad_002"]);
    assert_eq!(
        report.stats.to_string(),
        "Total: 2, Success: 2, Fail: 0, Skipped: 0, Not found: 1"
    );
}

#[tokio::test]
async fn test_directory_source_feeds_the_run() {
    setup_tracing();
    let dir = AssetDir::with_files(&["b_ad.mp4", "a_ad.MP4", "notes.txt"]).unwrap();
    let source = DirectoryAssetSource::new(dir.path(), &["mp4".to_string()]);
    let service = MockAnalysisService::new();
    let store = MemoryFeatureStore::new();
    script_valid(&service, 2);

    let report = orchestrator(&service, &store)
        .run(RunMode::Incremental, &source)
        .await
        .unwrap();

    let ids: Vec<&str> = report.items.iter().map(|i| i.asset.id.as_str()).collect();
    assert_eq!(ids, vec!["a_ad", "b_ad"]);
}

#[tokio::test]
async fn test_missing_asset_root_aborts_before_any_call() {
    setup_tracing();
    let service = MockAnalysisService::new();
    let store = MemoryFeatureStore::new();
    let source = DirectoryAssetSource::new("/definitely/not/a/dir", &["mp4".to_string()]);

    let result = orchestrator(&service, &store)
        .run(RunMode::Incremental, &source)
        .await;

    assert!(matches!(
        result,
        Err(OrchestratorError::Assets(AssetError::RootNotFound(_)))
    ));
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn test_bogus_theme_is_persisted_with_its_fallback() {
    setup_tracing();
    let schema = RecordSchema::builder("two_field")
        .field(
            FieldSpec::closed("creative_theme", ["Product-Centric", "Not Applicable"])
                .with_fallback("Not Applicable"),
        )
        .field(FieldSpec::closed("talent_type", ["Actors", "Unclear"]))
        .build()
        .unwrap();
    let task = AnalysisTask::new("two_field", Arc::new(schema), "Analyze this ad.");
    let raw = r#"Sure! {"creative_theme": "Bogus", "talent_type": "Actors"}"#;

    let service = MockAnalysisService::new();
    let store = MemoryFeatureStore::new();
    service
        .push_analyze(Scripted::text(raw))
        .push_generate(Scripted::text(raw))
        .push_generate(Scripted::text(raw));

    let report = BatchOrchestrator::new(Box::new(service.clone()), Box::new(store.clone()), task)
        .with_retry_policy(instant_retry(3))
        .run(RunMode::Incremental, &assets(&["ad_001"]))
        .await
        .unwrap();

    assert_eq!(report.stats.succeeded, 1);
    assert_eq!(service.generate_calls().len(), 2);
    let doc = store.document("ad_001").unwrap();
    assert_eq!(doc.len(), 2);
    assert_eq!(doc["creative_theme"], "Not Applicable");
    assert_eq!(doc["talent_type"], "Actors");
}

#[tokio::test]
async fn test_invariant_violation_fails_only_that_item() {
    setup_tracing();
    // Neither color admits the default "Unclear" fallback.
    let schema = RecordSchema::builder("palette")
        .field(FieldSpec::closed("color", ["Red", "Blue"]))
        .build()
        .unwrap();
    let task = AnalysisTask::new("palette", Arc::new(schema), "Name the dominant color.");

    let service = MockAnalysisService::new();
    let store = MemoryFeatureStore::new();
    service
        .push_analyze(Scripted::text(r#"{"color": "Green"}"#))
        .push_analyze(Scripted::text(r#"{"color": "Red"}"#));

    let report = BatchOrchestrator::new(Box::new(service.clone()), Box::new(store.clone()), task)
        .with_retry_policy(instant_retry(1))
        .with_repair_policy(RepairPolicy { max_attempts: 1 })
        .run(RunMode::Incremental, &assets(&["a", "b"]))
        .await
        .unwrap();

    assert_eq!(report.stats.failed_ids, vec!["a"]);
    assert_eq!(report.stats.succeeded, 1);
    assert_eq!(store.upserts(), vec!["b"]);
    assert!(service.generate_calls().is_empty());
    let statuses: Vec<ItemStatus> = report.items.iter().map(|i| i.status).collect();
    assert_eq!(statuses, vec![ItemStatus::Failed, ItemStatus::Done]);
}

#[tokio::test]
async fn test_no_item_is_left_pending() {
    setup_tracing();
    let service = MockAnalysisService::new();
    let store = MemoryFeatureStore::new();
    service
        .push_analyze(Scripted::text("no json here"))
        .push_analyze(Scripted::text(&valid_ad_response()));
    service.fail_upload("ad_003");

    let report = orchestrator(&service, &store)
        .run(RunMode::Restricted, &assets(&["ad_001", "ad_002", "ad_003"]))
        .await
        .unwrap();

    assert_eq!(report.items.len(), report.stats.total);
    assert!(report
        .items
        .iter()
        .all(|item| item.status != ItemStatus::Pending));
    assert_eq!(
        report.stats.succeeded + report.stats.failed,
        report.stats.total
    );
}
