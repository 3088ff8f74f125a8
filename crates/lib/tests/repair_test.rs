//! # Repair Loop Tests
//!
//! Drives the validate / corrective re-query / fallback state machine with a
//! scripted analysis service.

mod common;

use crate::common::setup_tracing;
use narrativelens::prompts::CORRECTIVE_SYSTEM_PROMPT;
use narrativelens::repair::{RepairError, RepairLoop, RepairPolicy, Resolution};
use narrativelens::schema::{FieldSpec, RecordSchema};
use narrativelens::extract;
use narrativelens::tasks::AnalysisTask;
use narrativelens_test_utils::{valid_ad_response, MockAnalysisService, Scripted};
use std::sync::Arc;

fn bogus_theme_response() -> String {
    valid_ad_response().replace("Product-Centric", "Bogus")
}

fn repair_loop(max_attempts: u32) -> RepairLoop {
    RepairLoop::new(RepairPolicy { max_attempts })
}

#[tokio::test]
async fn test_valid_response_needs_no_repair() {
    setup_tracing();
    let task = AnalysisTask::ad_features("prompt");
    let service = MockAnalysisService::new();
    let raw = valid_ad_response();

    let outcome = repair_loop(3)
        .run(&task, &service, extract(&raw).unwrap(), &raw)
        .await
        .unwrap();

    assert_eq!(outcome.resolution, Resolution::Valid);
    assert_eq!(outcome.validation_passes, 1);
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn test_corrective_requery_fixes_record() {
    setup_tracing();
    let task = AnalysisTask::ad_features("prompt");
    let service = MockAnalysisService::new();
    service.push_generate(Scripted::text(&valid_ad_response()));
    let raw = bogus_theme_response();

    let outcome = repair_loop(3)
        .run(&task, &service, extract(&raw).unwrap(), &raw)
        .await
        .unwrap();

    assert_eq!(
        outcome.resolution,
        Resolution::Corrected {
            corrective_calls: 1
        }
    );
    assert_eq!(outcome.validation_passes, 2);
    assert_eq!(outcome.record.get("creative_theme"), Some("Product-Centric"));

    let calls = service.generate_calls();
    assert_eq!(calls.len(), 1);
    let (system, user) = &calls[0];
    assert_eq!(system, CORRECTIVE_SYSTEM_PROMPT);
    assert!(user.contains("`creative_theme`: \"Bogus\" is not an allowed value"));
    assert!(user.contains(&raw), "previous answer must be embedded verbatim");
    assert!(user.contains("\"Lifestyle & Aspirational\""));
}

#[tokio::test]
async fn test_exhausted_attempts_fall_back() {
    setup_tracing();
    let task = AnalysisTask::ad_features("prompt");
    let service = MockAnalysisService::new();
    service
        .push_generate(Scripted::text(&bogus_theme_response()))
        .push_generate(Scripted::text(&bogus_theme_response()));
    let raw = bogus_theme_response();

    let outcome = repair_loop(3)
        .run(&task, &service, extract(&raw).unwrap(), &raw)
        .await
        .unwrap();

    assert_eq!(
        outcome.resolution,
        Resolution::Fallback {
            fields: vec!["creative_theme".to_string()],
            corrective_calls: 2,
        }
    );
    // Three model validations plus the post-fallback check.
    assert_eq!(outcome.validation_passes, 4);
    assert_eq!(service.generate_calls().len(), 2);
    assert_eq!(outcome.record.get("creative_theme"), Some("Not Applicable"));
    // Valid fields from the last candidate are kept.
    assert_eq!(outcome.record.get("campaign_objective"), Some("Sales"));
}

#[tokio::test]
async fn test_failed_corrective_call_goes_straight_to_fallback() {
    setup_tracing();
    let task = AnalysisTask::ad_features("prompt");
    let service = MockAnalysisService::new();
    service.push_generate(Scripted::fail("service unavailable"));
    let raw = bogus_theme_response();

    let outcome = repair_loop(3)
        .run(&task, &service, extract(&raw).unwrap(), &raw)
        .await
        .unwrap();

    assert_eq!(
        outcome.resolution,
        Resolution::Fallback {
            fields: vec!["creative_theme".to_string()],
            corrective_calls: 1,
        }
    );
    assert_eq!(service.generate_calls().len(), 1);
}

#[tokio::test]
async fn test_unparseable_corrective_response_falls_back() {
    setup_tracing();
    let task = AnalysisTask::ad_features("prompt");
    let service = MockAnalysisService::new();
    service.push_generate(Scripted::text("Sorry, I cannot help with that."));
    let raw = bogus_theme_response().replace("\"talent_type\": \"Influencers\",", "");

    let outcome = repair_loop(3)
        .run(&task, &service, extract(&raw).unwrap(), &raw)
        .await
        .unwrap();

    match outcome.resolution {
        Resolution::Fallback { fields, .. } => {
            assert_eq!(fields, vec!["creative_theme", "talent_type"]);
        }
        other => panic!("expected fallback, got {other:?}"),
    }
    assert_eq!(outcome.record.get("talent_type"), Some("Unclear"));
}

#[tokio::test]
async fn test_single_attempt_budget_never_requeries() {
    setup_tracing();
    let task = AnalysisTask::ad_features("prompt");
    let service = MockAnalysisService::new();
    let raw = bogus_theme_response();

    let outcome = repair_loop(1)
        .run(&task, &service, extract(&raw).unwrap(), &raw)
        .await
        .unwrap();

    assert!(matches!(
        outcome.resolution,
        Resolution::Fallback {
            corrective_calls: 0,
            ..
        }
    ));
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn test_inadmissible_fallback_is_an_invariant_violation() {
    setup_tracing();
    let schema = RecordSchema::builder("palette")
        .field(FieldSpec::closed("color", ["Red", "Blue"]))
        .build()
        .unwrap();
    let task = AnalysisTask::new("palette", Arc::new(schema), "prompt");
    let service = MockAnalysisService::new();
    let raw = r#"{"color": "Green"}"#;

    let result = repair_loop(1)
        .run(&task, &service, extract(raw).unwrap(), raw)
        .await;

    match result {
        Err(RepairError::InvariantViolation { schema, report }) => {
            assert_eq!(schema, "palette");
            assert_eq!(report.fields(), vec!["color"]);
        }
        other => panic!("expected invariant violation, got {other:?}"),
    }
}
