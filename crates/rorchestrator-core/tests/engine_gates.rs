// rorchestrator-core/tests/engine_gates.rs
// ============================================================================
// Module: Engine Gate Tests
// Description: Tests for gate-driven skipping during stage execution.
// ============================================================================
//! ## Overview
//! Validates that denied gates skip modules without invocation, that skip
//! reason codes flow into outcomes and metrics, and that selector failures
//! abort the invocation.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod support;

use std::sync::Arc;

use rorchestrator_core::Engine;
use rorchestrator_core::FlowBlueprint;
use rorchestrator_core::FlowContext;
use rorchestrator_core::Outcome;
use rorchestrator_core::OutcomeKind;
use rorchestrator_core::StageContract;
use rorchestrator_core::codes;
use rorchestrator_core::compile;
use rorchestrator_core::runtime::observe;
use rorchestrator_core::testing::InvocationCollector;
use rorchestrator_core::testing::RecordingMetrics;
use rorchestrator_core::testing::RecordingObserver;
use rorchestrator_core::testing::StaticSnapshotProvider;
use rorchestrator_gate::ReasonCode;
use rorchestrator_gate::reason;
use serde_json::json;
use support::Req;
use support::stage_patch_json;
use support::test_catalog;

/// Builds the gate-deny flow plan over a join counting ok outcomes.
fn gated_plan(
    catalog: &rorchestrator_core::ModuleCatalog,
) -> rorchestrator_core::PlanTemplate<Req, u32> {
    let blueprint = FlowBlueprint::<Req, u32>::builder("Gated")
        .stage("s1", StageContract::default())
        .join("finish", |outcomes, _ctx| {
            let ran = outcomes
                .iter()
                .filter(|entry| entry.outcome.kind() == OutcomeKind::Ok)
                .count();
            Outcome::Ok(u32::try_from(ran).unwrap_or(0))
        })
        .build()
        .unwrap();
    compile(&blueprint, catalog).unwrap()
}

/// Tests the gate-deny scenario: m1 skipped, m2 runs normally.
#[tokio::test(flavor = "multi_thread")]
async fn test_gate_deny_skips_without_invocation() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = Arc::new(test_catalog(&collector));
    let plan = gated_plan(&catalog);

    let patch = stage_patch_json("Gated", "s1", &json!({
        "modules": [
            {
                "id": "m1",
                "use": "test.noop",
                "gate": { "experiment": { "layer": "L", "variants": ["A"] } }
            },
            { "id": "m2", "use": "test.noop" }
        ]
    }));

    let observer = Arc::new(RecordingObserver::new());
    let metrics = Arc::new(RecordingMetrics::new());
    let engine = Engine::new(Arc::clone(&catalog))
        .with_observability(
            Arc::clone(&observer) as Arc<dyn rorchestrator_core::FlowObserver>,
            Arc::clone(&metrics) as Arc<dyn rorchestrator_core::FlowMetrics>,
        );
    let ctx = Arc::new(
        FlowContext::builder()
            .snapshot_provider(Arc::new(StaticSnapshotProvider::from_patch(1, patch)))
            .variant("L", "B")
            .explain()
            .build(),
    );

    let outcome = engine.execute(&plan, 0u32, Arc::clone(&ctx)).await;

    // Only m2 produced an ok outcome; m1 was never invoked.
    assert_eq!(outcome, Outcome::Ok(1));
    assert_eq!(collector.count(), 1);
    assert_eq!(collector.invocations()[0].module_id, "m2");

    let explain = ctx.take_explain().unwrap();
    let skipped = explain
        .records
        .iter()
        .find(|record| record.module_id.as_deref() == Some("m1"))
        .unwrap();
    assert_eq!(skipped.outcome_kind, "skipped");
    assert_eq!(skipped.outcome_code, reason::VARIANT_MISMATCH);
    let decision = skipped.gate.as_ref().unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason_code, reason::VARIANT_MISMATCH);

    // Skipped modules get no invocation span, only counters.
    assert_eq!(observer.count_of(observe::SPAN_FANOUT_MODULE), 1);
    assert_eq!(
        metrics.counter_with_tag(
            observe::CTR_STEP_SKIPPED,
            observe::TAG_SKIP_CODE,
            reason::VARIANT_MISMATCH
        ),
        1
    );
}

/// Tests that a matching variant lets the gated module run.
#[tokio::test(flavor = "multi_thread")]
async fn test_gate_allow_runs_module() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = Arc::new(test_catalog(&collector));
    let plan = gated_plan(&catalog);

    let patch = stage_patch_json("Gated", "s1", &json!({
        "modules": [
            {
                "id": "m1",
                "use": "test.noop",
                "gate": { "experiment": { "layer": "L", "variants": ["A"] } }
            }
        ]
    }));

    let engine = Engine::new(Arc::clone(&catalog));
    let ctx = Arc::new(
        FlowContext::builder()
            .snapshot_provider(Arc::new(StaticSnapshotProvider::from_patch(1, patch)))
            .variant("L", "A")
            .build(),
    );

    let outcome = engine.execute(&plan, 0u32, ctx).await;
    assert_eq!(outcome, Outcome::Ok(1));
    assert_eq!(collector.count(), 1);
}

/// Tests that selector gates without a registry abort the invocation.
#[tokio::test(flavor = "multi_thread")]
async fn test_selector_gate_without_registry_is_fatal() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = Arc::new(test_catalog(&collector));
    let plan = gated_plan(&catalog);

    let patch = stage_patch_json("Gated", "s1", &json!({
        "modules": [
            { "id": "m1", "use": "test.noop", "gate": { "selector": "beta" } }
        ]
    }));

    let engine = Engine::new(Arc::clone(&catalog));
    let ctx = Arc::new(
        FlowContext::builder()
            .snapshot_provider(Arc::new(StaticSnapshotProvider::from_patch(1, patch)))
            .build(),
    );

    let outcome = engine.execute(&plan, 0u32, ctx).await;
    assert_eq!(outcome, Outcome::Error(ReasonCode::new(codes::GATE_SELECTOR_UNAVAILABLE)));
    assert_eq!(collector.count(), 0);
}

/// Tests that rollout gates partition on the context's user id.
#[tokio::test(flavor = "multi_thread")]
async fn test_rollout_gate_uses_context_user() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = Arc::new(test_catalog(&collector));
    let plan = gated_plan(&catalog);

    let patch = stage_patch_json("Gated", "s1", &json!({
        "modules": [
            {
                "id": "m1",
                "use": "test.noop",
                "gate": { "rollout": { "percent": 100, "salt": "s" } }
            },
            {
                "id": "m2",
                "use": "test.noop",
                "gate": { "rollout": { "percent": 0, "salt": "s" } }
            }
        ]
    }));

    let engine = Engine::new(Arc::clone(&catalog));
    let ctx = Arc::new(
        FlowContext::builder()
            .snapshot_provider(Arc::new(StaticSnapshotProvider::from_patch(1, patch)))
            .user_id("u42")
            .explain()
            .build(),
    );

    let outcome = engine.execute(&plan, 0u32, Arc::clone(&ctx)).await;
    assert_eq!(outcome, Outcome::Ok(1));

    let explain = ctx.take_explain().unwrap();
    let denied = explain
        .records
        .iter()
        .find(|record| record.module_id.as_deref() == Some("m2"))
        .unwrap();
    assert_eq!(denied.outcome_code, reason::ROLLOUT_FALSE);
}
