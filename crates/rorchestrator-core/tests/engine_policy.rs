// rorchestrator-core/tests/engine_policy.rs
// ============================================================================
// Module: Engine Policy Tests
// Description: Tests for failure policies, deadlines, and cancellation.
// ============================================================================
//! ## Overview
//! Validates short-circuit and continue stage policies, join-driven flow
//! short-circuiting, deadline termination, caller cancellation, panic
//! trapping, and snapshot unavailability.

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
use std::time::Duration;
use std::time::SystemTime;

use rorchestrator_core::Engine;
use rorchestrator_core::FlowBlueprint;
use rorchestrator_core::FlowContext;
use rorchestrator_core::FlowHost;
use rorchestrator_core::FlowRegistry;
use rorchestrator_core::Outcome;
use rorchestrator_core::OutcomeKind;
use rorchestrator_core::StageContract;
use rorchestrator_core::codes;
use rorchestrator_core::compile;
use rorchestrator_core::testing::FailingSnapshotProvider;
use rorchestrator_core::testing::InvocationCollector;
use rorchestrator_core::testing::StaticSnapshotProvider;
use rorchestrator_gate::ReasonCode;
use serde_json::json;
use support::Req;
use support::stage_patch_json;
use support::test_catalog;
use tokio_util::sync::CancellationToken;

/// Builds a single-stage plan whose join propagates the first failure.
fn propagating_plan(
    catalog: &rorchestrator_core::ModuleCatalog,
    flow: &str,
) -> rorchestrator_core::PlanTemplate<Req, u32> {
    let blueprint = FlowBlueprint::<Req, u32>::builder(flow)
        .stage("s1", StageContract::default())
        .join("finish", |outcomes, _ctx| {
            if let Some(failure) = outcomes.first_failure() {
                return Outcome::Error(ReasonCode::new(failure.outcome.code()));
            }
            Outcome::Ok(0u32)
        })
        .build()
        .unwrap();
    compile(&blueprint, catalog).unwrap()
}

/// Tests the short-circuit scenario: a failing step cancels its siblings.
#[tokio::test(start_paused = true)]
async fn test_short_circuit_cancels_inflight_steps() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = Arc::new(test_catalog(&collector));
    let plan = propagating_plan(&catalog, "Fast");

    let patch = stage_patch_json("Fast", "s1", &json!({
        "failurePolicy": "ShortCircuit",
        "modules": [
            { "id": "bad", "use": "test.fail" },
            { "id": "slow1", "use": "test.sleep" },
            { "id": "slow2", "use": "test.sleep" }
        ]
    }));

    let engine = Engine::new(Arc::clone(&catalog));
    let ctx = Arc::new(
        FlowContext::builder()
            .snapshot_provider(Arc::new(StaticSnapshotProvider::from_patch(1, patch)))
            .explain()
            .build(),
    );

    let started = tokio::time::Instant::now();
    let outcome = engine.execute(&plan, 0u32, Arc::clone(&ctx)).await;
    let elapsed = started.elapsed();

    // The 200 ms sleepers never ran to completion.
    assert_eq!(outcome, Outcome::Error(ReasonCode::new("X")));
    assert!(elapsed < Duration::from_millis(200));

    let explain = ctx.take_explain().unwrap();
    for id in ["slow1", "slow2"] {
        let record = explain
            .records
            .iter()
            .find(|record| record.module_id.as_deref() == Some(id))
            .unwrap();
        assert_eq!(record.outcome_kind, "canceled");
        assert_eq!(record.outcome_code, codes::STAGE_SHORT_CIRCUIT);
    }
}

/// Tests that a continue-policy stage waits for every step.
#[tokio::test(start_paused = true)]
async fn test_continue_policy_waits_for_all_steps() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = Arc::new(test_catalog(&collector));
    let blueprint = FlowBlueprint::<Req, u32>::builder("Patient")
        .stage("s1", StageContract {
            failure_policy: rorchestrator_core::FailurePolicy::Continue,
            fanout_max: None,
        })
        .join("finish", |outcomes, _ctx| {
            let ok = outcomes
                .iter()
                .filter(|entry| entry.outcome.kind() == OutcomeKind::Ok)
                .count();
            Outcome::Ok(u32::try_from(ok).unwrap_or(0))
        })
        .build()
        .unwrap();
    let plan = compile(&blueprint, &catalog).unwrap();

    let patch = stage_patch_json("Patient", "s1", &json!({
        "modules": [
            { "id": "bad", "use": "test.fail" },
            { "id": "slow", "use": "test.sleep" }
        ]
    }));

    let engine = Engine::new(Arc::clone(&catalog));
    let ctx = Arc::new(
        FlowContext::builder()
            .snapshot_provider(Arc::new(StaticSnapshotProvider::from_patch(1, patch)))
            .build(),
    );

    let outcome = engine.execute(&plan, 0u32, ctx).await;

    // The sleeper completed despite the sibling failure.
    assert_eq!(outcome, Outcome::Ok(1));
    assert_eq!(collector.count(), 1);
}

/// Tests that a non-ok join outcome short-circuits later stages.
#[tokio::test(flavor = "multi_thread")]
async fn test_join_failure_short_circuits_flow() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = Arc::new(test_catalog(&collector));
    let blueprint = FlowBlueprint::<Req, u32>::builder("TwoStage")
        .stage("s1", StageContract::default())
        .join("gatekeeper", |_outcomes, _ctx| -> Outcome<u32> {
            Outcome::Error(ReasonCode::new("S1_REJECTED"))
        })
        .stage("s2", StageContract::default())
        .step("later", "test.noop")
        .join("finish", |_outcomes, _ctx| Outcome::Ok(0u32))
        .build()
        .unwrap();
    let plan = compile(&blueprint, &catalog).unwrap();

    let engine = Engine::new(Arc::clone(&catalog));
    let ctx = Arc::new(FlowContext::builder().build());
    let outcome = engine.execute(&plan, 0u32, ctx).await;

    assert_eq!(outcome, Outcome::Error(ReasonCode::new("S1_REJECTED")));
    // Stage two never dispatched its step.
    assert_eq!(collector.count(), 0);
}

/// Tests deadline termination with a hanging module.
#[tokio::test(start_paused = true)]
async fn test_deadline_returns_timeout() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = Arc::new(test_catalog(&collector));
    let plan = propagating_plan(&catalog, "Slow");

    let patch = stage_patch_json("Slow", "s1", &json!({
        "modules": [ { "id": "stuck", "use": "test.hang" } ]
    }));

    let engine = Engine::new(Arc::clone(&catalog));
    let ctx = Arc::new(
        FlowContext::builder()
            .snapshot_provider(Arc::new(StaticSnapshotProvider::from_patch(1, patch)))
            .deadline(SystemTime::now() + Duration::from_millis(50))
            .explain()
            .build(),
    );

    let outcome = engine.execute(&plan, 0u32, Arc::clone(&ctx)).await;

    assert_eq!(outcome, Outcome::Timeout(ReasonCode::new(codes::FLOW_DEADLINE)));
    let explain = ctx.take_explain().unwrap();
    let record = explain
        .records
        .iter()
        .find(|record| record.module_id.as_deref() == Some("stuck"))
        .unwrap();
    assert_eq!(record.outcome_kind, "canceled");
    assert_eq!(record.outcome_code, codes::FLOW_DEADLINE);
}

/// Tests that a pre-canceled caller token yields flow cancellation.
#[tokio::test(flavor = "multi_thread")]
async fn test_caller_cancellation() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = Arc::new(test_catalog(&collector));
    let plan = propagating_plan(&catalog, "Canceled");

    let token = CancellationToken::new();
    token.cancel();
    let engine = Engine::new(Arc::clone(&catalog));
    let ctx = Arc::new(FlowContext::builder().cancel_token(token).build());

    let outcome = engine.execute(&plan, 0u32, ctx).await;

    assert_eq!(outcome, Outcome::Canceled(ReasonCode::new(codes::FLOW_CANCELED)));
    assert_eq!(collector.count(), 0);
}

/// Tests that module panics are trapped as `MODULE_EXCEPTION`.
#[tokio::test(flavor = "multi_thread")]
async fn test_module_panic_is_trapped() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = Arc::new(test_catalog(&collector));
    let plan = propagating_plan(&catalog, "Panicky");

    let patch = stage_patch_json("Panicky", "s1", &json!({
        "modules": [ { "id": "boom", "use": "test.panic" } ]
    }));

    let engine = Engine::new(Arc::clone(&catalog));
    let ctx = Arc::new(
        FlowContext::builder()
            .snapshot_provider(Arc::new(StaticSnapshotProvider::from_patch(1, patch)))
            .build(),
    );

    let outcome = engine.execute(&plan, 0u32, ctx).await;
    assert_eq!(outcome, Outcome::Error(ReasonCode::new(codes::MODULE_EXCEPTION)));
}

/// Tests that snapshot acquisition failures surface as `CFG_UNAVAILABLE`.
#[tokio::test(flavor = "multi_thread")]
async fn test_snapshot_unavailable() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = Arc::new(test_catalog(&collector));
    let plan = propagating_plan(&catalog, "NoCfg");

    let engine = Engine::new(Arc::clone(&catalog));
    let ctx = Arc::new(
        FlowContext::builder().snapshot_provider(Arc::new(FailingSnapshotProvider)).build(),
    );

    let outcome = engine.execute(&plan, 0u32, ctx).await;
    assert_eq!(outcome, Outcome::Error(ReasonCode::new(codes::CFG_UNAVAILABLE)));

    // An unparseable patch surfaces the same way.
    let ctx = Arc::new(
        FlowContext::builder()
            .snapshot_provider(Arc::new(StaticSnapshotProvider::from_patch(1, "{broken")))
            .build(),
    );
    let outcome = engine.execute(&plan, 0u32, ctx).await;
    assert_eq!(outcome, Outcome::Error(ReasonCode::new(codes::CFG_UNAVAILABLE)));
}

/// Tests flow resolution through the host registry.
#[tokio::test(flavor = "multi_thread")]
async fn test_flow_host_resolution() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = Arc::new(test_catalog(&collector));
    let plan = propagating_plan(&catalog, "Hosted");

    let mut registry = FlowRegistry::new();
    registry.register(plan);
    let host = FlowHost::new(Arc::new(registry), Engine::new(Arc::clone(&catalog)));

    let ctx = Arc::new(FlowContext::builder().build());
    let outcome: Outcome<u32> = host.execute("Hosted", 0u32, Arc::clone(&ctx)).await;
    assert_eq!(outcome, Outcome::Ok(0));

    let ctx = Arc::new(FlowContext::builder().build());
    let outcome: Outcome<u32> = host.execute("Ghost", 0u32, ctx).await;
    assert_eq!(outcome, Outcome::Error(ReasonCode::new(codes::FLOW_NOT_FOUND)));
}
