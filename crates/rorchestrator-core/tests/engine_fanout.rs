// rorchestrator-core/tests/engine_fanout.rs
// ============================================================================
// Module: Engine Fan-out Tests
// Description: Tests for bounded fan-out, explain records, and counters.
// ============================================================================
//! ## Overview
//! Validates the fan-out noop scenario, blueprint-fallback step resolution,
//! and determinism of execution under a fixed snapshot.

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
use rorchestrator_core::PlanTemplate;
use rorchestrator_core::StageContract;
use rorchestrator_core::compile;
use rorchestrator_core::runtime::observe;
use rorchestrator_core::testing::InvocationCollector;
use rorchestrator_core::testing::RecordingMetrics;
use rorchestrator_core::testing::RecordingObserver;
use rorchestrator_core::testing::StaticSnapshotProvider;
use serde_json::json;
use support::Req;
use support::stage_patch_json;
use support::test_catalog;

/// Builds a join-only single-stage plan fed by config modules.
fn config_driven_plan(
    catalog: &rorchestrator_core::ModuleCatalog,
) -> PlanTemplate<Req, u32> {
    let blueprint = FlowBlueprint::<Req, u32>::builder("FanOut")
        .stage("s1", StageContract::default())
        .join("finish", |_outcomes, _ctx| Outcome::Ok(0u32))
        .build()
        .unwrap();
    compile(&blueprint, catalog).unwrap()
}

/// Tests the fan-out noop scenario: 16 modules under a bound of 8.
#[tokio::test(flavor = "multi_thread")]
async fn test_fanout_noop() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = Arc::new(test_catalog(&collector));
    let plan = config_driven_plan(&catalog);

    let modules: Vec<_> = (0..16)
        .map(|index| json!({ "id": format!("m{index}"), "use": "test.noop", "with": {} }))
        .collect();
    let patch = stage_patch_json("FanOut", "s1", &json!({
        "fanoutMax": 8,
        "modules": modules,
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
            .snapshot_provider(Arc::new(StaticSnapshotProvider::from_patch(7, patch)))
            .explain()
            .build(),
    );
    let outcome = engine.execute(&plan, 5u32, Arc::clone(&ctx)).await;

    assert_eq!(outcome, Outcome::Ok(0));
    assert_eq!(collector.count(), 16);
    assert!(collector.peak_concurrency() <= 8);

    let explain = ctx.take_explain().unwrap();
    let steps = explain.records.iter().filter(|record| record.kind == "step").count();
    let joins = explain.records.iter().filter(|record| record.kind == "join").count();
    assert_eq!(steps, 16);
    assert_eq!(joins, 1);
    // Join records follow all step records of the stage.
    assert_eq!(explain.records.last().unwrap().kind, "join");

    assert_eq!(metrics.counter_total(observe::CTR_STEP_OUTCOMES), 16);
    assert_eq!(metrics.counter_total(observe::CTR_JOIN_OUTCOMES), 1);
    assert_eq!(metrics.counter_total(observe::CTR_FLOW_OUTCOMES), 1);
    assert_eq!(observer.count_of(observe::SPAN_FANOUT_MODULE), 16);
    assert_eq!(observer.count_of(observe::SPAN_JOIN), 1);
    assert_eq!(observer.count_of(observe::SPAN_FLOW), 1);
}

/// Tests that a permit-holding sleeper saturates the fan-out bound exactly.
#[tokio::test(flavor = "multi_thread")]
async fn test_fanout_bound_respected() {
    let collector = Arc::new(InvocationCollector::new());
    let mut catalog = rorchestrator_core::ModuleCatalog::new();
    let shared = Arc::clone(&collector);
    catalog.register("test.sleep", move || support::SleepModule {
        collector: Arc::clone(&shared),
        millis: 30,
    });
    let catalog = Arc::new(catalog);
    let plan = config_driven_plan(&catalog);

    let modules: Vec<_> = (0..6)
        .map(|index| json!({ "id": format!("m{index}"), "use": "test.sleep" }))
        .collect();
    let patch = stage_patch_json("FanOut", "s1", &json!({
        "fanoutMax": 2,
        "modules": modules,
    }));

    let engine = Engine::new(Arc::clone(&catalog));
    let ctx = Arc::new(
        FlowContext::builder()
            .snapshot_provider(Arc::new(StaticSnapshotProvider::from_patch(1, patch)))
            .build(),
    );
    let outcome = engine.execute(&plan, 0u32, ctx).await;

    assert_eq!(outcome, Outcome::Ok(0));
    assert_eq!(collector.count(), 6);
    assert!(collector.peak_concurrency() <= 2);
}

/// Tests that an unconfigured stage falls back to its blueprint steps.
#[tokio::test(flavor = "multi_thread")]
async fn test_blueprint_fallback_steps() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = Arc::new(test_catalog(&collector));
    let blueprint = FlowBlueprint::<Req, u32>::builder("Static")
        .stage("s1", StageContract::default())
        .step("alpha", "test.noop")
        .step("beta", "test.noop")
        .join("finish", |outcomes, _ctx| {
            let total: u32 = outcomes
                .iter()
                .filter_map(|entry| entry.outcome.payload_ref::<u32>())
                .sum();
            Outcome::Ok(total)
        })
        .build()
        .unwrap();
    let plan = compile(&blueprint, &catalog).unwrap();

    let observer = Arc::new(RecordingObserver::new());
    let metrics = Arc::new(RecordingMetrics::new());
    let engine = Engine::new(Arc::clone(&catalog))
        .with_observability(
            Arc::clone(&observer) as Arc<dyn rorchestrator_core::FlowObserver>,
            Arc::clone(&metrics) as Arc<dyn rorchestrator_core::FlowMetrics>,
        );
    let ctx = Arc::new(FlowContext::builder().build());

    let outcome = engine.execute(&plan, 0u32, ctx).await;

    assert_eq!(outcome, Outcome::Ok(2));
    assert_eq!(collector.count(), 2);
    let ids: Vec<String> =
        collector.invocations().iter().map(|record| record.module_id.clone()).collect();
    assert!(ids.contains(&"alpha".to_string()));
    assert!(ids.contains(&"beta".to_string()));
    assert_eq!(observer.count_of(observe::SPAN_STEP), 2);
    assert_eq!(observer.count_of(observe::SPAN_FANOUT_MODULE), 0);
}

/// Tests that execution is deterministic under the same snapshot.
#[tokio::test(flavor = "multi_thread")]
async fn test_determinism_under_same_snapshot() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = Arc::new(test_catalog(&collector));
    let blueprint = FlowBlueprint::<Req, u32>::builder("Det")
        .stage("s1", StageContract::default())
        .join("finish", |outcomes, _ctx| {
            let total: u32 = outcomes
                .iter()
                .filter_map(|entry| entry.outcome.payload_ref::<u32>())
                .sum();
            Outcome::Ok(total)
        })
        .build()
        .unwrap();
    let plan = compile(&blueprint, &catalog).unwrap();
    let modules: Vec<_> = (0..5)
        .map(|index| json!({ "id": format!("m{index}"), "use": "test.noop" }))
        .collect();
    let patch = stage_patch_json("Det", "s1", &json!({ "fanoutMax": 2, "modules": modules }));
    let engine = Engine::new(Arc::clone(&catalog));

    let mut results = Vec::new();
    for _ in 0..3 {
        let ctx = Arc::new(
            FlowContext::builder()
                .snapshot_provider(Arc::new(StaticSnapshotProvider::from_patch(
                    1,
                    patch.clone(),
                )))
                .build(),
        );
        results.push(engine.execute(&plan, 0u32, ctx).await);
    }

    assert_eq!(results[0], Outcome::Ok(5));
    assert_eq!(results[0], results[1]);
    assert_eq!(results[1], results[2]);
}
