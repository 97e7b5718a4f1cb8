// rorchestrator-core/tests/plan_compiler.rs
// ============================================================================
// Module: Plan Compiler Tests
// Description: Tests for blueprint validation and compilation failures.
// ============================================================================
//! ## Overview
//! Validates builder invariants, compile-time catalog checks, and the plan
//! explain output.

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

use rorchestrator_core::BlueprintError;
use rorchestrator_core::CompileError;
use rorchestrator_core::FlowBlueprint;
use rorchestrator_core::Outcome;
use rorchestrator_core::StageContract;
use rorchestrator_core::compile;
use rorchestrator_core::testing::InvocationCollector;
use support::test_catalog;

// ============================================================================
// SECTION: Builder Validation
// ============================================================================

/// Tests that an empty flow name is rejected.
#[test]
fn test_builder_empty_flow_name() {
    let err = FlowBlueprint::<u32, u32>::builder("")
        .stage("s1", StageContract::default())
        .join("finish", |_outcomes, _ctx| Outcome::Ok(0u32))
        .build()
        .unwrap_err();
    assert_eq!(err, BlueprintError::EmptyFlowName);
}

/// Tests that a blueprint without nodes is rejected.
#[test]
fn test_builder_no_nodes() {
    let err = FlowBlueprint::<u32, u32>::builder("Feed").build().unwrap_err();
    assert_eq!(err, BlueprintError::NoNodes("Feed".to_string()));
}

/// Tests that nodes outside any stage are rejected.
#[test]
fn test_builder_node_outside_stage() {
    let err = FlowBlueprint::<u32, u32>::builder("Feed")
        .step("n1", "test.noop")
        .build()
        .unwrap_err();
    assert_eq!(err, BlueprintError::NodeOutsideStage("n1".to_string()));
}

/// Tests that duplicate node names are rejected.
#[test]
fn test_builder_duplicate_node() {
    let err = FlowBlueprint::<u32, u32>::builder("Feed")
        .stage("s1", StageContract::default())
        .step("n1", "test.noop")
        .step("n1", "test.noop")
        .join("finish", |_outcomes, _ctx| Outcome::Ok(0u32))
        .build()
        .unwrap_err();
    assert_eq!(err, BlueprintError::DuplicateNodeName("n1".to_string()));
}

/// Tests that a stage without a join is rejected.
#[test]
fn test_builder_stage_without_join() {
    let err = FlowBlueprint::<u32, u32>::builder("Feed")
        .stage("s1", StageContract::default())
        .step("n1", "test.noop")
        .build()
        .unwrap_err();
    assert_eq!(err, BlueprintError::StageWithoutJoin("s1".to_string()));
}

/// Tests that steps after the stage's join are rejected.
#[test]
fn test_builder_step_after_join() {
    let err = FlowBlueprint::<u32, u32>::builder("Feed")
        .stage("s1", StageContract::default())
        .join("finish", |_outcomes, _ctx| Outcome::Ok(0u32))
        .step("late", "test.noop")
        .build()
        .unwrap_err();
    assert_eq!(err, BlueprintError::NodeAfterJoin("late".to_string(), "s1".to_string()));
}

/// Tests that an empty module type is rejected.
#[test]
fn test_builder_empty_module_type() {
    let err = FlowBlueprint::<u32, u32>::builder("Feed")
        .stage("s1", StageContract::default())
        .step("n1", "")
        .join("finish", |_outcomes, _ctx| Outcome::Ok(0u32))
        .build()
        .unwrap_err();
    assert_eq!(err, BlueprintError::EmptyModuleType("n1".to_string()));
}

// ============================================================================
// SECTION: Compilation
// ============================================================================

/// Tests that unregistered module types fail compilation.
#[test]
fn test_compile_module_not_registered() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = test_catalog(&collector);
    let blueprint = FlowBlueprint::<u32, u32>::builder("Feed")
        .stage("s1", StageContract::default())
        .step("n1", "test.ghost")
        .join("finish", |_outcomes, _ctx| Outcome::Ok(0u32))
        .build()
        .unwrap();

    let err = compile(&blueprint, &catalog).unwrap_err();
    assert_eq!(err, CompileError::ModuleNotRegistered {
        node: "n1".to_string(),
        module_type: "test.ghost".to_string(),
    });
}

/// Tests the single-request-type invariant.
#[test]
fn test_compile_request_type_mismatch() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = test_catalog(&collector);
    let blueprint = FlowBlueprint::<String, u32>::builder("Feed")
        .stage("s1", StageContract::default())
        .step("n1", "test.noop")
        .join("finish", |_outcomes, _ctx| Outcome::Ok(0u32))
        .build()
        .unwrap();

    let err = compile(&blueprint, &catalog).unwrap_err();
    assert!(matches!(
        err,
        CompileError::RequestTypeMismatch {
            ..
        }
    ));
}

/// Tests that the final join must output the flow's response type.
#[test]
fn test_compile_response_type_mismatch() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = test_catalog(&collector);
    let blueprint = FlowBlueprint::<u32, u32>::builder("Feed")
        .stage("s1", StageContract::default())
        .step("n1", "test.noop")
        .join("finish", |_outcomes, _ctx| Outcome::Ok("mismatch".to_string()))
        .build()
        .unwrap();

    let err = compile(&blueprint, &catalog).unwrap_err();
    assert!(matches!(
        err,
        CompileError::ResponseTypeMismatch {
            ..
        }
    ));
}

/// Tests the compiled plan's explain output.
#[test]
fn test_plan_explain() {
    let collector = Arc::new(InvocationCollector::new());
    let catalog = test_catalog(&collector);
    let blueprint = FlowBlueprint::<u32, u32>::builder("Feed")
        .stage("s1", StageContract::default())
        .step("n1", "test.noop")
        .join("finish", |_outcomes, _ctx| Outcome::Ok(0u32))
        .build()
        .unwrap();

    let plan = compile(&blueprint, &catalog).unwrap();
    let explain = plan.explain();

    assert_eq!(explain.flow, "Feed");
    assert_eq!(explain.plan_hash, plan.plan_hash_hex());
    assert_eq!(explain.nodes.len(), 2);
    assert_eq!(explain.nodes[0].kind, "step");
    assert_eq!(explain.nodes[0].module_type.as_deref(), Some("test.noop"));
    assert_eq!(explain.nodes[0].args.as_deref(), Some("u32"));
    assert_eq!(explain.nodes[1].kind, "join");
    assert_eq!(explain.nodes[1].output.as_deref(), Some("u32"));
    assert_eq!(plan.stage_contracts().len(), 1);
    assert_eq!(plan.node_index("finish"), Some(1));
}
