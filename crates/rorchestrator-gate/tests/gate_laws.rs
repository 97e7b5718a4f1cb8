// rorchestrator-gate/tests/gate_laws.rs
// ============================================================================
// Module: Gate Law Property Tests
// Description: Property tests for gate algebra laws and rollout monotonicity.
// ============================================================================
//! ## Overview
//! Exercises the algebraic laws gate evaluation must satisfy for arbitrary
//! leaf gates and contexts.

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

use std::collections::BTreeMap;

use proptest::prelude::*;
use rorchestrator_gate::Gate;
use rorchestrator_gate::GateBuildError;
use rorchestrator_gate::GateContext;
use rorchestrator_gate::LayerName;
use rorchestrator_gate::RequestAttrField;
use rorchestrator_gate::evaluate;
use rorchestrator_gate::rollout_bucket;

/// Strategy for short identifier-like strings.
fn ident() -> impl Strategy<Value = String> {
    "[a-z]{1,6}"
}

/// Strategy for registry-free leaf gates.
fn leaf_gate() -> impl Strategy<Value = Gate> {
    prop_oneof![
        (ident(), proptest::collection::vec(ident(), 0..3))
            .prop_map(|(layer, variants)| Gate::experiment(layer, variants)),
        (0u64..=100, ident()).prop_map(|(percent, salt)| Gate::rollout(percent, salt)
            .unwrap_or_else(|_| Gate::selector("unreachable"))),
        proptest::collection::vec(ident(), 0..3)
            .prop_map(|values| Gate::request_attr(RequestAttrField::Region, values)),
    ]
}

/// Strategy for evaluation contexts without selectors.
fn leaf_context() -> impl Strategy<
    Value = (Option<String>, BTreeMap<LayerName, String>, BTreeMap<String, String>),
> {
    (
        proptest::option::of(ident()),
        proptest::collection::btree_map(ident().prop_map(LayerName::from), ident(), 0..4),
        proptest::collection::btree_map(
            prop_oneof![Just("region".to_string()), Just("device".to_string())],
            ident(),
            0..3,
        ),
    )
}

proptest! {
    /// Double negation preserves allowance (reason codes may differ).
    #[test]
    fn law_not_not_preserves_allowance(
        gate in leaf_gate(),
        (user_id, variants, attrs) in leaf_context(),
    ) {
        let ctx = GateContext {
            user_id: user_id.as_deref(),
            variants: &variants,
            attrs: &attrs,
            selectors: None,
        };
        let direct = evaluate(&gate, &ctx).unwrap();
        let doubled = Gate::negate(Gate::negate(gate));
        let inverted = evaluate(&doubled, &ctx).unwrap();
        prop_assert_eq!(direct.allowed, inverted.allowed);
    }

    /// A singleton `All` is equivalent to its child.
    #[test]
    fn law_all_singleton(
        gate in leaf_gate(),
        (user_id, variants, attrs) in leaf_context(),
    ) {
        let ctx = GateContext {
            user_id: user_id.as_deref(),
            variants: &variants,
            attrs: &attrs,
            selectors: None,
        };
        let direct = evaluate(&gate, &ctx).unwrap();
        let wrapped = Gate::all(vec![gate]).unwrap();
        let composite = evaluate(&wrapped, &ctx).unwrap();
        prop_assert_eq!(direct.allowed, composite.allowed);
    }

    /// A singleton `Any` is equivalent to its child.
    #[test]
    fn law_any_singleton(
        gate in leaf_gate(),
        (user_id, variants, attrs) in leaf_context(),
    ) {
        let ctx = GateContext {
            user_id: user_id.as_deref(),
            variants: &variants,
            attrs: &attrs,
            selectors: None,
        };
        let direct = evaluate(&gate, &ctx).unwrap();
        let wrapped = Gate::any(vec![gate]).unwrap();
        let composite = evaluate(&wrapped, &ctx).unwrap();
        prop_assert_eq!(direct.allowed, composite.allowed);
    }

    /// Raising the rollout percentage never revokes an allowance.
    #[test]
    fn law_rollout_monotonic(
        user_id in ident(),
        salt in ident(),
        low in 0u64..=100,
        high in 0u64..=100,
    ) {
        prop_assume!(low <= high);
        let variants = BTreeMap::new();
        let attrs = BTreeMap::new();
        let ctx = GateContext {
            user_id: Some(user_id.as_str()),
            variants: &variants,
            attrs: &attrs,
            selectors: None,
        };
        let low_gate = Gate::rollout(low, salt.clone()).unwrap();
        let high_gate = Gate::rollout(high, salt.clone()).unwrap();
        let low_decision = evaluate(&low_gate, &ctx).unwrap();
        let high_decision = evaluate(&high_gate, &ctx).unwrap();
        if low_decision.allowed {
            prop_assert!(high_decision.allowed);
        }
        prop_assert_eq!(high_decision.allowed, rollout_bucket(&user_id, &salt) < high);
    }

    /// Buckets stay within the rollout range for arbitrary inputs.
    #[test]
    fn law_bucket_range(user_id in ".*", salt in ".*") {
        prop_assert!(rollout_bucket(&user_id, &salt) < 100);
    }
}

// ============================================================================
// SECTION: Construction Laws
// ============================================================================

/// Tests that empty composites are rejected at construction.
#[test]
fn test_empty_composites_rejected() {
    assert_eq!(
        Gate::all(Vec::new()).unwrap_err(),
        GateBuildError::EmptyComposite {
            kind: "all",
        }
    );
    assert_eq!(
        Gate::any(Vec::new()).unwrap_err(),
        GateBuildError::EmptyComposite {
            kind: "any",
        }
    );
}

/// Tests that out-of-range rollout percentages are rejected.
#[test]
fn test_rollout_percent_bounds() {
    assert!(Gate::rollout(100, "s").is_ok());
    assert_eq!(
        Gate::rollout(101, "s").unwrap_err(),
        GateBuildError::PercentOutOfRange {
            percent: 101,
        }
    );
}

/// Tests depth accounting and the depth limit.
#[test]
fn test_depth_limit() {
    let mut gate = Gate::selector("leaf");
    for _ in 0..9 {
        gate = Gate::negate(gate);
    }
    assert_eq!(gate.depth(), 10);
    assert!(gate.validate_depth().is_ok());

    let deep = Gate::negate(gate);
    assert_eq!(deep.depth(), 11);
    assert_eq!(
        deep.validate_depth().unwrap_err(),
        GateBuildError::TooDeep {
            depth: 11,
        }
    );
}
