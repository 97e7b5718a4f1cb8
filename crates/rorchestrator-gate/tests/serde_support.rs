// rorchestrator-gate/tests/serde_support.rs
// ============================================================================
// Module: Gate JSON Tests
// Description: Tests for strict gate JSON decoding and encoding.
// ============================================================================
//! ## Overview
//! Validates single-discriminant parsing, structured parse errors, and the
//! encode/decode agreement for representative trees.

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

use rorchestrator_gate::Gate;
use rorchestrator_gate::GateParseError;
use rorchestrator_gate::RequestAttrField;
use rorchestrator_gate::gate_from_json;
use rorchestrator_gate::gate_to_json;
use serde_json::json;

// ============================================================================
// SECTION: Decoding
// ============================================================================

/// Tests decoding of every leaf kind.
#[test]
fn test_decode_leaves() {
    let gate = gate_from_json(&json!({
        "experiment": { "layer": "L", "variants": ["A", "B"] }
    }))
    .unwrap();
    assert_eq!(gate, Gate::experiment("L", vec!["A".to_string(), "B".to_string()]));

    let gate = gate_from_json(&json!({ "rollout": { "percent": 25, "salt": "s" } })).unwrap();
    assert_eq!(gate, Gate::rollout(25, "s").unwrap());

    let gate = gate_from_json(&json!({
        "requestAttr": { "field": "appVersion", "values": ["1.2.3"] }
    }))
    .unwrap();
    assert_eq!(gate, Gate::request_attr(RequestAttrField::AppVersion, vec!["1.2.3".to_string()]));

    let gate = gate_from_json(&json!({ "selector": "beta-cohort" })).unwrap();
    assert_eq!(gate, Gate::selector("beta-cohort"));
}

/// Tests decoding of nested composites.
#[test]
fn test_decode_composites() {
    let gate = gate_from_json(&json!({
        "all": [
            { "selector": "a" },
            { "not": { "any": [ { "selector": "b" }, { "selector": "c" } ] } }
        ]
    }))
    .unwrap();

    let expected = Gate::all(vec![
        Gate::selector("a"),
        Gate::negate(Gate::any(vec![Gate::selector("b"), Gate::selector("c")]).unwrap()),
    ])
    .unwrap();
    assert_eq!(gate, expected);
}

// ============================================================================
// SECTION: Parse Errors
// ============================================================================

/// Tests that zero and multiple discriminant keys map to the same error.
#[test]
fn test_discriminant_cardinality() {
    let err = gate_from_json(&json!({})).unwrap_err();
    assert!(matches!(
        err,
        GateParseError::UnknownType {
            ..
        }
    ));

    let err = gate_from_json(&json!({ "selector": "a", "rollout": { "percent": 1, "salt": "s" } }))
        .unwrap_err();
    let GateParseError::UnknownType {
        keys,
    } = err
    else {
        panic!("expected UnknownType, got {err:?}");
    };
    assert_eq!(keys, vec!["rollout".to_string(), "selector".to_string()]);
}

/// Tests that unknown discriminants and non-objects are rejected.
#[test]
fn test_unknown_type() {
    let err = gate_from_json(&json!({ "mystery": {} })).unwrap_err();
    assert!(matches!(
        err,
        GateParseError::UnknownType {
            ..
        }
    ));

    let err = gate_from_json(&json!("selector")).unwrap_err();
    assert!(matches!(
        err,
        GateParseError::UnknownType {
            ..
        }
    ));
}

/// Tests that empty composites are rejected during decoding.
#[test]
fn test_empty_composite() {
    let err = gate_from_json(&json!({ "all": [] })).unwrap_err();
    assert_eq!(
        err,
        GateParseError::EmptyComposite {
            kind: "all",
        }
    );
    let err = gate_from_json(&json!({ "any": [] })).unwrap_err();
    assert_eq!(
        err,
        GateParseError::EmptyComposite {
            kind: "any",
        }
    );
}

/// Tests that trees deeper than the limit are rejected.
#[test]
fn test_too_deep() {
    let mut value = json!({ "selector": "leaf" });
    for _ in 0..10 {
        value = json!({ "not": value });
    }
    let err = gate_from_json(&value).unwrap_err();
    assert!(matches!(
        err,
        GateParseError::TooDeep {
            ..
        }
    ));
}

/// Tests that disallowed request fields are rejected.
#[test]
fn test_request_field_not_allowed() {
    let err = gate_from_json(&json!({
        "requestAttr": { "field": "userAgent", "values": ["x"] }
    }))
    .unwrap_err();
    assert_eq!(
        err,
        GateParseError::RequestFieldNotAllowed {
            field: "userAgent".to_string(),
        }
    );
}

/// Tests that out-of-range percentages surface as invalid values.
#[test]
fn test_percent_out_of_range() {
    let err =
        gate_from_json(&json!({ "rollout": { "percent": 150, "salt": "s" } })).unwrap_err();
    assert!(matches!(
        err,
        GateParseError::InvalidValue {
            ..
        }
    ));
}

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Tests that encoding a decoded tree reproduces the source document.
#[test]
fn test_encode_round_trip() {
    let source = json!({
        "any": [
            { "experiment": { "layer": "L", "variants": ["A"] } },
            { "all": [
                { "rollout": { "percent": 50, "salt": "s" } },
                { "requestAttr": { "field": "region", "values": ["eu", "us"] } }
            ] }
        ]
    });
    let gate = gate_from_json(&source).unwrap();
    assert_eq!(gate_to_json(&gate), source);
}
