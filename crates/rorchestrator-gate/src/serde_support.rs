// rorchestrator-gate/src/serde_support.rs
// ============================================================================
// Module: Gate JSON Support
// Description: Strict JSON encoding and decoding for gate trees.
// Purpose: Parse single-discriminant gate objects with structured errors.
// Dependencies: serde_json, crate::gate
// ============================================================================

//! ## Overview
//! Gates travel inside config patches as JSON objects with exactly one
//! discriminant key (`experiment`, `rollout`, `requestAttr`, `selector`,
//! `all`, `any`, `not`). Parsing is strict: zero or multiple discriminants,
//! unknown fields, out-of-range values, empty composites, and over-deep
//! trees are all structured errors so patch validation can report precise
//! findings. Decoded trees always satisfy the [`Gate`] construction
//! invariants.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::gate::Gate;
use crate::gate::GateBuildError;
use crate::gate::MAX_GATE_DEPTH;
use crate::gate::RequestAttrField;

// ============================================================================
// SECTION: Parse Errors
// ============================================================================

/// Errors that can occur while decoding a gate from JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateParseError {
    /// The value is not an object with exactly one known discriminant key.
    UnknownType {
        /// Keys found on the offending object, sorted.
        keys: Vec<String>,
    },
    /// A composite gate carried an empty child list.
    EmptyComposite {
        /// Composite kind label (`all` or `any`).
        kind: &'static str,
    },
    /// The gate tree exceeded [`MAX_GATE_DEPTH`].
    TooDeep {
        /// Depth at which the limit was crossed.
        depth: usize,
    },
    /// A request-attribute gate named a field outside the allowed set.
    RequestFieldNotAllowed {
        /// Offending field name.
        field: String,
    },
    /// A field carried a value of the wrong shape or range.
    InvalidValue {
        /// Dotted field name relative to the gate object.
        field: String,
        /// Expected description for the field.
        expected: &'static str,
    },
}

impl fmt::Display for GateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType {
                keys,
            } => write!(f, "gate object must carry exactly one known type key, got {keys:?}"),
            Self::EmptyComposite {
                kind,
            } => write!(f, "composite gate '{kind}' requires at least one child"),
            Self::TooDeep {
                depth,
            } => write!(f, "gate tree depth {depth} exceeds maximum {MAX_GATE_DEPTH}"),
            Self::RequestFieldNotAllowed {
                field,
            } => write!(f, "request attribute field '{field}' is not allowed"),
            Self::InvalidValue {
                field,
                expected,
            } => write!(f, "invalid value for gate field '{field}': expected {expected}"),
        }
    }
}

impl std::error::Error for GateParseError {}

impl From<GateBuildError> for GateParseError {
    fn from(err: GateBuildError) -> Self {
        match err {
            GateBuildError::EmptyComposite {
                kind,
            } => Self::EmptyComposite {
                kind,
            },
            GateBuildError::PercentOutOfRange {
                ..
            } => Self::InvalidValue {
                field: "rollout.percent".to_string(),
                expected: "integer in 0..=100",
            },
            GateBuildError::TooDeep {
                depth,
            } => Self::TooDeep {
                depth,
            },
        }
    }
}

// ============================================================================
// SECTION: Decoding
// ============================================================================

/// Decodes a gate tree from its JSON form.
///
/// # Errors
///
/// Returns [`GateParseError`] when the value violates the gate schema.
pub fn gate_from_json(value: &Value) -> Result<Gate, GateParseError> {
    let gate = parse_node(value, 1)?;
    gate.validate_depth()?;
    Ok(gate)
}

/// Decodes one gate node at the given depth.
fn parse_node(value: &Value, depth: usize) -> Result<Gate, GateParseError> {
    if depth > MAX_GATE_DEPTH {
        return Err(GateParseError::TooDeep {
            depth,
        });
    }

    let Value::Object(entries) = value else {
        return Err(GateParseError::UnknownType {
            keys: Vec::new(),
        });
    };
    if entries.len() != 1 {
        return Err(unknown_type(entries));
    }
    let Some((key, body)) = entries.iter().next() else {
        return Err(unknown_type(entries));
    };

    match key.as_str() {
        "experiment" => parse_experiment(body),
        "rollout" => parse_rollout(body),
        "requestAttr" => parse_request_attr(body),
        "selector" => parse_selector(body),
        "all" => parse_composite(body, depth, "all", Gate::all),
        "any" => parse_composite(body, depth, "any", Gate::any),
        "not" => Ok(Gate::negate(parse_node(body, depth + 1)?)),
        _ => Err(unknown_type(entries)),
    }
}

/// Builds the unknown-type error from an object's keys.
fn unknown_type(entries: &Map<String, Value>) -> GateParseError {
    let mut keys: Vec<String> = entries.keys().cloned().collect();
    keys.sort();
    GateParseError::UnknownType {
        keys,
    }
}

/// Decodes an experiment leaf body.
fn parse_experiment(body: &Value) -> Result<Gate, GateParseError> {
    let layer = required_str(body, "experiment.layer", "layer")?;
    let variants = required_str_list(body, "experiment.variants", "variants")?;
    Ok(Gate::experiment(layer, variants))
}

/// Decodes a rollout leaf body.
fn parse_rollout(body: &Value) -> Result<Gate, GateParseError> {
    let percent =
        body.get("percent").and_then(Value::as_u64).ok_or(GateParseError::InvalidValue {
            field: "rollout.percent".to_string(),
            expected: "integer in 0..=100",
        })?;
    let salt = required_str(body, "rollout.salt", "salt")?;
    Ok(Gate::rollout(percent, salt)?)
}

/// Decodes a request-attribute leaf body.
fn parse_request_attr(body: &Value) -> Result<Gate, GateParseError> {
    let field_name = required_str(body, "requestAttr.field", "field")?;
    let field = RequestAttrField::parse(&field_name).ok_or_else(|| {
        GateParseError::RequestFieldNotAllowed {
            field: field_name.clone(),
        }
    })?;
    let values = required_str_list(body, "requestAttr.values", "values")?;
    Ok(Gate::request_attr(field, values))
}

/// Decodes a selector leaf body.
fn parse_selector(body: &Value) -> Result<Gate, GateParseError> {
    let name = body.as_str().filter(|name| !name.is_empty()).ok_or_else(|| {
        GateParseError::InvalidValue {
            field: "selector".to_string(),
            expected: "non-empty string",
        }
    })?;
    Ok(Gate::selector(name))
}

/// Decodes a composite body into child gates and assembles the composite.
fn parse_composite(
    body: &Value,
    depth: usize,
    kind: &'static str,
    assemble: fn(Vec<Gate>) -> Result<Gate, GateBuildError>,
) -> Result<Gate, GateParseError> {
    let Value::Array(items) = body else {
        return Err(GateParseError::InvalidValue {
            field: kind.to_string(),
            expected: "array of gate objects",
        });
    };
    if items.is_empty() {
        return Err(GateParseError::EmptyComposite {
            kind,
        });
    }
    let mut children = Vec::with_capacity(items.len());
    for item in items {
        children.push(parse_node(item, depth + 1)?);
    }
    Ok(assemble(children)?)
}

/// Reads a required non-empty string field from a leaf body.
fn required_str(body: &Value, path: &str, field: &str) -> Result<String, GateParseError> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GateParseError::InvalidValue {
            field: path.to_string(),
            expected: "non-empty string",
        })
}

/// Reads a required string-array field from a leaf body.
fn required_str_list(body: &Value, path: &str, field: &str) -> Result<Vec<String>, GateParseError> {
    let Some(Value::Array(items)) = body.get(field) else {
        return Err(GateParseError::InvalidValue {
            field: path.to_string(),
            expected: "array of strings",
        });
    };
    let mut values = Vec::with_capacity(items.len());
    for item in items {
        let Some(value) = item.as_str() else {
            return Err(GateParseError::InvalidValue {
                field: path.to_string(),
                expected: "array of strings",
            });
        };
        values.push(value.to_string());
    }
    Ok(values)
}

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Encodes a gate tree into its JSON form.
#[must_use]
pub fn gate_to_json(gate: &Gate) -> Value {
    match gate {
        Gate::Experiment {
            layer,
            variants,
        } => json!({ "experiment": { "layer": layer, "variants": variants } }),
        Gate::Rollout {
            percent,
            salt,
        } => json!({ "rollout": { "percent": percent, "salt": salt } }),
        Gate::RequestAttr {
            field,
            values,
        } => json!({ "requestAttr": { "field": field.as_str(), "values": values } }),
        Gate::Selector(name) => json!({ "selector": name }),
        Gate::All(children) => {
            json!({ "all": children.iter().map(|child| gate_to_json(child)).collect::<Vec<_>>() })
        }
        Gate::Any(children) => {
            json!({ "any": children.iter().map(|child| gate_to_json(child)).collect::<Vec<_>>() })
        }
        Gate::Not(child) => json!({ "not": gate_to_json(child) }),
    }
}
