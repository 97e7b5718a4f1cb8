// rorchestrator-gate/src/eval.rs
// ============================================================================
// Module: Gate Evaluation
// Description: Pure gate evaluation over an invocation context.
// Purpose: Produce deterministic gate decisions with stable reason codes.
// Dependencies: crate::{decision, gate, hashing}
// ============================================================================

//! ## Overview
//! [`evaluate`] walks a gate tree against a [`GateContext`] and returns a
//! [`GateDecision`]. Composites short-circuit left-to-right; the first
//! decisive child decision is returned unchanged so callers see which leaf
//! decided. Selector gates require a registry; a missing registry or an
//! unregistered selector is a hard [`GateError`], never a silent denial.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::decision::GateDecision;
use crate::decision::reason;
use crate::gate::Gate;
use crate::hashing::rollout_bucket;
use crate::identifiers::LayerName;
use crate::identifiers::SelectorName;

// ============================================================================
// SECTION: Selector Registry
// ============================================================================

/// Selector function deciding on the evaluation context.
pub type SelectorFn = dyn Fn(&GateContext<'_>) -> bool + Send + Sync;

/// Registry of named selector functions.
///
/// # Invariants
/// - Registrations are keyed by name; later registrations overwrite earlier
///   ones.
#[derive(Clone, Default)]
pub struct SelectorRegistry {
    /// Selector functions keyed by name.
    selectors: BTreeMap<SelectorName, Arc<SelectorFn>>,
}

impl SelectorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a selector function under a name.
    pub fn register<F>(&mut self, name: impl Into<SelectorName>, selector: F)
    where
        F: Fn(&GateContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.selectors.insert(name.into(), Arc::new(selector));
    }

    /// Returns the selector registered under `name`, if any.
    #[must_use]
    pub fn get(&self, name: &SelectorName) -> Option<&Arc<SelectorFn>> {
        self.selectors.get(name)
    }

    /// Returns true when a selector is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &SelectorName) -> bool {
        self.selectors.contains_key(name)
    }

    /// Returns the registered selector names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<SelectorName> {
        self.selectors.keys().cloned().collect()
    }
}

impl fmt::Debug for SelectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorRegistry").field("names", &self.names()).finish()
    }
}

// ============================================================================
// SECTION: Gate Context
// ============================================================================

/// Ambient invocation state gates evaluate against.
///
/// # Invariants
/// - Maps are frozen for the lifetime of one evaluation; gates never mutate
///   the context.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    /// User identifier for rollout bucketing, when known.
    pub user_id: Option<&'a str>,
    /// Experiment variant assignments keyed by layer.
    pub variants: &'a BTreeMap<LayerName, String>,
    /// Request attributes keyed by field name.
    pub attrs: &'a BTreeMap<String, String>,
    /// Selector registry, when the host registered selectors.
    pub selectors: Option<&'a SelectorRegistry>,
}

// ============================================================================
// SECTION: Evaluation Errors
// ============================================================================

/// Errors raised by gate evaluation.
///
/// Gate denials are decisions, not errors; these variants cover evaluation
/// preconditions that the host failed to provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// A selector gate was evaluated without a selector registry.
    SelectorRegistryMissing {
        /// Name of the selector the gate referenced.
        selector: String,
    },
    /// A selector gate referenced a name absent from the registry.
    SelectorNotRegistered {
        /// Name of the missing selector.
        selector: String,
    },
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelectorRegistryMissing {
                selector,
            } => write!(f, "selector '{selector}' requires a selector registry"),
            Self::SelectorNotRegistered {
                selector,
            } => write!(f, "selector '{selector}' is not registered"),
        }
    }
}

impl std::error::Error for GateError {}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates a gate against a context.
///
/// # Errors
///
/// Returns [`GateError`] when a selector gate lacks its registry or names an
/// unregistered selector.
pub fn evaluate(gate: &Gate, ctx: &GateContext<'_>) -> Result<GateDecision, GateError> {
    let kind = gate.kind_label();
    match gate {
        Gate::Experiment {
            layer,
            variants,
        } => Ok(evaluate_experiment(kind, layer, variants, ctx)),
        Gate::Rollout {
            percent,
            salt,
        } => Ok(evaluate_rollout(kind, *percent, salt, ctx)),
        Gate::RequestAttr {
            field,
            values,
        } => Ok(evaluate_request_attr(kind, field.as_str(), values, ctx)),
        Gate::Selector(name) => evaluate_selector(kind, name, ctx),
        Gate::All(children) => {
            for child in children {
                let decision = evaluate(child, ctx)?;
                if !decision.allowed {
                    return Ok(decision);
                }
            }
            Ok(GateDecision::allowed(kind, reason::ALL_TRUE))
        }
        Gate::Any(children) => {
            for child in children {
                let decision = evaluate(child, ctx)?;
                if decision.allowed {
                    return Ok(decision);
                }
            }
            Ok(GateDecision::denied(kind, reason::ANY_FALSE))
        }
        Gate::Not(child) => {
            let decision = evaluate(child, ctx)?;
            if decision.allowed {
                Ok(GateDecision::denied(kind, reason::NOT_FALSE))
            } else {
                Ok(GateDecision::allowed(kind, reason::NOT_TRUE))
            }
        }
    }
}

/// Evaluates an experiment-variant leaf.
fn evaluate_experiment(
    kind: &str,
    layer: &LayerName,
    allowed: &[String],
    ctx: &GateContext<'_>,
) -> GateDecision {
    match ctx.variants.get(layer) {
        None => GateDecision::denied(kind, reason::MISSING_VARIANT),
        Some(variant) if allowed.iter().any(|candidate| candidate == variant) => {
            GateDecision::allowed(kind, reason::VARIANT_MATCH)
        }
        Some(_) => GateDecision::denied(kind, reason::VARIANT_MISMATCH),
    }
}

/// Evaluates a rollout leaf.
fn evaluate_rollout(kind: &str, percent: u8, salt: &str, ctx: &GateContext<'_>) -> GateDecision {
    let Some(user_id) = ctx.user_id.filter(|id| !id.is_empty()) else {
        return GateDecision::denied(kind, reason::MISSING_USER_ID);
    };
    if rollout_bucket(user_id, salt) < u64::from(percent) {
        GateDecision::allowed(kind, reason::ROLLOUT_TRUE)
    } else {
        GateDecision::denied(kind, reason::ROLLOUT_FALSE)
    }
}

/// Evaluates a request-attribute leaf.
fn evaluate_request_attr(
    kind: &str,
    field: &str,
    allowed: &[String],
    ctx: &GateContext<'_>,
) -> GateDecision {
    match ctx.attrs.get(field) {
        None => GateDecision::denied(kind, reason::MISSING_REQUEST_ATTR),
        Some(value) if allowed.iter().any(|candidate| candidate == value) => {
            GateDecision::allowed(kind, reason::REQUEST_ATTR_MATCH)
        }
        Some(_) => GateDecision::denied(kind, reason::REQUEST_ATTR_MISMATCH),
    }
}

/// Evaluates a selector leaf.
fn evaluate_selector(
    kind: &str,
    name: &SelectorName,
    ctx: &GateContext<'_>,
) -> Result<GateDecision, GateError> {
    let registry = ctx.selectors.ok_or_else(|| GateError::SelectorRegistryMissing {
        selector: name.to_string(),
    })?;
    let selector = registry.get(name).ok_or_else(|| GateError::SelectorNotRegistered {
        selector: name.to_string(),
    })?;
    if selector(ctx) {
        Ok(GateDecision::allowed(kind, reason::SELECTOR_TRUE))
    } else {
        Ok(GateDecision::denied(kind, reason::SELECTOR_FALSE))
    }
}
