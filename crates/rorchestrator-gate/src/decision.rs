// rorchestrator-gate/src/decision.rs
// ============================================================================
// Module: Gate Decisions
// Description: Gate decision value and the fixed reason-code vocabulary.
// Purpose: Carry allowance, gate kind, and a stable reason code per outcome.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every gate evaluation yields a [`GateDecision`]: whether the gate allowed
//! the step, which gate kind decided, and a screaming-snake-case
//! [`ReasonCode`]. Reason codes are a closed vocabulary; skip outcomes,
//! explain traces, and preview tooling all reuse them verbatim, and the
//! newtype keeps them from mixing with other string identifiers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Reason Codes
// ============================================================================

/// Fixed reason codes emitted by gate evaluation.
pub mod reason {
    /// Experiment variant matched an allowed variant.
    pub const VARIANT_MATCH: &str = "VARIANT_MATCH";
    /// Context carries no variant for the tested layer.
    pub const MISSING_VARIANT: &str = "MISSING_VARIANT";
    /// Experiment variant is assigned but not allowed.
    pub const VARIANT_MISMATCH: &str = "VARIANT_MISMATCH";
    /// Rollout gate evaluated without a user identifier.
    pub const MISSING_USER_ID: &str = "MISSING_USER_ID";
    /// Rollout bucket fell below the configured percentage.
    pub const ROLLOUT_TRUE: &str = "ROLLOUT_TRUE";
    /// Rollout bucket fell at or above the configured percentage.
    pub const ROLLOUT_FALSE: &str = "ROLLOUT_FALSE";
    /// Request attribute absent from the context.
    pub const MISSING_REQUEST_ATTR: &str = "MISSING_REQUEST_ATTR";
    /// Request attribute matched an allowed value.
    pub const REQUEST_ATTR_MATCH: &str = "REQUEST_ATTR_MATCH";
    /// Request attribute present but not among allowed values.
    pub const REQUEST_ATTR_MISMATCH: &str = "REQUEST_ATTR_MISMATCH";
    /// Registered selector returned true.
    pub const SELECTOR_TRUE: &str = "SELECTOR_TRUE";
    /// Registered selector returned false.
    pub const SELECTOR_FALSE: &str = "SELECTOR_FALSE";
    /// Every child of an `All` composite allowed.
    pub const ALL_TRUE: &str = "ALL_TRUE";
    /// No child of an `Any` composite allowed.
    pub const ANY_FALSE: &str = "ANY_FALSE";
    /// Negation allowed because the child denied.
    pub const NOT_TRUE: &str = "NOT_TRUE";
    /// Negation denied because the child allowed.
    pub const NOT_FALSE: &str = "NOT_FALSE";
}

// ============================================================================
// SECTION: Reason Code Newtype
// ============================================================================

/// Screaming-snake-case reason code carried by decisions and outcomes.
///
/// # Invariants
/// - The empty code is reserved for ok outcomes by convention.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReasonCode(String);

impl ReasonCode {
    /// Creates a new reason code.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the empty (ok) code.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ReasonCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ReasonCode {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl PartialEq<str> for ReasonCode {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ReasonCode {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// ============================================================================
// SECTION: Gate Decision
// ============================================================================

/// Outcome of evaluating a gate against a context.
///
/// # Invariants
/// - `reason_code` is one of the [`reason`] constants for the deciding gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Whether the gate allows the step to run.
    pub allowed: bool,
    /// Stable label of the gate kind that produced the decision.
    pub code: String,
    /// Stable reason code for the decision.
    pub reason_code: ReasonCode,
}

impl GateDecision {
    /// Creates an allowing decision.
    #[must_use]
    pub fn allowed(code: &str, reason_code: &str) -> Self {
        Self {
            allowed: true,
            code: code.to_string(),
            reason_code: ReasonCode::new(reason_code),
        }
    }

    /// Creates a denying decision.
    #[must_use]
    pub fn denied(code: &str, reason_code: &str) -> Self {
        Self {
            allowed: false,
            code: code.to_string(),
            reason_code: ReasonCode::new(reason_code),
        }
    }
}
