// rorchestrator-core/src/core/outcome.rs
// ============================================================================
// Module: Flow Outcomes
// Description: Tagged result type carrying reason codes and payloads.
// Purpose: Define `Outcome`, its kinds, engine reason codes, and the
// per-stage outcome aggregation joins reduce over. Dependencies:
// rorchestrator-gate, serde
// ============================================================================

//! ## Overview
//! Every module, join, and flow invocation resolves to an [`Outcome`]: a
//! tagged union of `Ok`, `Error`, `Timeout`, `Skipped`, `Fallback`, and
//! `Canceled`. Non-ok variants carry a [`ReasonCode`], the screaming-snake-
//! case newtype shared with gate decisions; `Ok` carries the empty code by
//! convention. Equality and serialization compare the `(kind, code)` pair
//! plus payload.
//!
//! The engine internally erases payloads to [`ErasedPayload`] so stages with
//! different output types flow through one scheduler; typed access returns
//! at the join and flow boundaries.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;

use rorchestrator_gate::ReasonCode;
use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ModuleId;
use crate::core::identifiers::ModuleTypeId;

// ============================================================================
// SECTION: Engine Reason Codes
// ============================================================================

/// Fixed reason codes emitted by the engine itself.
pub mod codes {
    /// Config snapshot could not be resolved or parsed.
    pub const CFG_UNAVAILABLE: &str = "CFG_UNAVAILABLE";
    /// Flow deadline elapsed before completion.
    pub const FLOW_DEADLINE: &str = "FLOW_DEADLINE";
    /// Caller canceled the invocation.
    pub const FLOW_CANCELED: &str = "FLOW_CANCELED";
    /// Flow name is not registered with the host.
    pub const FLOW_NOT_FOUND: &str = "FLOW_NOT_FOUND";
    /// Module panicked or failed outside its own outcome channel.
    pub const MODULE_EXCEPTION: &str = "MODULE_EXCEPTION";
    /// Configured module type is absent from the catalog at invocation time.
    pub const MODULE_NOT_REGISTERED: &str = "MODULE_NOT_REGISTERED";
    /// Module received a request payload of an unexpected type.
    pub const MODULE_ARGS_MISMATCH: &str = "MODULE_ARGS_MISMATCH";
    /// Step canceled because its stage short-circuited.
    pub const STAGE_SHORT_CIRCUIT: &str = "STAGE_SHORT_CIRCUIT";
    /// Selector gate could not be evaluated for this invocation.
    pub const GATE_SELECTOR_UNAVAILABLE: &str = "GATE_SELECTOR_UNAVAILABLE";
    /// Join produced a payload that does not match the declared output type.
    pub const JOIN_TYPE_MISMATCH: &str = "JOIN_TYPE_MISMATCH";
    /// Plan template lost a structural invariant the compiler guarantees.
    pub const PLAN_INVALID: &str = "PLAN_INVALID";
}

// ============================================================================
// SECTION: Outcome Kind
// ============================================================================

/// Discriminant of an [`Outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Successful completion with a payload.
    Ok,
    /// Failed with a reason code.
    Error,
    /// Timed out with a reason code.
    Timeout,
    /// Skipped without invocation, typically by a gate.
    Skipped,
    /// Degraded success carrying a payload and a reason code.
    Fallback,
    /// Canceled before completion.
    Canceled,
}

impl OutcomeKind {
    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Skipped => "skipped",
            Self::Fallback => "fallback",
            Self::Canceled => "canceled",
        }
    }
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Tagged result of a module, join, or flow invocation.
///
/// # Invariants
/// - Non-ok variants carry a non-empty screaming-snake-case reason code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome<T> {
    /// Successful completion.
    Ok(T),
    /// Failure with a reason code.
    Error(ReasonCode),
    /// Timeout with a reason code.
    Timeout(ReasonCode),
    /// Skip with a reason code; the module was never invoked.
    Skipped(ReasonCode),
    /// Degraded success with a payload and a reason code.
    Fallback(T, ReasonCode),
    /// Cancellation with a reason code.
    Canceled(ReasonCode),
}

impl<T> Outcome<T> {
    /// Returns the outcome's kind.
    #[must_use]
    pub const fn kind(&self) -> OutcomeKind {
        match self {
            Self::Ok(_) => OutcomeKind::Ok,
            Self::Error(_) => OutcomeKind::Error,
            Self::Timeout(_) => OutcomeKind::Timeout,
            Self::Skipped(_) => OutcomeKind::Skipped,
            Self::Fallback(..) => OutcomeKind::Fallback,
            Self::Canceled(_) => OutcomeKind::Canceled,
        }
    }

    /// Returns the reason code; `Ok` yields the empty code.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Ok(_) => "",
            Self::Error(code)
            | Self::Timeout(code)
            | Self::Skipped(code)
            | Self::Fallback(_, code)
            | Self::Canceled(code) => code.as_str(),
        }
    }

    /// Returns true for `Ok`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Returns true for any variant other than `Ok`.
    #[must_use]
    pub const fn is_non_ok(&self) -> bool {
        !self.is_ok()
    }

    /// Returns the payload for `Ok` and `Fallback`.
    #[must_use]
    pub fn payload(&self) -> Option<&T> {
        match self {
            Self::Ok(value) | Self::Fallback(value, _) => Some(value),
            _ => None,
        }
    }

    /// Maps the payload type, preserving kind and code.
    pub fn map_payload<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Ok(value) => Outcome::Ok(f(value)),
            Self::Error(code) => Outcome::Error(code),
            Self::Timeout(code) => Outcome::Timeout(code),
            Self::Skipped(code) => Outcome::Skipped(code),
            Self::Fallback(value, code) => Outcome::Fallback(f(value), code),
            Self::Canceled(code) => Outcome::Canceled(code),
        }
    }
}

// ============================================================================
// SECTION: Erased Payloads
// ============================================================================

/// Type-erased outcome payload used inside the engine.
pub type ErasedPayload = Box<dyn Any + Send + Sync>;

impl Outcome<ErasedPayload> {
    /// Downcasts the payload to a concrete type.
    ///
    /// Payload-free variants convert unconditionally; `Ok` and `Fallback`
    /// convert only when the erased payload holds a `T`.
    ///
    /// # Errors
    ///
    /// Returns the original outcome when the payload is not a `T`.
    pub fn downcast<T: 'static>(self) -> Result<Outcome<T>, Self> {
        match self {
            Self::Ok(value) => match value.downcast::<T>() {
                Ok(value) => Ok(Outcome::Ok(*value)),
                Err(value) => Err(Self::Ok(value)),
            },
            Self::Fallback(value, code) => match value.downcast::<T>() {
                Ok(value) => Ok(Outcome::Fallback(*value, code)),
                Err(value) => Err(Self::Fallback(value, code)),
            },
            Self::Error(code) => Ok(Outcome::Error(code)),
            Self::Timeout(code) => Ok(Outcome::Timeout(code)),
            Self::Skipped(code) => Ok(Outcome::Skipped(code)),
            Self::Canceled(code) => Ok(Outcome::Canceled(code)),
        }
    }

    /// Returns a reference to the payload downcast to `T`, when present.
    #[must_use]
    pub fn payload_ref<T: 'static>(&self) -> Option<&T> {
        self.payload().and_then(|value| value.downcast_ref::<T>())
    }
}

// ============================================================================
// SECTION: Stage Outcomes
// ============================================================================

/// Recorded outcome of one step within a stage.
pub struct StepOutcome {
    /// Configured module identifier.
    pub module_id: ModuleId,
    /// Module type that produced the outcome.
    pub module_type: ModuleTypeId,
    /// The step's outcome with an erased payload.
    pub outcome: Outcome<ErasedPayload>,
}

/// Aggregated step outcomes a join reduces over.
///
/// # Invariants
/// - Entries are keyed by module id; lookup is order-independent even though
///   iteration follows engine-observed completion order.
#[derive(Default)]
pub struct StageOutcomes {
    /// Step outcomes in engine-observed completion order.
    entries: Vec<StepOutcome>,
}

impl StageOutcomes {
    /// Creates an empty aggregation.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends a step outcome.
    pub fn push(&mut self, entry: StepOutcome) {
        self.entries.push(entry);
    }

    /// Returns the number of recorded steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no steps were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the outcome recorded for a module id.
    #[must_use]
    pub fn get(&self, module_id: &str) -> Option<&StepOutcome> {
        self.entries.iter().find(|entry| entry.module_id.as_str() == module_id)
    }

    /// Returns the payload of a module's outcome downcast to `T`.
    #[must_use]
    pub fn payload_of<T: 'static>(&self, module_id: &str) -> Option<&T> {
        self.get(module_id).and_then(|entry| entry.outcome.payload_ref::<T>())
    }

    /// Iterates step outcomes in completion order.
    pub fn iter(&self) -> impl Iterator<Item = &StepOutcome> {
        self.entries.iter()
    }

    /// Returns true when every recorded outcome is `Ok` or `Skipped`.
    #[must_use]
    pub fn all_ok_or_skipped(&self) -> bool {
        self.entries.iter().all(|entry| {
            matches!(entry.outcome.kind(), OutcomeKind::Ok | OutcomeKind::Skipped)
        })
    }

    /// Returns the first outcome that is neither `Ok` nor `Skipped`.
    #[must_use]
    pub fn first_failure(&self) -> Option<&StepOutcome> {
        self.entries.iter().find(|entry| {
            !matches!(entry.outcome.kind(), OutcomeKind::Ok | OutcomeKind::Skipped)
        })
    }
}
