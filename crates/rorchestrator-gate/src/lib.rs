// rorchestrator-gate/src/lib.rs
// ============================================================================
// Module: RORchestrator Gate Crate Root
// Description: Composable boolean gates over request context.
// Purpose: Provide the gate model, evaluator, JSON form, and bucket hashing.
// Dependencies: serde, serde_json, smallvec
// ============================================================================

//! ## Overview
//! Gates are composable predicates deciding whether a step module runs for a
//! given invocation. Leaves test experiment variants, rollout buckets,
//! request attributes, or registered selectors; composites (`All`, `Any`,
//! `Not`) nest up to a fixed depth. Every decision carries a stable reason
//! code so skip outcomes and previews stay explainable.
//!
//! Evaluation is pure: the same gate and context always produce the same
//! [`GateDecision`]. Rollout bucketing hashes UTF-16 code units in
//! little-endian byte order so buckets are stable across platforms.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod decision;
pub mod eval;
pub mod gate;
pub mod hashing;
pub mod identifiers;
pub mod serde_support;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::decision::GateDecision;
pub use crate::decision::ReasonCode;
pub use crate::decision::reason;
pub use crate::eval::GateContext;
pub use crate::eval::GateError;
pub use crate::eval::SelectorRegistry;
pub use crate::eval::evaluate;
pub use crate::gate::Gate;
pub use crate::gate::GateBuildError;
pub use crate::gate::MAX_GATE_DEPTH;
pub use crate::gate::RequestAttrField;
pub use crate::hashing::Fnv64;
pub use crate::hashing::rollout_bucket;
pub use crate::identifiers::LayerName;
pub use crate::identifiers::SelectorName;
pub use crate::serde_support::GateParseError;
pub use crate::serde_support::gate_from_json;
pub use crate::serde_support::gate_to_json;
