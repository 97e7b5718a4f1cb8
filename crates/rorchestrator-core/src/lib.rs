// rorchestrator-core/src/lib.rs
// ============================================================================
// Module: RORchestrator Core Crate Root
// Description: Flow model, plan compilation, config snapshots, and engine.
// Purpose: Expose the blueprint, catalog, patch, context, and engine APIs.
// Dependencies: rorchestrator-gate, serde, serde_json, thiserror, tokio
// ============================================================================

//! ## Overview
//! The core crate hosts the flow orchestrator: flows are declared with the
//! blueprint API, compiled into immutable hashed plan templates, and driven
//! by the execution engine against a per-invocation [`FlowContext`] and a
//! dynamic config snapshot. Gate evaluation comes from `rorchestrator-gate`;
//! persistence and tooling live in sibling crates.
//!
//! Invariants:
//! - Plan templates, catalogs, and registries are immutable after bootstrap
//!   and safely shared across concurrent invocations.
//! - A [`FlowContext`] belongs to exactly one invocation at a time; the
//!   engine never retains it beyond `execute`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;
pub mod testing;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::core::blueprint::BlueprintError;
pub use crate::core::blueprint::BlueprintNode;
pub use crate::core::blueprint::FailurePolicy;
pub use crate::core::blueprint::FlowBlueprint;
pub use crate::core::blueprint::NodeKind;
pub use crate::core::blueprint::StageContract;
pub use crate::core::catalog::FlowModule;
pub use crate::core::catalog::ModuleCatalog;
pub use crate::core::catalog::ModuleContext;
pub use crate::core::catalog::ModuleSignature;
pub use crate::core::hashing::TypeToken;
pub use crate::core::hashing::format_plan_hash;
pub use crate::core::identifiers::FlowName;
pub use crate::core::identifiers::ModuleId;
pub use crate::core::identifiers::ModuleTypeId;
pub use crate::core::identifiers::NodeName;
pub use crate::core::identifiers::StageName;
pub use crate::core::outcome::ErasedPayload;
pub use crate::core::outcome::Outcome;
pub use crate::core::outcome::OutcomeKind;
pub use crate::core::outcome::StageOutcomes;
pub use crate::core::outcome::StepOutcome;
pub use crate::core::outcome::codes;
pub use crate::core::patch::Finding;
pub use crate::core::patch::ModuleEntry;
pub use crate::core::patch::PatchContext;
pub use crate::core::patch::PatchDocument;
pub use crate::core::patch::Severity;
pub use crate::core::patch::StagePatch;
pub use crate::core::patch::cfg_codes;
pub use crate::core::patch::parse_patch;
pub use crate::core::plan::CompileError;
pub use crate::core::plan::PlanExplain;
pub use crate::core::plan::PlanNode;
pub use crate::core::plan::PlanNodeExplain;
pub use crate::core::plan::PlanTemplate;
pub use crate::core::plan::compile;
pub use crate::core::snapshot::ConfigSnapshot;
pub use crate::core::snapshot::EmptySnapshotProvider;
pub use crate::core::snapshot::SnapshotMeta;
pub use crate::interfaces::FlowMetrics;
pub use crate::interfaces::FlowObserver;
pub use crate::interfaces::FlowSpan;
pub use crate::interfaces::NoopMetrics;
pub use crate::interfaces::NoopObserver;
pub use crate::interfaces::ServiceMap;
pub use crate::interfaces::ServiceResolver;
pub use crate::interfaces::SnapshotError;
pub use crate::interfaces::SnapshotProvider;
pub use crate::interfaces::SpanFields;
pub use crate::runtime::context::FlowContext;
pub use crate::runtime::context::FlowContextBuilder;
pub use crate::runtime::context::ResolvedSnapshot;
pub use crate::runtime::engine::Engine;
pub use crate::runtime::explain::ExecExplain;
pub use crate::runtime::explain::ExplainRecord;
pub use crate::runtime::host::FlowHost;
pub use crate::runtime::host::FlowRegistry;
pub use crate::runtime::observe::sanitize_skip_code;
