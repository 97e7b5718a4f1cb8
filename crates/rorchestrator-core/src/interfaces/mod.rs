// rorchestrator-core/src/interfaces/mod.rs
// ============================================================================
// Module: Core Interfaces
// Description: Host-implementable interfaces the engine depends on.
// Purpose: Define snapshot, service, and observability seams.
// Dependencies: async-trait, thiserror, crate::core
// ============================================================================

//! ## Overview
//! The engine reaches its environment exclusively through these interfaces:
//! snapshot acquisition, ambient service resolution, and the observability
//! sinks. All of them are object-safe and `Send + Sync` so one host wiring
//! serves every concurrent invocation. No-op observability implementations
//! keep tests and minimal hosts dependency-free, in the same spirit as the
//! engine's fixed metric names living alongside the runtime.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::snapshot::ConfigSnapshot;

// ============================================================================
// SECTION: Snapshot Acquisition
// ============================================================================

/// Errors raised while acquiring a config snapshot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// The provider could not produce a snapshot.
    #[error("config snapshot unavailable: {0}")]
    Unavailable(String),
}

/// Source of config snapshots for flow contexts.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Fetches the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] when no snapshot can be produced; the
    /// engine surfaces this as `Error("CFG_UNAVAILABLE")`.
    async fn fetch(&self) -> Result<ConfigSnapshot, SnapshotError>;
}

// ============================================================================
// SECTION: Service Resolution
// ============================================================================

/// Ambient service resolver a flow context exposes to modules.
pub trait ServiceResolver: Send + Sync {
    /// Resolves a service by type identity.
    fn resolve(&self, type_id: TypeId) -> Option<Arc<dyn Any + Send + Sync>>;
}

/// Simple type-map service resolver for hosts and tests.
#[derive(Default)]
pub struct ServiceMap {
    /// Registered services keyed by type identity.
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceMap {
    /// Creates an empty service map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service instance under its concrete type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, service: Arc<T>) {
        self.services.insert(TypeId::of::<T>(), service);
    }
}

impl ServiceResolver for ServiceMap {
    fn resolve(&self, type_id: TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.services.get(&type_id).map(Arc::clone)
    }
}

// ============================================================================
// SECTION: Observability Sinks
// ============================================================================

/// Tag values attached to a span at start time.
///
/// # Invariants
/// - Optional fields are `None` for span kinds that do not carry them.
#[derive(Debug, Clone, Copy)]
pub struct SpanFields<'a> {
    /// Span name (one of the fixed span name constants).
    pub name: &'static str,
    /// Flow name.
    pub flow: &'a str,
    /// Plan hash in 16-hex form.
    pub plan_hash: &'a str,
    /// Config version, when a snapshot was resolved.
    pub config_version: Option<u64>,
    /// Node name for node-level spans.
    pub node: Option<&'a str>,
    /// Node kind label for node-level spans.
    pub node_kind: Option<&'a str>,
    /// Stage name for node-level spans.
    pub stage: Option<&'a str>,
    /// Module id for step spans.
    pub module_id: Option<&'a str>,
    /// Module type for step spans.
    pub module_type: Option<&'a str>,
}

/// Live span handle completed with the node's outcome.
pub trait FlowSpan: Send {
    /// Ends the span, tagging it with the outcome kind and code.
    fn end(self: Box<Self>, outcome_kind: &str, outcome_code: &str);
}

/// Span sink starting one span per flow, step, and join.
pub trait FlowObserver: Send + Sync {
    /// Starts a span with the given tag values.
    fn start_span(&self, fields: &SpanFields<'_>) -> Box<dyn FlowSpan>;
}

/// Metric sink recording latencies and outcome counters.
pub trait FlowMetrics: Send + Sync {
    /// Records a latency histogram sample in milliseconds.
    fn record_latency_ms(&self, name: &'static str, millis: u64, tags: &[(&'static str, &str)]);

    /// Increments an outcome counter.
    fn increment(&self, name: &'static str, tags: &[(&'static str, &str)]);
}

// ============================================================================
// SECTION: No-op Sinks
// ============================================================================

/// Observer discarding every span.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

/// Span handle discarding its completion.
struct NoopSpan;

impl FlowSpan for NoopSpan {
    fn end(self: Box<Self>, _outcome_kind: &str, _outcome_code: &str) {}
}

impl FlowObserver for NoopObserver {
    fn start_span(&self, _fields: &SpanFields<'_>) -> Box<dyn FlowSpan> {
        Box::new(NoopSpan)
    }
}

/// Metrics sink discarding every sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl FlowMetrics for NoopMetrics {
    fn record_latency_ms(&self, _name: &'static str, _millis: u64, _tags: &[(&'static str, &str)]) {
    }

    fn increment(&self, _name: &'static str, _tags: &[(&'static str, &str)]) {}
}
