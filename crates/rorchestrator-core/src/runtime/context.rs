// rorchestrator-core/src/runtime/context.rs
// ============================================================================
// Module: Flow Context
// Description: Per-invocation ambient state handed to the engine.
// Purpose: Carry services, deadline, cancel signal, variants, attributes,
// the cached snapshot, and the explain collector.
// Dependencies: rorchestrator-gate, tokio, tokio-util, crate::{core,
// interfaces, runtime}
// ============================================================================

//! ## Overview
//! A [`FlowContext`] scopes one invocation. Its ambient fields (services,
//! deadline, cancel signal, variants, request attributes, options) are
//! frozen at build time and may be read concurrently from in-stage step
//! tasks. The config snapshot is resolved lazily through the configured
//! provider at most once per context; every later read returns the same
//! value. Explain records are collected behind an internal lock when the
//! context enables tracing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use rorchestrator_gate::GateContext;
use rorchestrator_gate::LayerName;
use rorchestrator_gate::SelectorRegistry;
use serde_json::Value;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::core::patch::PatchContext;
use crate::core::patch::PatchDocument;
use crate::core::patch::parse_patch;
use crate::core::snapshot::ConfigSnapshot;
use crate::core::snapshot::EmptySnapshotProvider;
use crate::interfaces::ServiceMap;
use crate::interfaces::ServiceResolver;
use crate::interfaces::SnapshotError;
use crate::interfaces::SnapshotProvider;
use crate::runtime::explain::ExecExplain;
use crate::runtime::explain::ExplainCollector;
use crate::runtime::explain::ExplainRecord;

// ============================================================================
// SECTION: Resolved Snapshot
// ============================================================================

/// Snapshot paired with its parsed patch document.
pub struct ResolvedSnapshot {
    /// The snapshot value as fetched.
    pub snapshot: ConfigSnapshot,
    /// The parsed patch document.
    pub document: PatchDocument,
}

// ============================================================================
// SECTION: Flow Context
// ============================================================================

/// Per-invocation ambient state.
///
/// # Invariants
/// - Ambient fields are frozen after build; the engine treats the context
///   as exclusive for the duration of one invocation.
/// - The snapshot resolves at most once; subsequent reads see the cached
///   result, success or failure alike.
pub struct FlowContext {
    /// Ambient service resolver.
    services: Arc<dyn ServiceResolver>,
    /// Caller-owned cancel signal.
    cancel: CancellationToken,
    /// Absolute wall-clock deadline, when set.
    deadline: Option<SystemTime>,
    /// User identifier for rollout bucketing, when known.
    user_id: Option<String>,
    /// Experiment variant assignments keyed by layer.
    variants: BTreeMap<LayerName, String>,
    /// Request attributes keyed by field name.
    attrs: BTreeMap<String, String>,
    /// Free-form per-request options.
    options: BTreeMap<String, Value>,
    /// Selector registry for selector gates, when registered.
    selectors: Option<Arc<SelectorRegistry>>,
    /// Snapshot provider queried on first use.
    provider: Arc<dyn SnapshotProvider>,
    /// Cached snapshot resolution result.
    resolved: OnceCell<Result<Arc<ResolvedSnapshot>, SnapshotError>>,
    /// Explain collector, present when tracing is enabled.
    explain: Option<ExplainCollector>,
}

impl FlowContext {
    /// Starts a context builder with empty ambient state.
    #[must_use]
    pub fn builder() -> FlowContextBuilder {
        FlowContextBuilder::default()
    }

    /// Returns the caller's cancel signal.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns the absolute wall-clock deadline, when set.
    #[must_use]
    pub const fn deadline(&self) -> Option<SystemTime> {
        self.deadline
    }

    /// Returns the user identifier, when known.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Returns the experiment variant assignments.
    #[must_use]
    pub const fn variants(&self) -> &BTreeMap<LayerName, String> {
        &self.variants
    }

    /// Returns the request attributes.
    #[must_use]
    pub const fn attrs(&self) -> &BTreeMap<String, String> {
        &self.attrs
    }

    /// Returns a per-request option by key.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Resolves an ambient service by concrete type.
    #[must_use]
    pub fn service<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services.resolve(TypeId::of::<T>()).and_then(|service| service.downcast::<T>().ok())
    }

    /// Returns the gate evaluation view of this context.
    #[must_use]
    pub fn gate_context(&self) -> GateContext<'_> {
        GateContext {
            user_id: self.user_id.as_deref(),
            variants: &self.variants,
            attrs: &self.attrs,
            selectors: self.selectors.as_deref(),
        }
    }

    /// Resolves the config snapshot, fetching and parsing at most once.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] when the provider fails or the patch does
    /// not parse; the failure is cached like a success.
    pub async fn snapshot(&self) -> Result<Arc<ResolvedSnapshot>, SnapshotError> {
        self.resolved
            .get_or_init(|| async {
                let snapshot = self.provider.fetch().await?;
                let document = parse_patch(&snapshot.patch_json, &PatchContext::empty())
                    .map_err(|finding| {
                        SnapshotError::Unavailable(format!(
                            "patch invalid at {}: {}",
                            finding.path, finding.message
                        ))
                    })?;
                Ok(Arc::new(ResolvedSnapshot {
                    snapshot,
                    document,
                }))
            })
            .await
            .clone()
    }

    /// Returns true when explain collection is enabled.
    #[must_use]
    pub const fn explain_enabled(&self) -> bool {
        self.explain.is_some()
    }

    /// Records an explain record when tracing is enabled.
    pub(crate) fn record_explain(&self, record: ExplainRecord) {
        if let Some(collector) = &self.explain {
            collector.record(record);
        }
    }

    /// Takes the collected explain trace, when tracing is enabled.
    #[must_use]
    pub fn take_explain(&self) -> Option<ExecExplain> {
        self.explain.as_ref().map(ExplainCollector::take)
    }
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Fluent builder for [`FlowContext`].
pub struct FlowContextBuilder {
    /// Ambient service resolver.
    services: Arc<dyn ServiceResolver>,
    /// Caller-owned cancel signal.
    cancel: CancellationToken,
    /// Absolute wall-clock deadline.
    deadline: Option<SystemTime>,
    /// User identifier.
    user_id: Option<String>,
    /// Experiment variant assignments.
    variants: BTreeMap<LayerName, String>,
    /// Request attributes.
    attrs: BTreeMap<String, String>,
    /// Free-form per-request options.
    options: BTreeMap<String, Value>,
    /// Selector registry.
    selectors: Option<Arc<SelectorRegistry>>,
    /// Snapshot provider.
    provider: Arc<dyn SnapshotProvider>,
    /// Whether explain collection is enabled.
    explain: bool,
}

impl Default for FlowContextBuilder {
    fn default() -> Self {
        Self {
            services: Arc::new(ServiceMap::new()),
            cancel: CancellationToken::new(),
            deadline: None,
            user_id: None,
            variants: BTreeMap::new(),
            attrs: BTreeMap::new(),
            options: BTreeMap::new(),
            selectors: None,
            provider: Arc::new(EmptySnapshotProvider),
            explain: false,
        }
    }
}

impl FlowContextBuilder {
    /// Sets the ambient service resolver.
    #[must_use]
    pub fn services(mut self, services: Arc<dyn ServiceResolver>) -> Self {
        self.services = services;
        self
    }

    /// Sets the caller-owned cancel signal.
    #[must_use]
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sets the absolute wall-clock deadline.
    #[must_use]
    pub fn deadline(mut self, deadline: SystemTime) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the user identifier.
    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Assigns an experiment variant for a layer.
    #[must_use]
    pub fn variant(mut self, layer: impl Into<LayerName>, variant: impl Into<String>) -> Self {
        self.variants.insert(layer.into(), variant.into());
        self
    }

    /// Sets a request attribute.
    #[must_use]
    pub fn request_attr(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(field.into(), value.into());
        self
    }

    /// Sets a free-form per-request option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Registers the selector registry for selector gates.
    #[must_use]
    pub fn selectors(mut self, selectors: Arc<SelectorRegistry>) -> Self {
        self.selectors = Some(selectors);
        self
    }

    /// Sets the snapshot provider.
    #[must_use]
    pub fn snapshot_provider(mut self, provider: Arc<dyn SnapshotProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Enables explain collection for this invocation.
    #[must_use]
    pub fn explain(mut self) -> Self {
        self.explain = true;
        self
    }

    /// Builds the immutable context.
    #[must_use]
    pub fn build(self) -> FlowContext {
        FlowContext {
            services: self.services,
            cancel: self.cancel,
            deadline: self.deadline,
            user_id: self.user_id,
            variants: self.variants,
            attrs: self.attrs,
            options: self.options,
            selectors: self.selectors,
            provider: self.provider,
            resolved: OnceCell::new(),
            explain: self.explain.then(ExplainCollector::default),
        }
    }
}
