// rorchestrator-core/src/runtime/host.rs
// ============================================================================
// Module: Flow Host
// Description: Flow registry and the execute-by-name facade.
// Purpose: Resolve flow names to registered plan templates at bootstrap.
// Dependencies: crate::{core, runtime}
// ============================================================================

//! ## Overview
//! Hosts register compiled plans once at bootstrap; the registry is
//! immutable afterwards and shared across invocations. [`FlowHost`] pairs a
//! registry with an engine and resolves a flow name per invocation, keeping
//! the request and response types at the call site.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use rorchestrator_gate::ReasonCode;

use crate::core::outcome::Outcome;
use crate::core::outcome::codes;
use crate::core::plan::PlanExplain;
use crate::core::plan::PlanTemplate;
use crate::runtime::context::FlowContext;
use crate::runtime::engine::Engine;

// ============================================================================
// SECTION: Flow Registry
// ============================================================================

/// One registered flow with its type-erased plan.
struct RegisteredFlow {
    /// The plan template behind a type-erased box.
    plan: Box<dyn Any + Send + Sync>,
    /// Descriptive explain captured at registration.
    explain: PlanExplain,
}

/// Registry mapping flow names to compiled plan templates.
///
/// # Invariants
/// - Registrations are keyed by flow name; later registrations overwrite
///   earlier ones.
#[derive(Default)]
pub struct FlowRegistry {
    /// Registered flows keyed by name.
    flows: BTreeMap<String, RegisteredFlow>,
}

impl FlowRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a compiled plan under its flow name.
    pub fn register<Req, Resp>(&mut self, plan: PlanTemplate<Req, Resp>)
    where
        Req: Send + Sync + 'static,
        Resp: Send + Sync + 'static,
    {
        let explain = plan.explain();
        self.flows.insert(plan.name().to_string(), RegisteredFlow {
            plan: Box::new(Arc::new(plan)),
            explain,
        });
    }

    /// Returns the plan registered under a name with the given types.
    #[must_use]
    pub fn get<Req, Resp>(&self, flow: &str) -> Option<Arc<PlanTemplate<Req, Resp>>>
    where
        Req: Send + Sync + 'static,
        Resp: Send + Sync + 'static,
    {
        self.flows
            .get(flow)
            .and_then(|registered| {
                registered.plan.downcast_ref::<Arc<PlanTemplate<Req, Resp>>>()
            })
            .map(Arc::clone)
    }

    /// Returns the explain of a registered flow.
    #[must_use]
    pub fn explain(&self, flow: &str) -> Option<&PlanExplain> {
        self.flows.get(flow).map(|registered| &registered.explain)
    }

    /// Returns the registered flow names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.flows.keys().map(String::as_str).collect()
    }
}

// ============================================================================
// SECTION: Flow Host
// ============================================================================

/// Facade resolving flow names and driving the engine.
pub struct FlowHost {
    /// Registered flows.
    registry: Arc<FlowRegistry>,
    /// Execution engine.
    engine: Engine,
}

impl FlowHost {
    /// Creates a host over a registry and an engine.
    #[must_use]
    pub const fn new(registry: Arc<FlowRegistry>, engine: Engine) -> Self {
        Self {
            registry,
            engine,
        }
    }

    /// Returns the flow registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<FlowRegistry> {
        &self.registry
    }

    /// Returns the engine.
    #[must_use]
    pub const fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Executes a registered flow by name.
    ///
    /// Unknown names and type mismatches yield `Error("FLOW_NOT_FOUND")`
    /// without invoking the engine.
    pub async fn execute<Req, Resp>(
        &self,
        flow: &str,
        request: Req,
        ctx: Arc<FlowContext>,
    ) -> Outcome<Resp>
    where
        Req: Send + Sync + 'static,
        Resp: Send + Sync + 'static,
    {
        let Some(plan) = self.registry.get::<Req, Resp>(flow) else {
            return Outcome::Error(ReasonCode::new(codes::FLOW_NOT_FOUND));
        };
        self.engine.execute(&plan, request, ctx).await
    }
}
