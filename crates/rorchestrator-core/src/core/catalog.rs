// rorchestrator-core/src/core/catalog.rs
// ============================================================================
// Module: Module Catalog
// Description: Registry mapping module type strings to factories.
// Purpose: Carry module signatures and produce erased instances for the
// engine. Dependencies: async-trait, serde_json, crate::{core, runtime}
// ============================================================================

//! ## Overview
//! User modules implement [`FlowModule`] with typed request and output
//! associated types. The catalog registers them under a module type string,
//! capturing their `(args, out)` signature as [`TypeToken`]s for plan
//! compilation, and wraps them behind [`ErasedModule`] so the engine can
//! schedule heterogeneous stages through one code path.
//!
//! The catalog is populated at bootstrap and immutable afterwards; lookups
//! from concurrent invocations need no locks.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rorchestrator_gate::ReasonCode;
use serde_json::Value;

use crate::core::hashing::TypeToken;
use crate::core::identifiers::ModuleId;
use crate::core::identifiers::ModuleTypeId;
use crate::core::outcome::ErasedPayload;
use crate::core::outcome::Outcome;
use crate::core::outcome::codes;
use crate::runtime::context::FlowContext;

// ============================================================================
// SECTION: Module Contract
// ============================================================================

/// Per-invocation context handed to a module.
pub struct ModuleContext<Args> {
    /// Configured module identifier.
    pub module_id: ModuleId,
    /// Module type string the catalog resolved.
    pub module_type: ModuleTypeId,
    /// Typed flow request shared across the stage's steps.
    pub args: Arc<Args>,
    /// Module-defined `with` parameters from the stage config.
    pub params: Value,
    /// Owning flow context.
    pub flow: Arc<FlowContext>,
}

/// User-supplied unit of compute behind a module type string.
#[async_trait]
pub trait FlowModule: Send + Sync + 'static {
    /// Request type the module consumes; must match the flow's request type.
    type Args: Send + Sync + 'static;
    /// Output type the module produces.
    type Out: Send + Sync + 'static;

    /// Executes the module for one invocation.
    async fn execute(&self, ctx: ModuleContext<Self::Args>) -> Outcome<Self::Out>;
}

// ============================================================================
// SECTION: Erased Invocation
// ============================================================================

/// Erased invocation parameters assembled by the engine.
pub struct ModuleInvocation {
    /// Configured module identifier.
    pub module_id: ModuleId,
    /// Module type string the catalog resolved.
    pub module_type: ModuleTypeId,
    /// Type-erased flow request.
    pub request: Arc<dyn Any + Send + Sync>,
    /// Module-defined `with` parameters.
    pub params: Value,
    /// Owning flow context.
    pub flow: Arc<FlowContext>,
}

/// Object-safe module wrapper the engine schedules.
#[async_trait]
pub trait ErasedModule: Send + Sync {
    /// Executes the module with erased request and payload types.
    async fn invoke(&self, invocation: ModuleInvocation) -> Outcome<ErasedPayload>;
}

/// Typed-to-erased adapter produced at registration.
struct TypedModule<M> {
    /// The wrapped module instance.
    module: M,
}

#[async_trait]
impl<M: FlowModule> ErasedModule for TypedModule<M> {
    async fn invoke(&self, invocation: ModuleInvocation) -> Outcome<ErasedPayload> {
        let Ok(args) = invocation.request.downcast::<M::Args>() else {
            return Outcome::Error(ReasonCode::new(codes::MODULE_ARGS_MISMATCH));
        };
        let ctx = ModuleContext {
            module_id: invocation.module_id,
            module_type: invocation.module_type,
            args,
            params: invocation.params,
            flow: invocation.flow,
        };
        self.module.execute(ctx).await.map_payload(|out| Box::new(out) as ErasedPayload)
    }
}

// ============================================================================
// SECTION: Signatures
// ============================================================================

/// Registered `(args, out)` signature of a module type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSignature {
    /// Request type the module consumes.
    pub args: TypeToken,
    /// Output type the module produces.
    pub out: TypeToken,
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Factory producing a fresh erased module instance per resolution.
type ModuleFactory = dyn Fn() -> Arc<dyn ErasedModule> + Send + Sync;

/// One catalog registration.
struct CatalogEntry {
    /// Signature captured at registration.
    signature: ModuleSignature,
    /// Factory invoked per resolution.
    factory: Box<ModuleFactory>,
}

/// Registry mapping module type strings to factories and signatures.
///
/// # Invariants
/// - Registrations are keyed by module type; later registrations overwrite
///   earlier ones.
#[derive(Default)]
pub struct ModuleCatalog {
    /// Registered entries keyed by module type string.
    entries: BTreeMap<String, CatalogEntry>,
}

impl ModuleCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module type with a factory.
    pub fn register<M, F>(&mut self, module_type: impl Into<String>, factory: F)
    where
        M: FlowModule,
        F: Fn() -> M + Send + Sync + 'static,
    {
        let signature = ModuleSignature {
            args: TypeToken::of::<M::Args>(),
            out: TypeToken::of::<M::Out>(),
        };
        let erased: Box<ModuleFactory> = Box::new(move || {
            Arc::new(TypedModule {
                module: factory(),
            })
        });
        self.entries.insert(module_type.into(), CatalogEntry {
            signature,
            factory: erased,
        });
    }

    /// Returns the signature registered for a module type.
    #[must_use]
    pub fn signature(&self, module_type: &str) -> Option<&ModuleSignature> {
        self.entries.get(module_type).map(|entry| &entry.signature)
    }

    /// Returns true when the module type is registered.
    #[must_use]
    pub fn contains(&self, module_type: &str) -> bool {
        self.entries.contains_key(module_type)
    }

    /// Returns the registered module type strings in sorted order.
    #[must_use]
    pub fn module_types(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Instantiates an erased module for the given type.
    #[must_use]
    pub fn instantiate(&self, module_type: &str) -> Option<Arc<dyn ErasedModule>> {
        self.entries.get(module_type).map(|entry| (entry.factory)())
    }
}
