// rorchestrator-core/tests/support/mod.rs
// ============================================================================
// Module: Engine Test Support
// Description: Shared modules, catalogs, and context helpers for tests.
// ============================================================================
//! ## Overview
//! Test modules covering the common behaviors engine tests need: counting
//! no-ops, sleepers, hangers, and hard failers, plus catalog and context
//! assembly helpers.

#![allow(
    dead_code,
    reason = "Each integration test binary uses a subset of the shared helpers."
)]

use std::sync::Arc;

use async_trait::async_trait;
use rorchestrator_core::FlowModule;
use rorchestrator_core::ModuleCatalog;
use rorchestrator_core::ModuleContext;
use rorchestrator_core::Outcome;
use rorchestrator_core::testing::InvocationCollector;
use rorchestrator_gate::ReasonCode;

/// Request type shared by the test flows.
pub type Req = u32;

/// No-op module recording its invocation and returning `Ok(1)`.
pub struct NoopModule {
    /// Invocation collector shared with the test body.
    pub collector: Arc<InvocationCollector>,
}

#[async_trait]
impl FlowModule for NoopModule {
    type Args = Req;
    type Out = u32;

    async fn execute(&self, ctx: ModuleContext<Req>) -> Outcome<u32> {
        let _guard = self.collector.enter(ctx.module_id.as_str(), ctx.module_type.as_str());
        tokio::task::yield_now().await;
        Outcome::Ok(1)
    }
}

/// Module sleeping for a configured duration while holding its permit.
pub struct SleepModule {
    /// Invocation collector shared with the test body.
    pub collector: Arc<InvocationCollector>,
    /// Sleep duration in milliseconds.
    pub millis: u64,
}

#[async_trait]
impl FlowModule for SleepModule {
    type Args = Req;
    type Out = u32;

    async fn execute(&self, ctx: ModuleContext<Req>) -> Outcome<u32> {
        let _guard = self.collector.enter(ctx.module_id.as_str(), ctx.module_type.as_str());
        tokio::time::sleep(std::time::Duration::from_millis(self.millis)).await;
        Outcome::Ok(1)
    }
}

/// Module that never completes on its own.
pub struct HangModule;

#[async_trait]
impl FlowModule for HangModule {
    type Args = Req;
    type Out = u32;

    async fn execute(&self, _ctx: ModuleContext<Req>) -> Outcome<u32> {
        std::future::pending::<()>().await;
        Outcome::Ok(0)
    }
}

/// Module failing immediately with a fixed code.
pub struct FailModule {
    /// Reason code returned by every invocation.
    pub code: &'static str,
}

#[async_trait]
impl FlowModule for FailModule {
    type Args = Req;
    type Out = u32;

    async fn execute(&self, _ctx: ModuleContext<Req>) -> Outcome<u32> {
        Outcome::Error(ReasonCode::new(self.code))
    }
}

/// Module panicking on invocation.
pub struct PanicModule;

#[async_trait]
impl FlowModule for PanicModule {
    type Args = Req;
    type Out = u32;

    async fn execute(&self, _ctx: ModuleContext<Req>) -> Outcome<u32> {
        panic!("intentional test panic");
    }
}

/// Builds a catalog with the standard test module types.
#[must_use]
pub fn test_catalog(collector: &Arc<InvocationCollector>) -> ModuleCatalog {
    let mut catalog = ModuleCatalog::new();
    let noop = Arc::clone(collector);
    catalog.register("test.noop", move || NoopModule {
        collector: Arc::clone(&noop),
    });
    let sleeper = Arc::clone(collector);
    catalog.register("test.sleep", move || SleepModule {
        collector: Arc::clone(&sleeper),
        millis: 200,
    });
    catalog.register("test.hang", || HangModule);
    catalog.register("test.fail", || FailModule {
        code: "X",
    });
    catalog.register("test.panic", || PanicModule);
    catalog
}

/// Builds a v1 patch configuring one stage of one flow.
#[must_use]
pub fn stage_patch_json(flow: &str, stage: &str, stage_body: &serde_json::Value) -> String {
    serde_json::json!({
        "schemaVersion": "v1",
        "flows": { flow: { "stages": { stage: stage_body } } }
    })
    .to_string()
}
