// rorchestrator-core/src/runtime/engine.rs
// ============================================================================
// Module: Execution Engine
// Description: Stage scheduling, step fan-out, join reduction, cancellation.
// Purpose: Drive compiled plan templates to a flow outcome with bounded
// parallelism and per-node observability.
// Dependencies: rorchestrator-gate, tokio, tokio-util, crate::{core,
// interfaces, runtime}
// ============================================================================

//! ## Overview
//! The engine is the single execution path for compiled flows. Stages run
//! strictly in declaration order; within a stage, step modules fan out with
//! concurrency bounded by the effective fan-out limit and race a per-stage
//! cancel token. Gate-denied modules are recorded as skipped without
//! invocation. The stage's join reduces the recorded outcomes exactly once
//! after quiescence; a non-ok join outcome short-circuits the remaining
//! stages.
//!
//! Invariants:
//! - Every dispatched task is awaited before `execute` returns.
//! - Once the deadline or the caller's cancel signal fires, no new module
//!   is invoked and in-flight modules observe cancellation.
//! - Module panics are trapped and recorded as `MODULE_EXCEPTION`; fatal
//!   host conditions propagate unchanged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;
use std::time::SystemTime;

use rorchestrator_gate::Gate;
use rorchestrator_gate::GateDecision;
use rorchestrator_gate::ReasonCode;
use rorchestrator_gate::evaluate;
use serde_json::Map;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::blueprint::FailurePolicy;
use crate::core::blueprint::NodeKind;
use crate::core::blueprint::StageContract;
use crate::core::catalog::ModuleCatalog;
use crate::core::catalog::ModuleInvocation;
use crate::core::identifiers::ModuleId;
use crate::core::identifiers::ModuleTypeId;
use crate::core::identifiers::StageName;
use crate::core::outcome::ErasedPayload;
use crate::core::outcome::Outcome;
use crate::core::outcome::OutcomeKind;
use crate::core::outcome::StageOutcomes;
use crate::core::outcome::StepOutcome;
use crate::core::outcome::codes;
use crate::core::patch::PatchDocument;
use crate::core::patch::StagePatch;
use crate::core::plan::PlanNode;
use crate::core::plan::PlanTemplate;
use crate::interfaces::FlowMetrics;
use crate::interfaces::FlowObserver;
use crate::interfaces::NoopMetrics;
use crate::interfaces::NoopObserver;
use crate::interfaces::SpanFields;
use crate::runtime::context::FlowContext;
use crate::runtime::explain::ExplainRecord;
use crate::runtime::observe;

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Execution engine driving compiled plan templates.
///
/// The engine is cheap to clone per host and safe to share across concurrent
/// invocations; all per-invocation state lives on the stack of `execute`.
pub struct Engine {
    /// Module catalog resolved at step invocation time.
    catalog: Arc<ModuleCatalog>,
    /// Span sink.
    observer: Arc<dyn FlowObserver>,
    /// Metric sink.
    metrics: Arc<dyn FlowMetrics>,
}

impl Engine {
    /// Creates an engine with no-op observability sinks.
    #[must_use]
    pub fn new(catalog: Arc<ModuleCatalog>) -> Self {
        Self {
            catalog,
            observer: Arc::new(NoopObserver),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Replaces the observability sinks.
    #[must_use]
    pub fn with_observability(
        mut self,
        observer: Arc<dyn FlowObserver>,
        metrics: Arc<dyn FlowMetrics>,
    ) -> Self {
        self.observer = observer;
        self.metrics = metrics;
        self
    }

    /// Returns the engine's module catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Arc<ModuleCatalog> {
        &self.catalog
    }

    /// Executes a compiled plan for one request.
    ///
    /// The context's deadline and cancel signal are honored: once either
    /// fires, no new modules are invoked, in-flight modules observe a
    /// derived cancel signal, and every dispatched task is awaited before
    /// this method returns.
    pub async fn execute<Req, Resp>(
        &self,
        plan: &PlanTemplate<Req, Resp>,
        request: Req,
        ctx: Arc<FlowContext>,
    ) -> Outcome<Resp>
    where
        Req: Send + Sync + 'static,
        Resp: Send + Sync + 'static,
    {
        let started = Instant::now();
        let plan_hash = plan.plan_hash_hex();

        let resolved = ctx.snapshot().await;
        let config_version = resolved.as_ref().ok().map(|r| r.snapshot.config_version);
        let flow_span = self.observer.start_span(&SpanFields {
            name: observe::SPAN_FLOW,
            flow: plan.name().as_str(),
            plan_hash: &plan_hash,
            config_version,
            node: None,
            node_kind: None,
            stage: None,
            module_id: None,
            module_type: None,
        });

        let erased = match resolved {
            Err(_) => Outcome::Error(ReasonCode::new(codes::CFG_UNAVAILABLE)),
            Ok(resolved) => {
                let env = RunEnv {
                    flow: plan.name().as_str(),
                    plan_hash: &plan_hash,
                    config_version,
                    nodes: plan.nodes(),
                    contracts: plan.stage_contracts(),
                    document: &resolved.document,
                    deadline: deadline_instant(ctx.deadline()),
                };
                let request: Arc<dyn Any + Send + Sync> = Arc::new(request);
                self.run_stages(&env, &request, &ctx).await
            }
        };

        let outcome = match erased.downcast::<Resp>() {
            Ok(outcome) => outcome,
            Err(_) => Outcome::Error(ReasonCode::new(codes::JOIN_TYPE_MISMATCH)),
        };

        let elapsed = duration_ms(started.elapsed());
        flow_span.end(outcome.kind().as_str(), outcome.code());
        let version_tag = config_version.map(|version| version.to_string());
        let mut tags: Vec<(&'static str, &str)> = vec![
            (observe::TAG_FLOW_NAME, plan.name().as_str()),
            (observe::TAG_PLAN_HASH, plan_hash.as_str()),
            (observe::TAG_OUTCOME_KIND, outcome.kind().as_str()),
            (observe::TAG_OUTCOME_CODE, outcome.code()),
        ];
        if let Some(version) = version_tag.as_deref() {
            tags.push((observe::TAG_CONFIG_VERSION, version));
        }
        self.metrics.increment(observe::CTR_FLOW_OUTCOMES, &tags);
        self.metrics.record_latency_ms(observe::HIST_FLOW_LATENCY, elapsed, &tags);

        outcome
    }

    /// Runs all stages in declaration order.
    async fn run_stages(
        &self,
        env: &RunEnv<'_>,
        request: &Arc<dyn Any + Send + Sync>,
        ctx: &Arc<FlowContext>,
    ) -> Outcome<ErasedPayload> {
        let last = env.contracts.len().saturating_sub(1);
        for (stage_index, (stage, contract)) in env.contracts.iter().enumerate() {
            if ctx.cancel_token().is_cancelled() {
                return Outcome::Canceled(ReasonCode::new(codes::FLOW_CANCELED));
            }
            if env.deadline.is_some_and(|at| Instant::now() >= at) {
                return Outcome::Timeout(ReasonCode::new(codes::FLOW_DEADLINE));
            }

            let result = self.run_stage(env, stage, *contract, request, ctx).await;
            match result {
                StageRun::Completed(outcome) => {
                    let decisive = !matches!(
                        outcome.kind(),
                        OutcomeKind::Ok | OutcomeKind::Fallback
                    );
                    if stage_index == last || decisive {
                        return outcome;
                    }
                }
                StageRun::Interrupted(Interrupt::Caller) => {
                    return Outcome::Canceled(ReasonCode::new(codes::FLOW_CANCELED));
                }
                StageRun::Interrupted(Interrupt::Deadline) => {
                    return Outcome::Timeout(ReasonCode::new(codes::FLOW_DEADLINE));
                }
                StageRun::Fatal(code) => return Outcome::Error(ReasonCode::new(code)),
            }
        }
        Outcome::Error(ReasonCode::new(codes::PLAN_INVALID))
    }

    /// Runs one stage: gate partition, bounded fan-out, and join reduction.
    #[allow(
        clippy::too_many_lines,
        reason = "Maintain a single linear flow for ordered scheduling and cancellation."
    )]
    async fn run_stage(
        &self,
        env: &RunEnv<'_>,
        stage: &StageName,
        contract: StageContract,
        request: &Arc<dyn Any + Send + Sync>,
        ctx: &Arc<FlowContext>,
    ) -> StageRun {
        let stage_patch = env.document.stage(env.flow, stage.as_str());
        let steps = resolve_stage_steps(env.nodes, stage, stage_patch);
        let policy = stage_patch
            .and_then(|patch| patch.failure_policy)
            .unwrap_or(contract.failure_policy);
        let fanout = stage_patch
            .and_then(|patch| patch.fanout_max)
            .or(contract.fanout_max)
            .unwrap_or_else(|| steps.len().max(1));

        let mut outcomes = StageOutcomes::new();
        let mut runnable = Vec::with_capacity(steps.len());
        for step in steps {
            let decision = match &step.gate {
                None => None,
                Some(gate) => match evaluate(gate, &ctx.gate_context()) {
                    Err(_) => return StageRun::Fatal(codes::GATE_SELECTOR_UNAVAILABLE),
                    Ok(decision) => Some(decision),
                },
            };
            if let Some(decision) = &decision
                && !decision.allowed
            {
                let outcome = Outcome::Skipped(decision.reason_code.clone());
                self.emit_step(env, ctx, stage, &step, &outcome, 0, Some(decision.clone()));
                outcomes.push(StepOutcome {
                    module_id: step.module_id,
                    module_type: step.module_type,
                    outcome,
                });
                continue;
            }
            runnable.push((step, decision));
        }

        let stage_token = CancellationToken::new();
        let cancel_reason: Arc<OnceLock<&'static str>> = Arc::new(OnceLock::new());
        let semaphore = Arc::new(Semaphore::new(fanout));
        let mut join_set: JoinSet<(Outcome<ErasedPayload>, u64)> = JoinSet::new();
        let mut dispatched: HashMap<tokio::task::Id, (ResolvedStep, Option<GateDecision>)> =
            HashMap::new();

        for (step, decision) in runnable {
            let task = StepTask {
                catalog: Arc::clone(&self.catalog),
                observer: Arc::clone(&self.observer),
                semaphore: Arc::clone(&semaphore),
                stage_token: stage_token.clone(),
                cancel_reason: Arc::clone(&cancel_reason),
                request: Arc::clone(request),
                ctx: Arc::clone(ctx),
                flow: env.flow.to_string(),
                plan_hash: env.plan_hash.to_string(),
                config_version: env.config_version,
                stage: stage.clone(),
                step: step.clone(),
            };
            let handle = join_set.spawn(task.run());
            dispatched.insert(handle.id(), (step, decision));
        }

        let mut interrupt: Option<Interrupt> = None;
        let mut short_circuited = false;
        let caller_cancelled = ctx.cancel_token().cancelled();
        tokio::pin!(caller_cancelled);
        let deadline_sleep = sleep_until_or_forever(env.deadline);
        tokio::pin!(deadline_sleep);

        loop {
            tokio::select! {
                joined = join_set.join_next_with_id() => {
                    let Some(joined) = joined else {
                        break;
                    };
                    let (task_id, outcome, duration) = match joined {
                        Ok((task_id, (outcome, duration))) => (task_id, outcome, duration),
                        Err(join_err) => {
                            let outcome = if join_err.is_panic() {
                                Outcome::Error(ReasonCode::new(codes::MODULE_EXCEPTION))
                            } else {
                                Outcome::Canceled(ReasonCode::new(codes::STAGE_SHORT_CIRCUIT))
                            };
                            (join_err.id(), outcome, 0)
                        }
                    };
                    let Some((step, decision)) = dispatched.remove(&task_id) else {
                        continue;
                    };
                    self.emit_step(env, ctx, stage, &step, &outcome, duration, decision);
                    let failed = !matches!(
                        outcome.kind(),
                        OutcomeKind::Ok | OutcomeKind::Skipped | OutcomeKind::Fallback
                    );
                    outcomes.push(StepOutcome {
                        module_id: step.module_id,
                        module_type: step.module_type,
                        outcome,
                    });
                    if failed
                        && policy == FailurePolicy::ShortCircuit
                        && !short_circuited
                        && interrupt.is_none()
                    {
                        short_circuited = true;
                        let _ = cancel_reason.set(codes::STAGE_SHORT_CIRCUIT);
                        stage_token.cancel();
                    }
                }
                () = &mut caller_cancelled, if interrupt.is_none() => {
                    interrupt = Some(Interrupt::Caller);
                    let _ = cancel_reason.set(codes::FLOW_CANCELED);
                    stage_token.cancel();
                }
                () = &mut deadline_sleep, if interrupt.is_none() => {
                    interrupt = Some(Interrupt::Deadline);
                    let _ = cancel_reason.set(codes::FLOW_DEADLINE);
                    stage_token.cancel();
                }
            }
        }

        if let Some(interrupt) = interrupt {
            return StageRun::Interrupted(interrupt);
        }

        let Some(join_node) = stage_join(env.nodes, stage) else {
            return StageRun::Fatal(codes::PLAN_INVALID);
        };
        let Some(reducer) = join_node.reducer() else {
            return StageRun::Fatal(codes::PLAN_INVALID);
        };

        let join_started = Instant::now();
        let join_span = self.observer.start_span(&SpanFields {
            name: observe::SPAN_JOIN,
            flow: env.flow,
            plan_hash: env.plan_hash,
            config_version: env.config_version,
            node: Some(join_node.name.as_str()),
            node_kind: Some("join"),
            stage: Some(stage.as_str()),
            module_id: None,
            module_type: None,
        });
        let join_outcome = reducer(&outcomes, ctx);
        let join_elapsed = duration_ms(join_started.elapsed());
        join_span.end(join_outcome.kind().as_str(), join_outcome.code());
        self.emit_join(env, ctx, stage, join_node, &join_outcome, join_elapsed);

        StageRun::Completed(join_outcome)
    }

    /// Emits metrics and the explain record for one step completion.
    #[allow(
        clippy::too_many_arguments,
        reason = "Emission needs the full invocation coordinates; bundling them buys nothing."
    )]
    fn emit_step(
        &self,
        env: &RunEnv<'_>,
        ctx: &FlowContext,
        stage: &StageName,
        step: &ResolvedStep,
        outcome: &Outcome<ErasedPayload>,
        duration_ms: u64,
        gate: Option<GateDecision>,
    ) {
        let version_tag = env.config_version.map(|version| version.to_string());
        let mut tags: Vec<(&'static str, &str)> = vec![
            (observe::TAG_FLOW_NAME, env.flow),
            (observe::TAG_PLAN_HASH, env.plan_hash),
            (observe::TAG_STAGE_NAME, stage.as_str()),
            (observe::TAG_MODULE_ID, step.module_id.as_str()),
            (observe::TAG_MODULE_TYPE, step.module_type.as_str()),
            (observe::TAG_OUTCOME_KIND, outcome.kind().as_str()),
            (observe::TAG_OUTCOME_CODE, outcome.code()),
        ];
        if let Some(version) = version_tag.as_deref() {
            tags.push((observe::TAG_CONFIG_VERSION, version));
        }
        self.metrics.increment(observe::CTR_STEP_OUTCOMES, &tags);

        if outcome.kind() == OutcomeKind::Skipped {
            let skip_code = observe::sanitize_skip_code(outcome.code());
            let skip_tags: Vec<(&'static str, &str)> = vec![
                (observe::TAG_FLOW_NAME, env.flow),
                (observe::TAG_STAGE_NAME, stage.as_str()),
                (observe::TAG_MODULE_ID, step.module_id.as_str()),
                (observe::TAG_SKIP_CODE, skip_code.as_str()),
            ];
            self.metrics.increment(observe::CTR_STEP_SKIPPED, &skip_tags);
        } else {
            self.metrics.record_latency_ms(observe::HIST_STEP_LATENCY, duration_ms, &tags);
        }

        ctx.record_explain(ExplainRecord {
            node: step.node_name.clone(),
            stage: stage.to_string(),
            kind: "step".to_string(),
            outcome_kind: outcome.kind().as_str().to_string(),
            outcome_code: outcome.code().to_string(),
            module_id: Some(step.module_id.to_string()),
            module_type: Some(step.module_type.to_string()),
            gate,
            duration_ms,
        });
    }

    /// Emits metrics and the explain record for one join completion.
    fn emit_join(
        &self,
        env: &RunEnv<'_>,
        ctx: &FlowContext,
        stage: &StageName,
        join_node: &PlanNode,
        outcome: &Outcome<ErasedPayload>,
        duration_ms: u64,
    ) {
        let version_tag = env.config_version.map(|version| version.to_string());
        let mut tags: Vec<(&'static str, &str)> = vec![
            (observe::TAG_FLOW_NAME, env.flow),
            (observe::TAG_PLAN_HASH, env.plan_hash),
            (observe::TAG_STAGE_NAME, stage.as_str()),
            (observe::TAG_NODE_NAME, join_node.name.as_str()),
            (observe::TAG_NODE_KIND, "join"),
            (observe::TAG_OUTCOME_KIND, outcome.kind().as_str()),
            (observe::TAG_OUTCOME_CODE, outcome.code()),
        ];
        if let Some(version) = version_tag.as_deref() {
            tags.push((observe::TAG_CONFIG_VERSION, version));
        }
        self.metrics.increment(observe::CTR_JOIN_OUTCOMES, &tags);
        self.metrics.record_latency_ms(observe::HIST_JOIN_LATENCY, duration_ms, &tags);
        ctx.record_explain(ExplainRecord {
            node: join_node.name.to_string(),
            stage: stage.to_string(),
            kind: "join".to_string(),
            outcome_kind: outcome.kind().as_str().to_string(),
            outcome_code: outcome.code().to_string(),
            module_id: None,
            module_type: None,
            gate: None,
            duration_ms,
        });
    }
}

// ============================================================================
// SECTION: Run Environment
// ============================================================================

/// Borrowed per-invocation state threaded through the stage loop.
struct RunEnv<'a> {
    /// Flow name.
    flow: &'a str,
    /// Plan hash in 16-hex form.
    plan_hash: &'a str,
    /// Config version of the resolved snapshot.
    config_version: Option<u64>,
    /// Compiled plan nodes.
    nodes: &'a [PlanNode],
    /// Ordered stage contracts.
    contracts: &'a [(StageName, StageContract)],
    /// Parsed patch document of the resolved snapshot.
    document: &'a PatchDocument,
    /// Flow deadline converted to a monotonic instant.
    deadline: Option<Instant>,
}

/// Stage execution result.
enum StageRun {
    /// The stage's join produced this outcome.
    Completed(Outcome<ErasedPayload>),
    /// The stage was interrupted before its join could run.
    Interrupted(Interrupt),
    /// The stage failed with an engine-level error code.
    Fatal(&'static str),
}

/// Interrupt source that preempted a stage.
enum Interrupt {
    /// Caller cancel signal fired.
    Caller,
    /// Flow deadline elapsed.
    Deadline,
}

// ============================================================================
// SECTION: Step Resolution
// ============================================================================

/// One schedulable step of a stage.
#[derive(Clone)]
struct ResolvedStep {
    /// Node name for explain records; the module id for config-driven steps.
    node_name: String,
    /// Module id keying the step's outcome.
    module_id: ModuleId,
    /// Module type resolved through the catalog.
    module_type: ModuleTypeId,
    /// Module-defined `with` parameters.
    params: Value,
    /// Optional gate controlling the step.
    gate: Option<Gate>,
    /// Span name for the step's invocation.
    span_name: &'static str,
}

/// Resolves a stage's step set from config, falling back to the blueprint.
///
/// A snapshot that configures modules for the stage defines the step set;
/// otherwise the blueprint's static step nodes run with empty parameters
/// and no gates.
fn resolve_stage_steps(
    nodes: &[PlanNode],
    stage: &StageName,
    stage_patch: Option<&StagePatch>,
) -> Vec<ResolvedStep> {
    if let Some(patch) = stage_patch
        && !patch.modules.is_empty()
    {
        return patch
            .modules
            .iter()
            .map(|entry| ResolvedStep {
                node_name: entry.id.to_string(),
                module_id: entry.id.clone(),
                module_type: entry.module_type.clone(),
                params: entry.params.clone(),
                gate: entry.gate.clone(),
                span_name: observe::SPAN_FANOUT_MODULE,
            })
            .collect();
    }

    nodes
        .iter()
        .filter(|node| {
            &node.stage == stage && node.kind() == NodeKind::Step
        })
        .map(|node| ResolvedStep {
            node_name: node.name.to_string(),
            module_id: ModuleId::new(node.name.as_str()),
            module_type: node
                .module_type()
                .cloned()
                .unwrap_or_else(|| ModuleTypeId::new("")),
            params: Value::Object(Map::new()),
            gate: None,
            span_name: observe::SPAN_STEP,
        })
        .collect()
}

/// Returns the join node closing a stage.
fn stage_join<'a>(nodes: &'a [PlanNode], stage: &StageName) -> Option<&'a PlanNode> {
    nodes.iter().find(|node| &node.stage == stage && node.kind() == NodeKind::Join)
}

// ============================================================================
// SECTION: Step Task
// ============================================================================

/// Bundled parameters for one spawned step invocation.
struct StepTask {
    /// Module catalog for factory resolution.
    catalog: Arc<ModuleCatalog>,
    /// Span sink.
    observer: Arc<dyn FlowObserver>,
    /// Fan-out bound shared by the stage's tasks.
    semaphore: Arc<Semaphore>,
    /// Per-stage cancel token.
    stage_token: CancellationToken,
    /// Reason code recorded by tasks canceled through the stage token.
    cancel_reason: Arc<OnceLock<&'static str>>,
    /// Type-erased flow request.
    request: Arc<dyn Any + Send + Sync>,
    /// Owning flow context.
    ctx: Arc<FlowContext>,
    /// Flow name.
    flow: String,
    /// Plan hash in 16-hex form.
    plan_hash: String,
    /// Config version of the resolved snapshot.
    config_version: Option<u64>,
    /// Stage name.
    stage: StageName,
    /// Resolved step under execution.
    step: ResolvedStep,
}

impl StepTask {
    /// Runs the step: bound concurrency, check cancellation, invoke, trace.
    async fn run(self) -> (Outcome<ErasedPayload>, u64) {
        let Ok(_permit) = self.semaphore.acquire().await else {
            return (self.canceled_outcome(), 0);
        };
        if self.stage_token.is_cancelled() {
            return (self.canceled_outcome(), 0);
        }
        let Some(module) = self.catalog.instantiate(self.step.module_type.as_str()) else {
            return (Outcome::Error(ReasonCode::new(codes::MODULE_NOT_REGISTERED)), 0);
        };

        let started = Instant::now();
        let span = self.observer.start_span(&SpanFields {
            name: self.step.span_name,
            flow: &self.flow,
            plan_hash: &self.plan_hash,
            config_version: self.config_version,
            node: Some(&self.step.node_name),
            node_kind: Some("step"),
            stage: Some(self.stage.as_str()),
            module_id: Some(self.step.module_id.as_str()),
            module_type: Some(self.step.module_type.as_str()),
        });

        let invocation = ModuleInvocation {
            module_id: self.step.module_id.clone(),
            module_type: self.step.module_type.clone(),
            request: Arc::clone(&self.request),
            params: self.step.params.clone(),
            flow: Arc::clone(&self.ctx),
        };
        let outcome = tokio::select! {
            outcome = module.invoke(invocation) => outcome,
            () = self.stage_token.cancelled() => self.canceled_outcome(),
        };
        let elapsed = duration_ms(started.elapsed());
        span.end(outcome.kind().as_str(), outcome.code());
        (outcome, elapsed)
    }

    /// Builds the cancellation outcome carrying the stage's cancel reason.
    fn canceled_outcome(&self) -> Outcome<ErasedPayload> {
        let reason = self.cancel_reason.get().copied().unwrap_or(codes::STAGE_SHORT_CIRCUIT);
        Outcome::Canceled(ReasonCode::new(reason))
    }
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

/// Converts the wall-clock deadline to a monotonic instant.
fn deadline_instant(deadline: Option<SystemTime>) -> Option<Instant> {
    deadline.map(|when| {
        let remaining =
            when.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO);
        Instant::now() + remaining
    })
}

/// Sleeps until the deadline, or forever when none is set.
async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Saturating millisecond rendering of a duration.
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
