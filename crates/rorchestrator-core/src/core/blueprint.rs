// rorchestrator-core/src/core/blueprint.rs
// ============================================================================
// Module: Flow Blueprints
// Description: Fluent construction of a flow's staged node DAG.
// Purpose: Define blueprint nodes, stage contracts, and the typed builder.
// Dependencies: serde, crate::{core, runtime}
// ============================================================================

//! ## Overview
//! A blueprint declares a flow statically: ordered stages, each holding step
//! nodes and a terminal join reducer. The builder is fluent and defers
//! validation to [`BlueprintBuilder::build`], which enforces the structural
//! invariants (unique node names, non-empty stages, join-terminated stages,
//! a join-terminated flow). Blueprints are immutable values; compilation
//! into an executable plan happens in the plan module.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::hashing::TypeToken;
use crate::core::identifiers::FlowName;
use crate::core::identifiers::ModuleTypeId;
use crate::core::identifiers::NodeName;
use crate::core::identifiers::StageName;
use crate::core::outcome::ErasedPayload;
use crate::core::outcome::Outcome;
use crate::core::outcome::StageOutcomes;
use crate::runtime::context::FlowContext;

// ============================================================================
// SECTION: Stage Contracts
// ============================================================================

/// Failure handling policy for a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Cancel remaining in-flight steps on the first non-ok step outcome and
    /// reduce over the partial outcomes.
    ShortCircuit,
    /// Wait for every step to terminate before reducing.
    Continue,
}

impl FailurePolicy {
    /// Parses the canonical wire name of a policy.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ShortCircuit" => Some(Self::ShortCircuit),
            "Continue" => Some(Self::Continue),
            _ => None,
        }
    }

    /// Returns the canonical wire name of the policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShortCircuit => "ShortCircuit",
            Self::Continue => "Continue",
        }
    }
}

/// Declarative per-stage policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageContract {
    /// Failure handling policy.
    pub failure_policy: FailurePolicy,
    /// Default fan-out bound when the config supplies none.
    pub fanout_max: Option<usize>,
}

impl Default for StageContract {
    /// Short-circuiting contract with unbounded fan-out.
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::ShortCircuit,
            fanout_max: None,
        }
    }
}

// ============================================================================
// SECTION: Nodes
// ============================================================================

/// Kind of a blueprint node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Step node invoking a registered module.
    Step,
    /// Join node reducing a stage's step outcomes.
    Join,
}

impl NodeKind {
    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Step => "step",
            Self::Join => "join",
        }
    }
}

/// Join reducer over a stage's recorded outcomes.
pub(crate) type JoinReducer =
    dyn Fn(&StageOutcomes, &FlowContext) -> Outcome<ErasedPayload> + Send + Sync;

/// Node payload differing by kind.
pub(crate) enum NodeDetail {
    /// Step node carrying its module type.
    Step {
        /// Module type resolved through the catalog at compile time.
        module_type: ModuleTypeId,
    },
    /// Join node carrying its reducer and output type.
    Join {
        /// Erased reducer closure.
        reducer: Arc<JoinReducer>,
        /// Declared output type of the reducer.
        output: TypeToken,
    },
}

impl fmt::Debug for NodeDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step {
                module_type,
            } => f.debug_struct("Step").field("module_type", module_type).finish(),
            Self::Join {
                output, ..
            } => f.debug_struct("Join").field("reducer", &"<fn>").field("output", output).finish(),
        }
    }
}

/// Immutable blueprint node.
pub struct BlueprintNode {
    /// Position within the flow's node list.
    pub index: usize,
    /// Node name, unique within the flow.
    pub name: NodeName,
    /// Stage the node belongs to.
    pub stage: StageName,
    /// Kind-specific payload.
    pub(crate) detail: NodeDetail,
}

impl fmt::Debug for BlueprintNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlueprintNode")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("stage", &self.stage)
            .field("detail", &self.detail)
            .finish()
    }
}

impl BlueprintNode {
    /// Returns the node's kind.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self.detail {
            NodeDetail::Step {
                ..
            } => NodeKind::Step,
            NodeDetail::Join {
                ..
            } => NodeKind::Join,
        }
    }

    /// Returns the module type for step nodes.
    #[must_use]
    pub const fn module_type(&self) -> Option<&ModuleTypeId> {
        match &self.detail {
            NodeDetail::Step {
                module_type,
            } => Some(module_type),
            NodeDetail::Join {
                ..
            } => None,
        }
    }

    /// Returns the declared output type for join nodes.
    #[must_use]
    pub const fn join_output(&self) -> Option<&TypeToken> {
        match &self.detail {
            NodeDetail::Join {
                output, ..
            } => Some(output),
            NodeDetail::Step {
                ..
            } => None,
        }
    }
}

// ============================================================================
// SECTION: Blueprint
// ============================================================================

/// Immutable flow declaration parameterized by request and response types.
///
/// # Invariants
/// - Node names are unique; every stage holds at least one node and ends
///   with its join; the final node is a join (output type checked against
///   `Resp` at compile time).
pub struct FlowBlueprint<Req, Resp> {
    /// Flow name.
    name: FlowName,
    /// Ordered nodes across all stages.
    nodes: Vec<BlueprintNode>,
    /// Node name to index lookup.
    name_to_index: BTreeMap<NodeName, usize>,
    /// Ordered stage contracts.
    stage_contracts: Vec<(StageName, StageContract)>,
    /// Request/response type witness.
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> fmt::Debug for FlowBlueprint<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowBlueprint")
            .field("name", &self.name)
            .field("nodes", &self.nodes)
            .field("name_to_index", &self.name_to_index)
            .field("stage_contracts", &self.stage_contracts)
            .finish()
    }
}

impl<Req, Resp> FlowBlueprint<Req, Resp>
where
    Req: Send + Sync + 'static,
    Resp: Send + Sync + 'static,
{
    /// Starts a builder for a named flow.
    #[must_use]
    pub fn builder(name: impl Into<FlowName>) -> BlueprintBuilder<Req, Resp> {
        BlueprintBuilder {
            name: name.into(),
            nodes: Vec::new(),
            stage_contracts: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Returns the flow name.
    #[must_use]
    pub const fn name(&self) -> &FlowName {
        &self.name
    }

    /// Returns the ordered nodes.
    #[must_use]
    pub fn nodes(&self) -> &[BlueprintNode] {
        &self.nodes
    }

    /// Returns the index of a node by name.
    #[must_use]
    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(&NodeName::new(name)).copied()
    }

    /// Returns the ordered stage contracts.
    #[must_use]
    pub fn stage_contracts(&self) -> &[(StageName, StageContract)] {
        &self.stage_contracts
    }
}

// ============================================================================
// SECTION: Builder Errors
// ============================================================================

/// Errors raised while validating a blueprint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlueprintError {
    /// Flow name is empty.
    #[error("flow name is empty")]
    EmptyFlowName,
    /// Blueprint declares no nodes.
    #[error("flow '{0}' declares no nodes")]
    NoNodes(String),
    /// A node was declared before any stage was opened.
    #[error("node '{0}' declared outside a stage")]
    NodeOutsideStage(String),
    /// A stage name was declared twice.
    #[error("stage '{0}' declared twice")]
    DuplicateStage(String),
    /// A node name was declared twice.
    #[error("node '{0}' declared twice")]
    DuplicateNodeName(String),
    /// A step node carried an empty module type.
    #[error("step '{0}' has an empty module type")]
    EmptyModuleType(String),
    /// A stage contains no nodes.
    #[error("stage '{0}' contains no nodes")]
    EmptyStage(String),
    /// A stage is not terminated by a join node.
    #[error("stage '{0}' is not terminated by a join")]
    StageWithoutJoin(String),
    /// A node follows its stage's join.
    #[error("node '{0}' follows the join of stage '{1}'")]
    NodeAfterJoin(String, String),
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Pending node recorded by the builder before validation.
struct PendingNode {
    /// Node name.
    name: NodeName,
    /// Stage declared when the node was added, if any was open.
    stage: Option<StageName>,
    /// Kind-specific payload.
    detail: NodeDetail,
}

/// Fluent blueprint builder; validation happens in [`Self::build`].
pub struct BlueprintBuilder<Req, Resp> {
    /// Flow name.
    name: FlowName,
    /// Declared nodes in order.
    nodes: Vec<PendingNode>,
    /// Declared stage contracts in order.
    stage_contracts: Vec<(StageName, StageContract)>,
    /// Request/response type witness.
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> BlueprintBuilder<Req, Resp>
where
    Req: Send + Sync + 'static,
    Resp: Send + Sync + 'static,
{
    /// Opens a new stage with the given contract.
    #[must_use]
    pub fn stage(mut self, name: impl Into<StageName>, contract: StageContract) -> Self {
        self.stage_contracts.push((name.into(), contract));
        self
    }

    /// Adds a step node invoking the given module type.
    #[must_use]
    pub fn step(mut self, name: impl Into<NodeName>, module_type: impl Into<ModuleTypeId>) -> Self {
        let stage = self.stage_contracts.last().map(|(stage, _)| stage.clone());
        self.nodes.push(PendingNode {
            name: name.into(),
            stage,
            detail: NodeDetail::Step {
                module_type: module_type.into(),
            },
        });
        self
    }

    /// Adds the join node closing the current stage.
    #[must_use]
    pub fn join<TOut, F>(mut self, name: impl Into<NodeName>, reducer: F) -> Self
    where
        TOut: Send + Sync + 'static,
        F: Fn(&StageOutcomes, &FlowContext) -> Outcome<TOut> + Send + Sync + 'static,
    {
        let stage = self.stage_contracts.last().map(|(stage, _)| stage.clone());
        let erased: Arc<JoinReducer> = Arc::new(move |outcomes, ctx| {
            reducer(outcomes, ctx).map_payload(|value| Box::new(value) as ErasedPayload)
        });
        self.nodes.push(PendingNode {
            name: name.into(),
            stage,
            detail: NodeDetail::Join {
                reducer: erased,
                output: TypeToken::of::<TOut>(),
            },
        });
        self
    }

    /// Validates the declaration and produces the immutable blueprint.
    ///
    /// # Errors
    ///
    /// Returns [`BlueprintError`] when a structural invariant is violated.
    pub fn build(self) -> Result<FlowBlueprint<Req, Resp>, BlueprintError> {
        if self.name.is_empty() {
            return Err(BlueprintError::EmptyFlowName);
        }
        if self.nodes.is_empty() {
            return Err(BlueprintError::NoNodes(self.name.to_string()));
        }

        let mut seen_stages: Vec<&StageName> = Vec::new();
        for (stage, _) in &self.stage_contracts {
            if seen_stages.contains(&stage) {
                return Err(BlueprintError::DuplicateStage(stage.to_string()));
            }
            seen_stages.push(stage);
        }

        let mut nodes = Vec::with_capacity(self.nodes.len());
        let mut name_to_index = BTreeMap::new();
        let mut joined_stages: Vec<StageName> = Vec::new();
        for (index, pending) in self.nodes.into_iter().enumerate() {
            let Some(stage) = pending.stage else {
                return Err(BlueprintError::NodeOutsideStage(pending.name.to_string()));
            };
            if joined_stages.contains(&stage) {
                return Err(BlueprintError::NodeAfterJoin(
                    pending.name.to_string(),
                    stage.to_string(),
                ));
            }
            if let NodeDetail::Step {
                module_type,
            } = &pending.detail
            {
                if module_type.is_empty() {
                    return Err(BlueprintError::EmptyModuleType(pending.name.to_string()));
                }
            } else {
                joined_stages.push(stage.clone());
            }
            if name_to_index.insert(pending.name.clone(), index).is_some() {
                return Err(BlueprintError::DuplicateNodeName(pending.name.to_string()));
            }
            nodes.push(BlueprintNode {
                index,
                name: pending.name,
                stage,
                detail: pending.detail,
            });
        }

        for (stage, _) in &self.stage_contracts {
            let mut stage_nodes = nodes.iter().filter(|node| &node.stage == stage);
            if stage_nodes.next().is_none() {
                return Err(BlueprintError::EmptyStage(stage.to_string()));
            }
            let last = nodes.iter().filter(|node| &node.stage == stage).next_back();
            if last.is_none_or(|node| node.kind() != NodeKind::Join) {
                return Err(BlueprintError::StageWithoutJoin(stage.to_string()));
            }
        }

        Ok(FlowBlueprint {
            name: self.name,
            nodes,
            name_to_index,
            stage_contracts: self.stage_contracts,
            _marker: PhantomData,
        })
    }
}
