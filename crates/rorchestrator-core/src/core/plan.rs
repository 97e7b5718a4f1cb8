// rorchestrator-core/src/core/plan.rs
// ============================================================================
// Module: Plan Compilation
// Description: Blueprint validation against the catalog and plan hashing.
// Purpose: Produce immutable, hashed plan templates and their explains.
// Dependencies: rorchestrator-gate (FNV-1a-64), serde, crate::core
// ============================================================================

//! ## Overview
//! Compilation turns a [`FlowBlueprint`] into an executable [`PlanTemplate`]:
//! every step's module type is resolved in the catalog, the single-request-
//! type invariant is enforced, the terminal join's output type is checked
//! against the flow's response type, and the deterministic 64-bit plan hash
//! is computed over the canonical encoding. Compilation is side-effect free;
//! equal blueprints always produce equal hashes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use rorchestrator_gate::Fnv64;
use serde::Serialize;
use thiserror::Error;

use crate::core::blueprint::FlowBlueprint;
use crate::core::blueprint::JoinReducer;
use crate::core::blueprint::NodeDetail;
use crate::core::blueprint::NodeKind;
use crate::core::blueprint::StageContract;
use crate::core::catalog::ModuleCatalog;
use crate::core::hashing::TypeToken;
use crate::core::hashing::format_plan_hash;
use crate::core::identifiers::FlowName;
use crate::core::identifiers::ModuleTypeId;
use crate::core::identifiers::NodeName;
use crate::core::identifiers::StageName;

// ============================================================================
// SECTION: Plan Nodes
// ============================================================================

/// Kind-specific payload of a compiled node.
pub(crate) enum PlanNodeDetail {
    /// Step node with its resolved catalog signature.
    Step {
        /// Module type resolved in the catalog.
        module_type: ModuleTypeId,
        /// Registered request type of the module.
        args: TypeToken,
        /// Registered output type of the module.
        out: TypeToken,
    },
    /// Join node with its reducer and output type.
    Join {
        /// Erased reducer closure shared with the blueprint.
        reducer: Arc<JoinReducer>,
        /// Declared output type of the reducer.
        output: TypeToken,
    },
}

impl fmt::Debug for PlanNodeDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step {
                module_type,
                args,
                out,
            } => f
                .debug_struct("Step")
                .field("module_type", module_type)
                .field("args", args)
                .field("out", out)
                .finish(),
            Self::Join {
                output, ..
            } => f.debug_struct("Join").field("reducer", &"<fn>").field("output", output).finish(),
        }
    }
}

/// Compiled, immutable plan node.
pub struct PlanNode {
    /// Position within the plan's node list.
    pub index: usize,
    /// Node name, unique within the flow.
    pub name: NodeName,
    /// Stage the node belongs to.
    pub stage: StageName,
    /// Kind-specific payload.
    pub(crate) detail: PlanNodeDetail,
}

impl fmt::Debug for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanNode")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("stage", &self.stage)
            .field("detail", &self.detail)
            .finish()
    }
}

impl PlanNode {
    /// Returns the node's kind.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self.detail {
            PlanNodeDetail::Step {
                ..
            } => NodeKind::Step,
            PlanNodeDetail::Join {
                ..
            } => NodeKind::Join,
        }
    }

    /// Returns the module type for step nodes.
    #[must_use]
    pub const fn module_type(&self) -> Option<&ModuleTypeId> {
        match &self.detail {
            PlanNodeDetail::Step {
                module_type, ..
            } => Some(module_type),
            PlanNodeDetail::Join {
                ..
            } => None,
        }
    }

    /// Returns the reducer for join nodes.
    pub(crate) const fn reducer(&self) -> Option<&Arc<JoinReducer>> {
        match &self.detail {
            PlanNodeDetail::Join {
                reducer, ..
            } => Some(reducer),
            PlanNodeDetail::Step {
                ..
            } => None,
        }
    }
}

// ============================================================================
// SECTION: Plan Template
// ============================================================================

/// Compiled, hashed, immutable form of a flow ready for execution.
///
/// # Invariants
/// - Safe for concurrent reuse; execution never mutates the template.
pub struct PlanTemplate<Req, Resp> {
    /// Flow name.
    name: FlowName,
    /// Deterministic 64-bit plan hash.
    plan_hash: u64,
    /// Compiled nodes in declaration order.
    nodes: Vec<PlanNode>,
    /// Node name to index lookup.
    name_to_index: BTreeMap<NodeName, usize>,
    /// Ordered stage contracts.
    stage_contracts: Vec<(StageName, StageContract)>,
    /// Request type token.
    request: TypeToken,
    /// Response type token.
    response: TypeToken,
    /// Request/response type witness.
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> fmt::Debug for PlanTemplate<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanTemplate")
            .field("name", &self.name)
            .field("plan_hash", &self.plan_hash)
            .field("nodes", &self.nodes)
            .field("name_to_index", &self.name_to_index)
            .field("stage_contracts", &self.stage_contracts)
            .field("request", &self.request)
            .field("response", &self.response)
            .finish()
    }
}

impl<Req, Resp> PlanTemplate<Req, Resp> {
    /// Returns the flow name.
    #[must_use]
    pub const fn name(&self) -> &FlowName {
        &self.name
    }

    /// Returns the deterministic plan hash.
    #[must_use]
    pub const fn plan_hash(&self) -> u64 {
        self.plan_hash
    }

    /// Returns the plan hash in its 16-hex form.
    #[must_use]
    pub fn plan_hash_hex(&self) -> String {
        format_plan_hash(self.plan_hash)
    }

    /// Returns the compiled nodes.
    #[must_use]
    pub fn nodes(&self) -> &[PlanNode] {
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

    /// Returns the step nodes belonging to a stage.
    #[must_use]
    pub fn stage_steps(&self, stage: &StageName) -> Vec<&PlanNode> {
        self.nodes
            .iter()
            .filter(|node| &node.stage == stage && node.kind() == NodeKind::Step)
            .collect()
    }

    /// Returns the join node closing a stage.
    #[must_use]
    pub fn stage_join(&self, stage: &StageName) -> Option<&PlanNode> {
        self.nodes.iter().find(|node| &node.stage == stage && node.kind() == NodeKind::Join)
    }

    /// Returns the request type token.
    #[must_use]
    pub const fn request_type(&self) -> &TypeToken {
        &self.request
    }

    /// Returns the response type token.
    #[must_use]
    pub const fn response_type(&self) -> &TypeToken {
        &self.response
    }

    /// Builds the descriptive explain for this plan.
    #[must_use]
    pub fn explain(&self) -> PlanExplain {
        PlanExplain {
            flow: self.name.to_string(),
            plan_hash: self.plan_hash_hex(),
            request: self.request.name().to_string(),
            response: self.response.name().to_string(),
            nodes: self.nodes.iter().map(PlanNodeExplain::from_node).collect(),
        }
    }
}

// ============================================================================
// SECTION: Plan Explain
// ============================================================================

/// Descriptive form of a compiled plan for tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanExplain {
    /// Flow name.
    pub flow: String,
    /// Plan hash in 16-hex form.
    pub plan_hash: String,
    /// Request type name.
    pub request: String,
    /// Response type name.
    pub response: String,
    /// Per-node descriptions in declaration order.
    pub nodes: Vec<PlanNodeExplain>,
}

/// Descriptive form of one compiled node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanNodeExplain {
    /// Node index.
    pub index: usize,
    /// Node name.
    pub name: String,
    /// Stage name.
    pub stage: String,
    /// Node kind label.
    pub kind: String,
    /// Module type for step nodes.
    pub module_type: Option<String>,
    /// Request type name for step nodes.
    pub args: Option<String>,
    /// Output type name for all nodes.
    pub output: Option<String>,
}

impl PlanNodeExplain {
    /// Builds the description of one node.
    fn from_node(node: &PlanNode) -> Self {
        let (module_type, args, output) = match &node.detail {
            PlanNodeDetail::Step {
                module_type,
                args,
                out,
            } => (
                Some(module_type.to_string()),
                Some(args.name().to_string()),
                Some(out.name().to_string()),
            ),
            PlanNodeDetail::Join {
                output, ..
            } => (None, None, Some(output.name().to_string())),
        };
        Self {
            index: node.index,
            name: node.name.to_string(),
            stage: node.stage.to_string(),
            kind: node.kind().as_str().to_string(),
            module_type,
            args,
            output,
        }
    }
}

// ============================================================================
// SECTION: Compile Errors
// ============================================================================

/// Errors raised by plan compilation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Flow name is empty.
    #[error("flow name is empty")]
    EmptyFlowName,
    /// Blueprint declares no nodes.
    #[error("flow '{0}' declares no nodes")]
    EmptyNodes(String),
    /// A stage contains no nodes.
    #[error("stage '{0}' contains no nodes")]
    EmptyStage(String),
    /// A step node carries an empty module type.
    #[error("step '{0}' has an empty module type")]
    EmptyModuleType(String),
    /// A step's module type is not registered in the catalog.
    #[error("step '{node}' uses unregistered module type '{module_type}'")]
    ModuleNotRegistered {
        /// Offending node name.
        node: String,
        /// Unregistered module type.
        module_type: String,
    },
    /// A step's registered request type differs from the flow request type.
    #[error("step '{node}' expects request '{expected}' but module takes '{actual}'")]
    RequestTypeMismatch {
        /// Offending node name.
        node: String,
        /// Flow request type name.
        expected: String,
        /// Module request type name.
        actual: String,
    },
    /// The final node is not a join.
    #[error("flow '{0}' does not terminate in a join")]
    TerminalNotJoin(String),
    /// The final join's output type differs from the flow response type.
    #[error("final join outputs '{actual}' but flow responds with '{expected}'")]
    ResponseTypeMismatch {
        /// Flow response type name.
        expected: String,
        /// Join output type name.
        actual: String,
    },
}

// ============================================================================
// SECTION: Compilation
// ============================================================================

/// Compiles a blueprint against a catalog into a plan template.
///
/// # Errors
///
/// Returns [`CompileError`] when the blueprint violates a compile-time
/// invariant (see the variant list).
pub fn compile<Req, Resp>(
    blueprint: &FlowBlueprint<Req, Resp>,
    catalog: &ModuleCatalog,
) -> Result<PlanTemplate<Req, Resp>, CompileError>
where
    Req: Send + Sync + 'static,
    Resp: Send + Sync + 'static,
{
    if blueprint.name().is_empty() {
        return Err(CompileError::EmptyFlowName);
    }
    if blueprint.nodes().is_empty() {
        return Err(CompileError::EmptyNodes(blueprint.name().to_string()));
    }
    for (stage, _) in blueprint.stage_contracts() {
        if !blueprint.nodes().iter().any(|node| &node.stage == stage) {
            return Err(CompileError::EmptyStage(stage.to_string()));
        }
    }

    let request = TypeToken::of::<Req>();
    let response = TypeToken::of::<Resp>();

    let mut nodes = Vec::with_capacity(blueprint.nodes().len());
    let mut name_to_index = BTreeMap::new();
    for node in blueprint.nodes() {
        let detail = match &node.detail {
            NodeDetail::Step {
                module_type,
            } => {
                if module_type.is_empty() {
                    return Err(CompileError::EmptyModuleType(node.name.to_string()));
                }
                let signature = catalog.signature(module_type.as_str()).ok_or_else(|| {
                    CompileError::ModuleNotRegistered {
                        node: node.name.to_string(),
                        module_type: module_type.to_string(),
                    }
                })?;
                if signature.args != request {
                    return Err(CompileError::RequestTypeMismatch {
                        node: node.name.to_string(),
                        expected: request.name().to_string(),
                        actual: signature.args.name().to_string(),
                    });
                }
                PlanNodeDetail::Step {
                    module_type: module_type.clone(),
                    args: signature.args.clone(),
                    out: signature.out.clone(),
                }
            }
            NodeDetail::Join {
                reducer,
                output,
            } => PlanNodeDetail::Join {
                reducer: Arc::clone(reducer),
                output: output.clone(),
            },
        };
        name_to_index.insert(node.name.clone(), node.index);
        nodes.push(PlanNode {
            index: node.index,
            name: node.name.clone(),
            stage: node.stage.clone(),
            detail,
        });
    }

    let Some(terminal) = nodes.last() else {
        return Err(CompileError::EmptyNodes(blueprint.name().to_string()));
    };
    let PlanNodeDetail::Join {
        output, ..
    } = &terminal.detail
    else {
        return Err(CompileError::TerminalNotJoin(blueprint.name().to_string()));
    };
    if output != &response {
        return Err(CompileError::ResponseTypeMismatch {
            expected: response.name().to_string(),
            actual: output.name().to_string(),
        });
    }

    let plan_hash = hash_plan(blueprint.name(), &request, &response, &nodes);

    Ok(PlanTemplate {
        name: blueprint.name().clone(),
        plan_hash,
        nodes,
        name_to_index,
        stage_contracts: blueprint.stage_contracts().to_vec(),
        request,
        response,
        _marker: PhantomData,
    })
}

// ============================================================================
// SECTION: Canonical Hashing
// ============================================================================

/// Computes the FNV-1a-64 plan hash over the canonical encoding.
///
/// Encoding order: flow name, request type, response type, then per node its
/// kind discriminant, name, stage, and `module type + output type` for steps
/// or `output type` for joins. Strings are length-prefixed UTF-16 code units
/// in little-endian byte order.
fn hash_plan(name: &FlowName, request: &TypeToken, response: &TypeToken, nodes: &[PlanNode]) -> u64 {
    let mut hasher = Fnv64::new();
    hasher.write_str_len_prefixed(name.as_str());
    hasher.write_str_len_prefixed(request.name());
    hasher.write_str_len_prefixed(response.name());
    for node in nodes {
        match &node.detail {
            PlanNodeDetail::Step {
                module_type,
                out,
                ..
            } => {
                hasher.write_u8(0);
                hasher.write_str_len_prefixed(node.name.as_str());
                hasher.write_str_len_prefixed(node.stage.as_str());
                hasher.write_str_len_prefixed(module_type.as_str());
                hasher.write_str_len_prefixed(out.name());
            }
            PlanNodeDetail::Join {
                output, ..
            } => {
                hasher.write_u8(1);
                hasher.write_str_len_prefixed(node.name.as_str());
                hasher.write_str_len_prefixed(node.stage.as_str());
                hasher.write_str_len_prefixed(output.name());
            }
        }
    }
    hasher.finish()
}
