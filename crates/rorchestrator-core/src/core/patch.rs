// rorchestrator-core/src/core/patch.rs
// ============================================================================
// Module: Config Patch Parsing
// Description: Strict v1 patch document parsing with validation findings.
// Purpose: Produce the per-flow/per-stage view the engine and tooling share.
// Dependencies: rorchestrator-gate, serde, serde_json, crate::core
// ============================================================================

//! ## Overview
//! The config patch is a versioned JSON document attaching per-stage
//! parameters to flows: fan-out bound, failure policy, and the module list
//! with per-module arguments and gates. Parsing is strict and all-or-nothing
//! per call: the first error aborts with the failing [`Finding`]; warnings
//! accumulate on the returned document. The field names of schema v1 are a
//! public contract shared with the diff, explain, and preview tooling.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use rorchestrator_gate::Gate;
use rorchestrator_gate::GateParseError;
use rorchestrator_gate::SelectorName;
use rorchestrator_gate::SelectorRegistry;
use rorchestrator_gate::gate_from_json;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::blueprint::FailurePolicy;
use crate::core::catalog::ModuleCatalog;
use crate::core::identifiers::ModuleId;
use crate::core::identifiers::ModuleTypeId;

// ============================================================================
// SECTION: Validation Codes
// ============================================================================

/// Fixed codes carried by patch validation findings.
pub mod cfg_codes {
    /// Patch body is not valid JSON.
    pub const CFG_INVALID_JSON: &str = "CFG_INVALID_JSON";
    /// Schema version is missing or unsupported.
    pub const CFG_SCHEMA_VERSION: &str = "CFG_SCHEMA_VERSION";
    /// An object carries a field outside its schema.
    pub const CFG_UNKNOWN_FIELD: &str = "CFG_UNKNOWN_FIELD";
    /// A field carries a value of the wrong shape or range.
    pub const CFG_INVALID_VALUE: &str = "CFG_INVALID_VALUE";
    /// A module id repeats within one stage.
    pub const CFG_DUPLICATE_MODULE_ID: &str = "CFG_DUPLICATE_MODULE_ID";
    /// A module `use` does not resolve in the supplied catalog.
    pub const CFG_MODULE_NOT_REGISTERED: &str = "CFG_MODULE_NOT_REGISTERED";
    /// A gate object carries zero or multiple discriminant keys, or an
    /// unknown one.
    pub const CFG_GATE_UNKNOWN_TYPE: &str = "CFG_GATE_UNKNOWN_TYPE";
    /// A composite gate carries no children.
    pub const CFG_GATE_EMPTY_COMPOSITE: &str = "CFG_GATE_EMPTY_COMPOSITE";
    /// A gate tree nests deeper than the limit.
    pub const CFG_GATE_TOO_DEEP: &str = "CFG_GATE_TOO_DEEP";
    /// A request gate names a field outside the allowed set.
    pub const CFG_GATE_REQUEST_FIELD_NOT_ALLOWED: &str = "CFG_GATE_REQUEST_FIELD_NOT_ALLOWED";
    /// A selector gate names a selector absent from the supplied registry.
    pub const CFG_SELECTOR_NOT_REGISTERED: &str = "CFG_SELECTOR_NOT_REGISTERED";
    /// A stage configures an empty module list.
    pub const CFG_EMPTY_MODULES: &str = "CFG_EMPTY_MODULES";
}

// ============================================================================
// SECTION: Findings
// ============================================================================

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The patch is unusable as written.
    Error,
    /// The patch is usable but suspicious.
    Warning,
}

/// One validation finding with its location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Finding severity.
    pub severity: Severity,
    /// Stable finding code (see [`cfg_codes`]).
    pub code: String,
    /// Dotted path to the offending location.
    pub path: String,
    /// Human-readable description.
    pub message: String,
}

impl Finding {
    /// Creates an error finding.
    #[must_use]
    pub fn error(code: &str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: code.to_string(),
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a warning finding.
    #[must_use]
    pub fn warning(code: &str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.to_string(),
            path: path.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// SECTION: Parsed Document
// ============================================================================

/// One configured module entry of a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleEntry {
    /// Module id, unique within the stage.
    pub id: ModuleId,
    /// Module type resolved through the catalog.
    pub module_type: ModuleTypeId,
    /// Module-defined `with` parameters.
    pub params: Value,
    /// Optional gate controlling whether the module runs.
    pub gate: Option<Gate>,
}

/// Parsed per-stage configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StagePatch {
    /// Fan-out bound override.
    pub fanout_max: Option<usize>,
    /// Failure policy override.
    pub failure_policy: Option<FailurePolicy>,
    /// Configured module entries in declaration order.
    pub modules: Vec<ModuleEntry>,
}

/// Parsed per-flow configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlowPatch {
    /// Stage configurations keyed by stage name.
    pub stages: BTreeMap<String, StagePatch>,
}

/// Parsed patch document with accumulated warnings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatchDocument {
    /// Flow configurations keyed by flow name.
    pub flows: BTreeMap<String, FlowPatch>,
    /// Non-fatal findings collected during parsing.
    pub warnings: Vec<Finding>,
}

impl PatchDocument {
    /// Returns the configuration for a stage of a flow, if present.
    #[must_use]
    pub fn stage(&self, flow: &str, stage: &str) -> Option<&StagePatch> {
        self.flows.get(flow).and_then(|patch| patch.stages.get(stage))
    }
}

// ============================================================================
// SECTION: Parse Context
// ============================================================================

/// Optional reference material strengthening validation.
#[derive(Clone, Copy, Default)]
pub struct PatchContext<'a> {
    /// Catalog used to resolve module `use` strings, when available.
    pub catalog: Option<&'a ModuleCatalog>,
    /// Selector registry used to resolve selector gates, when available.
    pub selectors: Option<&'a SelectorRegistry>,
}

impl PatchContext<'_> {
    /// Creates a context without reference material.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            catalog: None,
            selectors: None,
        }
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Schema version accepted by this parser.
const SCHEMA_VERSION: &str = "v1";

/// Parses and validates a patch document.
///
/// # Errors
///
/// Returns the first error [`Finding`]; parsing is all-or-nothing per call.
pub fn parse_patch(patch_json: &str, ctx: &PatchContext<'_>) -> Result<PatchDocument, Finding> {
    let root: Value = serde_json::from_str(patch_json).map_err(|err| {
        Finding::error(cfg_codes::CFG_INVALID_JSON, "", format!("patch is not valid JSON: {err}"))
    })?;
    let Value::Object(entries) = &root else {
        return Err(Finding::error(cfg_codes::CFG_INVALID_JSON, "", "patch root must be an object"));
    };

    for key in entries.keys() {
        if key != "schemaVersion" && key != "flows" {
            return Err(Finding::error(
                cfg_codes::CFG_UNKNOWN_FIELD,
                key.clone(),
                format!("unknown top-level field '{key}'"),
            ));
        }
    }

    let version = entries.get("schemaVersion").and_then(Value::as_str);
    if version != Some(SCHEMA_VERSION) {
        return Err(Finding::error(
            cfg_codes::CFG_SCHEMA_VERSION,
            "schemaVersion",
            format!("schemaVersion must be '{SCHEMA_VERSION}'"),
        ));
    }

    let mut document = PatchDocument::default();
    let Some(flows) = entries.get("flows") else {
        return Ok(document);
    };
    let Value::Object(flows) = flows else {
        return Err(Finding::error(cfg_codes::CFG_INVALID_VALUE, "flows", "flows must be an object"));
    };

    for (flow_name, flow_value) in flows {
        let path = format!("flows.{flow_name}");
        let flow_patch = parse_flow(flow_value, &path, ctx, &mut document.warnings)?;
        document.flows.insert(flow_name.clone(), flow_patch);
    }

    Ok(document)
}

/// Parses one flow object.
fn parse_flow(
    value: &Value,
    path: &str,
    ctx: &PatchContext<'_>,
    warnings: &mut Vec<Finding>,
) -> Result<FlowPatch, Finding> {
    let entries = require_object(value, path)?;
    for key in entries.keys() {
        if key != "stages" {
            return Err(Finding::error(
                cfg_codes::CFG_UNKNOWN_FIELD,
                format!("{path}.{key}"),
                format!("unknown flow field '{key}'"),
            ));
        }
    }

    let mut flow_patch = FlowPatch::default();
    if let Some(stages) = entries.get("stages") {
        let stage_path = format!("{path}.stages");
        let stages = require_object(stages, &stage_path)?;
        for (stage_name, stage_value) in stages {
            let path = format!("{stage_path}.{stage_name}");
            let stage_patch = parse_stage(stage_value, &path, ctx, warnings)?;
            flow_patch.stages.insert(stage_name.clone(), stage_patch);
        }
    }
    Ok(flow_patch)
}

/// Parses one stage object.
fn parse_stage(
    value: &Value,
    path: &str,
    ctx: &PatchContext<'_>,
    warnings: &mut Vec<Finding>,
) -> Result<StagePatch, Finding> {
    let entries = require_object(value, path)?;
    for key in entries.keys() {
        if key != "fanoutMax" && key != "failurePolicy" && key != "modules" {
            return Err(Finding::error(
                cfg_codes::CFG_UNKNOWN_FIELD,
                format!("{path}.{key}"),
                format!("unknown stage field '{key}'"),
            ));
        }
    }

    let mut stage = StagePatch::default();

    if let Some(fanout) = entries.get("fanoutMax") {
        let bound = fanout
            .as_u64()
            .filter(|value| *value > 0)
            .and_then(|value| usize::try_from(value).ok())
            .ok_or_else(|| {
                Finding::error(
                    cfg_codes::CFG_INVALID_VALUE,
                    format!("{path}.fanoutMax"),
                    "fanoutMax must be a positive integer",
                )
            })?;
        stage.fanout_max = Some(bound);
    }

    if let Some(policy) = entries.get("failurePolicy") {
        let parsed = policy.as_str().and_then(FailurePolicy::parse).ok_or_else(|| {
            Finding::error(
                cfg_codes::CFG_INVALID_VALUE,
                format!("{path}.failurePolicy"),
                "failurePolicy must be 'ShortCircuit' or 'Continue'",
            )
        })?;
        stage.failure_policy = Some(parsed);
    }

    if let Some(modules) = entries.get("modules") {
        let modules_path = format!("{path}.modules");
        let Value::Array(items) = modules else {
            return Err(Finding::error(
                cfg_codes::CFG_INVALID_VALUE,
                modules_path,
                "modules must be an array",
            ));
        };
        if items.is_empty() {
            warnings.push(Finding::warning(
                cfg_codes::CFG_EMPTY_MODULES,
                modules_path.clone(),
                "stage configures no modules",
            ));
        }
        for (index, item) in items.iter().enumerate() {
            let path = format!("{modules_path}[{index}]");
            let entry = parse_module(item, &path, ctx)?;
            if stage.modules.iter().any(|existing| existing.id == entry.id) {
                return Err(Finding::error(
                    cfg_codes::CFG_DUPLICATE_MODULE_ID,
                    format!("{path}.id"),
                    format!("module id '{}' repeats within the stage", entry.id),
                ));
            }
            stage.modules.push(entry);
        }
    }

    Ok(stage)
}

/// Parses one module entry object.
fn parse_module(
    value: &Value,
    path: &str,
    ctx: &PatchContext<'_>,
) -> Result<ModuleEntry, Finding> {
    let entries = require_object(value, path)?;
    for key in entries.keys() {
        if key != "id" && key != "use" && key != "with" && key != "gate" {
            return Err(Finding::error(
                cfg_codes::CFG_UNKNOWN_FIELD,
                format!("{path}.{key}"),
                format!("unknown module field '{key}'"),
            ));
        }
    }

    let id = require_non_empty_str(entries, "id", path)?;
    let module_type = require_non_empty_str(entries, "use", path)?;

    if let Some(catalog) = ctx.catalog
        && !catalog.contains(&module_type)
    {
        return Err(Finding::error(
            cfg_codes::CFG_MODULE_NOT_REGISTERED,
            format!("{path}.use"),
            format!("module type '{module_type}' is not registered"),
        ));
    }

    let params = match entries.get("with") {
        None => Value::Object(Map::new()),
        Some(value @ Value::Object(_)) => value.clone(),
        Some(_) => {
            return Err(Finding::error(
                cfg_codes::CFG_INVALID_VALUE,
                format!("{path}.with"),
                "with must be an object",
            ));
        }
    };

    let gate = match entries.get("gate") {
        None => None,
        Some(gate_value) => {
            let gate_path = format!("{path}.gate");
            let gate = gate_from_json(gate_value)
                .map_err(|err| gate_finding(&err, &gate_path))?;
            if let Some(registry) = ctx.selectors {
                for selector in collect_selectors(&gate) {
                    if !registry.contains(selector) {
                        return Err(Finding::error(
                            cfg_codes::CFG_SELECTOR_NOT_REGISTERED,
                            gate_path,
                            format!("selector '{selector}' is not registered"),
                        ));
                    }
                }
            }
            Some(gate)
        }
    };

    Ok(ModuleEntry {
        id: ModuleId::new(id),
        module_type: ModuleTypeId::new(module_type),
        params,
        gate,
    })
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

/// Requires a JSON object, reporting an invalid-value finding otherwise.
fn require_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, Finding> {
    match value {
        Value::Object(entries) => Ok(entries),
        _ => Err(Finding::error(
            cfg_codes::CFG_INVALID_VALUE,
            path,
            "expected a JSON object",
        )),
    }
}

/// Requires a non-empty string field on an object.
fn require_non_empty_str(
    entries: &Map<String, Value>,
    field: &str,
    path: &str,
) -> Result<String, Finding> {
    entries
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            Finding::error(
                cfg_codes::CFG_INVALID_VALUE,
                format!("{path}.{field}"),
                format!("{field} must be a non-empty string"),
            )
        })
}

/// Maps a gate parse error to its validation finding.
fn gate_finding(err: &GateParseError, path: &str) -> Finding {
    let code = match err {
        GateParseError::UnknownType {
            ..
        } => cfg_codes::CFG_GATE_UNKNOWN_TYPE,
        GateParseError::EmptyComposite {
            ..
        } => cfg_codes::CFG_GATE_EMPTY_COMPOSITE,
        GateParseError::TooDeep {
            ..
        } => cfg_codes::CFG_GATE_TOO_DEEP,
        GateParseError::RequestFieldNotAllowed {
            ..
        } => cfg_codes::CFG_GATE_REQUEST_FIELD_NOT_ALLOWED,
        GateParseError::InvalidValue {
            ..
        } => cfg_codes::CFG_INVALID_VALUE,
    };
    Finding::error(code, path, err.to_string())
}

/// Collects the selector names referenced by a gate tree.
#[must_use]
pub fn collect_selectors(gate: &Gate) -> Vec<&SelectorName> {
    let mut out = Vec::new();
    collect_selectors_inner(gate, &mut out);
    out
}

/// Walks a gate tree and appends selector names.
fn collect_selectors_inner<'a>(gate: &'a Gate, out: &mut Vec<&'a SelectorName>) {
    match gate {
        Gate::Selector(name) => {
            if !out.contains(&name) {
                out.push(name);
            }
        }
        Gate::Not(child) => collect_selectors_inner(child, out),
        Gate::All(children) | Gate::Any(children) => {
            for child in children {
                collect_selectors_inner(child, out);
            }
        }
        Gate::Experiment {
            ..
        }
        | Gate::Rollout {
            ..
        }
        | Gate::RequestAttr {
            ..
        } => {}
    }
}
