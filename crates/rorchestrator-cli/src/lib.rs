// rorchestrator-cli/src/lib.rs
// ============================================================================
// Module: RORchestrator CLI Library
// Description: Command implementations behind the `rorchestrator` binary.
// Purpose: Run validate, explain, diff, and preview commands against an
// embedder-supplied host. Dependencies: clap, rorchestrator-core,
// rorchestrator-gate, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every command writes exactly one kind-tagged JSON document to stdout:
//! `validate`, `explain`, `explain_patch`, `diff`, and `preview_matrix`,
//! with `cli_error` covering failures. An unknown command exits with code 2,
//! a `cli_error` document on stdout, and a non-empty stderr line. Embedders
//! supply a [`CliHost`] carrying their bootstrapped flow registry, module
//! catalog, and selector registry; the shipped binary hosts an empty
//! bootstrap, which still serves the patch-only commands.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod diff;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::error::ErrorKind;
use rorchestrator_core::Finding;
use rorchestrator_core::FlowRegistry;
use rorchestrator_core::ModuleCatalog;
use rorchestrator_core::PatchContext;
use rorchestrator_core::PatchDocument;
use rorchestrator_core::PlanExplain;
use rorchestrator_core::StagePatch;
use rorchestrator_core::parse_patch;
use rorchestrator_gate::GateContext;
use rorchestrator_gate::LayerName;
use rorchestrator_gate::ReasonCode;
use rorchestrator_gate::SelectorRegistry;
use rorchestrator_gate::evaluate;
use rorchestrator_gate::gate_to_json;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::diff::DiffEntry;
use crate::diff::diff_patches;

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

/// Exit code for a completed command.
pub const EXIT_OK: u8 = 0;
/// Exit code for a command that failed while running.
pub const EXIT_FAILURE: u8 = 1;
/// Exit code for an unknown command.
pub const EXIT_UNKNOWN_COMMAND: u8 = 2;

// ============================================================================
// SECTION: Host
// ============================================================================

/// Bootstrapped environment the CLI runs against.
#[derive(Default)]
pub struct CliHost {
    /// Bootstrapper name embedders may declare for `--bootstrapper-type`.
    pub bootstrapper_type: Option<String>,
    /// Registered flows.
    pub registry: FlowRegistry,
    /// Registered module types.
    pub catalog: ModuleCatalog,
    /// Registered selectors.
    pub selectors: SelectorRegistry,
}

impl CliHost {
    /// Creates an empty host serving only the patch-only commands.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "rorchestrator", disable_help_subcommand = true, arg_required_else_help = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a patch document against the bootstrapped environment.
    Validate(ValidateCommand),
    /// Describe a registered flow's compiled plan.
    ExplainFlow(ExplainFlowCommand),
    /// Describe what a patch configures for one flow.
    ExplainPatch(ExplainPatchCommand),
    /// Diff two patch documents structurally.
    DiffPatch(DiffPatchCommand),
    /// Preview gate partitions for a flow across a context matrix.
    PreviewMatrix(PreviewMatrixCommand),
}

/// Arguments for `validate`.
#[derive(Args, Debug)]
struct ValidateCommand {
    /// Bootstrapper the patch is validated against.
    #[arg(long, value_name = "NAME")]
    bootstrapper_type: Option<String>,
    /// Path to the patch JSON file.
    #[arg(long, value_name = "PATH")]
    patch_json: PathBuf,
}

/// Arguments for `explain-flow`.
#[derive(Args, Debug)]
struct ExplainFlowCommand {
    /// Bootstrapper the flow is resolved in.
    #[arg(long, value_name = "NAME")]
    bootstrapper_type: Option<String>,
    /// Flow name to describe.
    #[arg(long, value_name = "FLOW")]
    flow: String,
}

/// Arguments for `explain-patch`.
#[derive(Args, Debug)]
struct ExplainPatchCommand {
    /// Flow name to describe.
    #[arg(long, value_name = "FLOW")]
    flow: String,
    /// Path to the patch JSON file.
    #[arg(long, value_name = "PATH")]
    patch_json: PathBuf,
}

/// Arguments for `diff-patch`.
#[derive(Args, Debug)]
struct DiffPatchCommand {
    /// Path to the old patch JSON file.
    #[arg(long, value_name = "PATH")]
    old_json: PathBuf,
    /// Path to the new patch JSON file.
    #[arg(long, value_name = "PATH")]
    new_json: PathBuf,
}

/// Arguments for `preview-matrix`.
#[derive(Args, Debug)]
struct PreviewMatrixCommand {
    /// Flow name to preview.
    #[arg(long, value_name = "FLOW")]
    flow: String,
    /// Path to the patch JSON file.
    #[arg(long, value_name = "PATH")]
    patch_json: PathBuf,
    /// Path to the matrix JSON file (array of context rows).
    #[arg(long, value_name = "PATH")]
    matrix_json: PathBuf,
}

// ============================================================================
// SECTION: Documents
// ============================================================================

/// `validate` output document.
#[derive(Debug, Serialize)]
struct ValidateDoc {
    /// Document kind tag.
    kind: &'static str,
    /// Whether the patch passed validation.
    is_valid: bool,
    /// Findings collected during validation.
    findings: Vec<Finding>,
}

/// `explain` output document.
#[derive(Debug, Serialize)]
struct ExplainDoc<'a> {
    /// Document kind tag.
    kind: &'static str,
    /// The compiled plan description.
    #[serde(flatten)]
    plan: &'a PlanExplain,
}

/// `explain_patch` output document.
#[derive(Debug, Serialize)]
struct ExplainPatchDoc {
    /// Document kind tag.
    kind: &'static str,
    /// Flow name described.
    flow: String,
    /// Stage configurations in canonical patch field layout.
    stages: BTreeMap<String, Value>,
}

/// `diff` output document.
#[derive(Debug, Serialize)]
struct DiffDoc {
    /// Document kind tag.
    kind: &'static str,
    /// Structural diff entries.
    entries: Vec<DiffEntry>,
}

/// `preview_matrix` output document.
#[derive(Debug, Serialize)]
struct PreviewMatrixDoc {
    /// Document kind tag.
    kind: &'static str,
    /// Flow name previewed.
    flow: String,
    /// One preview per matrix row.
    previews: Vec<PreviewRow>,
}

/// Gate partition preview of one matrix row.
#[derive(Debug, Serialize)]
struct PreviewRow {
    /// Zero-based matrix row index.
    row: usize,
    /// Module decisions per stage.
    stages: BTreeMap<String, Vec<PreviewModule>>,
}

/// Decision preview for one configured module.
#[derive(Debug, Serialize)]
struct PreviewModule {
    /// Module id.
    id: String,
    /// Whether the module would run for this row.
    allowed: bool,
    /// Gate reason code; absent when the module carries no gate.
    reason_code: Option<ReasonCode>,
}

/// `cli_error` output document.
#[derive(Debug, Serialize)]
struct CliErrorDoc {
    /// Document kind tag.
    kind: &'static str,
    /// Failure description.
    message: String,
}

/// One matrix row as read from the matrix JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MatrixRow {
    /// User identifier for rollout gates.
    #[serde(default, rename = "userId")]
    user_id: Option<String>,
    /// Variant assignments keyed by layer.
    #[serde(default)]
    variants: BTreeMap<LayerName, String>,
    /// Request attributes keyed by field.
    #[serde(default)]
    attrs: BTreeMap<String, String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failures surfaced as `cli_error` documents.
#[derive(Debug, Error)]
enum CliError {
    /// A file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path of the unreadable file.
        path: PathBuf,
        /// Underlying io error.
        #[source]
        source: std::io::Error,
    },
    /// The named flow is not registered with the host.
    #[error("unknown flow: {0}")]
    UnknownFlow(String),
    /// The requested bootstrapper does not match the host.
    #[error("unknown bootstrapper type: {0}")]
    UnknownBootstrapper(String),
    /// A patch document failed to parse.
    #[error("invalid patch at {path}: {} at {}: {}", .finding.code, .finding.path, .finding.message)]
    Patch {
        /// Path of the offending patch file.
        path: PathBuf,
        /// The failing finding.
        finding: Finding,
    },
    /// The matrix document failed to parse.
    #[error("invalid matrix at {path}: {message}")]
    Matrix {
        /// Path of the offending matrix file.
        path: PathBuf,
        /// Parse failure description.
        message: String,
    },
    /// A selector gate could not be evaluated during preview.
    #[error("selector evaluation failed: {0}")]
    Selector(String),
    /// The output stream rejected a write.
    #[error("cannot write output: {0}")]
    Output(String),
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Runs one CLI invocation against a host.
///
/// `args` excludes the binary name. The returned value is the process exit
/// code; exactly one JSON document is written to `out` and failures add a
/// line on `err`.
pub fn run(
    args: &[String],
    host: &CliHost,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> u8 {
    let parsed = Cli::try_parse_from(std::iter::once("rorchestrator".to_string()).chain(
        args.iter().cloned(),
    ));
    let cli = match parsed {
        Ok(cli) => cli,
        Err(parse_err) => return emit_parse_error(&parse_err, out, err),
    };

    let result = match cli.command {
        Commands::Validate(command) => command_validate(&command, host),
        Commands::ExplainFlow(command) => command_explain_flow(&command, host),
        Commands::ExplainPatch(command) => command_explain_patch(&command, host),
        Commands::DiffPatch(command) => command_diff_patch(&command),
        Commands::PreviewMatrix(command) => command_preview_matrix(&command, host),
    };

    match result {
        Ok(document) => {
            if write_document(out, &document).is_err() {
                return EXIT_FAILURE;
            }
            EXIT_OK
        }
        Err(cli_err) => emit_cli_error(&cli_err.to_string(), EXIT_FAILURE, out, err),
    }
}

/// Maps a clap parse failure onto the exit-code contract.
fn emit_parse_error(parse_err: &clap::Error, out: &mut dyn Write, err: &mut dyn Write) -> u8 {
    match parse_err.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
            let _ = write!(out, "{parse_err}");
            EXIT_OK
        }
        ErrorKind::InvalidSubcommand => {
            emit_cli_error(&parse_err.to_string(), EXIT_UNKNOWN_COMMAND, out, err)
        }
        _ => emit_cli_error(&parse_err.to_string(), EXIT_FAILURE, out, err),
    }
}

/// Writes a `cli_error` document and the stderr line, returning `code`.
fn emit_cli_error(message: &str, code: u8, out: &mut dyn Write, err: &mut dyn Write) -> u8 {
    let document = CliErrorDoc {
        kind: "cli_error",
        message: message.to_string(),
    };
    let _ = write_document(out, &document);
    let _ = writeln!(err, "{message}");
    code
}

/// Serializes one document to the output stream.
fn write_document<T: Serialize>(out: &mut dyn Write, document: &T) -> Result<(), CliError> {
    let body = serde_json::to_string_pretty(document)
        .map_err(|serde_err| CliError::Output(serde_err.to_string()))?;
    writeln!(out, "{body}").map_err(|io_err| CliError::Output(io_err.to_string()))
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Runs `validate`.
fn command_validate(command: &ValidateCommand, host: &CliHost) -> Result<Value, CliError> {
    check_bootstrapper(command.bootstrapper_type.as_deref(), host)?;
    let body = read_file(&command.patch_json)?;
    let ctx = host_patch_context(host);
    let document = match parse_patch(&body, &ctx) {
        Ok(document) => ValidateDoc {
            kind: "validate",
            is_valid: true,
            findings: document.warnings,
        },
        Err(finding) => ValidateDoc {
            kind: "validate",
            is_valid: false,
            findings: vec![finding],
        },
    };
    to_value(&document)
}

/// Runs `explain-flow`.
fn command_explain_flow(command: &ExplainFlowCommand, host: &CliHost) -> Result<Value, CliError> {
    check_bootstrapper(command.bootstrapper_type.as_deref(), host)?;
    let plan = host
        .registry
        .explain(&command.flow)
        .ok_or_else(|| CliError::UnknownFlow(command.flow.clone()))?;
    to_value(&ExplainDoc {
        kind: "explain",
        plan,
    })
}

/// Runs `explain-patch`.
fn command_explain_patch(command: &ExplainPatchCommand, host: &CliHost) -> Result<Value, CliError> {
    let document = load_patch(&command.patch_json, host)?;
    let stages = document
        .flows
        .get(&command.flow)
        .map(|flow| {
            flow.stages
                .iter()
                .map(|(stage, patch)| (stage.clone(), stage_to_json(patch)))
                .collect()
        })
        .unwrap_or_default();
    to_value(&ExplainPatchDoc {
        kind: "explain_patch",
        flow: command.flow.clone(),
        stages,
    })
}

/// Runs `diff-patch`.
fn command_diff_patch(command: &DiffPatchCommand) -> Result<Value, CliError> {
    let ctx = PatchContext::empty();
    let old_body = read_file(&command.old_json)?;
    let old = parse_patch(&old_body, &ctx).map_err(|finding| CliError::Patch {
        path: command.old_json.clone(),
        finding,
    })?;
    let new_body = read_file(&command.new_json)?;
    let new = parse_patch(&new_body, &ctx).map_err(|finding| CliError::Patch {
        path: command.new_json.clone(),
        finding,
    })?;
    to_value(&DiffDoc {
        kind: "diff",
        entries: diff_patches(&old, &new),
    })
}

/// Runs `preview-matrix`.
fn command_preview_matrix(
    command: &PreviewMatrixCommand,
    host: &CliHost,
) -> Result<Value, CliError> {
    let document = load_patch(&command.patch_json, host)?;
    let matrix_body = read_file(&command.matrix_json)?;
    let rows: Vec<MatrixRow> =
        serde_json::from_str(&matrix_body).map_err(|parse_err| CliError::Matrix {
            path: command.matrix_json.clone(),
            message: parse_err.to_string(),
        })?;

    let stages = document
        .flows
        .get(&command.flow)
        .map(|flow| flow.stages.clone())
        .unwrap_or_default();

    let mut previews = Vec::with_capacity(rows.len());
    for (row_index, row) in rows.iter().enumerate() {
        let gate_ctx = GateContext {
            user_id: row.user_id.as_deref(),
            variants: &row.variants,
            attrs: &row.attrs,
            selectors: Some(&host.selectors),
        };
        let mut preview_stages = BTreeMap::new();
        for (stage, patch) in &stages {
            let mut modules = Vec::with_capacity(patch.modules.len());
            for entry in &patch.modules {
                let (allowed, reason_code) = match &entry.gate {
                    None => (true, None),
                    Some(gate) => {
                        let decision = evaluate(gate, &gate_ctx)
                            .map_err(|gate_err| CliError::Selector(gate_err.to_string()))?;
                        (decision.allowed, Some(decision.reason_code))
                    }
                };
                modules.push(PreviewModule {
                    id: entry.id.to_string(),
                    allowed,
                    reason_code,
                });
            }
            preview_stages.insert(stage.clone(), modules);
        }
        previews.push(PreviewRow {
            row: row_index,
            stages: preview_stages,
        });
    }

    to_value(&PreviewMatrixDoc {
        kind: "preview_matrix",
        flow: command.flow.clone(),
        previews,
    })
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

/// Verifies the requested bootstrapper matches the host, when both name one.
fn check_bootstrapper(requested: Option<&str>, host: &CliHost) -> Result<(), CliError> {
    match (requested, host.bootstrapper_type.as_deref()) {
        (Some(requested), Some(hosted)) if requested != hosted => {
            Err(CliError::UnknownBootstrapper(requested.to_string()))
        }
        _ => Ok(()),
    }
}

/// Builds the patch context from the host's reference material.
fn host_patch_context(host: &CliHost) -> PatchContext<'_> {
    PatchContext {
        catalog: (!host.catalog.module_types().is_empty()).then_some(&host.catalog),
        selectors: (!host.selectors.names().is_empty()).then_some(&host.selectors),
    }
}

/// Reads a file into a string.
fn read_file(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|io_err| CliError::Io {
        path: path.to_path_buf(),
        source: io_err,
    })
}

/// Loads and parses a patch file with the host's reference material.
fn load_patch(path: &Path, host: &CliHost) -> Result<PatchDocument, CliError> {
    let body = read_file(path)?;
    parse_patch(&body, &host_patch_context(host)).map_err(|finding| CliError::Patch {
        path: path.to_path_buf(),
        finding,
    })
}

/// Renders one stage patch in canonical patch field layout.
fn stage_to_json(patch: &StagePatch) -> Value {
    let mut stage = serde_json::Map::new();
    if let Some(bound) = patch.fanout_max {
        stage.insert("fanoutMax".to_string(), Value::from(bound));
    }
    if let Some(policy) = patch.failure_policy {
        stage.insert("failurePolicy".to_string(), Value::from(policy.as_str()));
    }
    let modules: Vec<Value> = patch
        .modules
        .iter()
        .map(|entry| {
            let mut module = serde_json::Map::new();
            module.insert("id".to_string(), Value::from(entry.id.to_string()));
            module.insert("use".to_string(), Value::from(entry.module_type.to_string()));
            module.insert("with".to_string(), entry.params.clone());
            if let Some(gate) = &entry.gate {
                module.insert("gate".to_string(), gate_to_json(gate));
            }
            Value::Object(module)
        })
        .collect();
    stage.insert("modules".to_string(), Value::Array(modules));
    Value::Object(stage)
}

/// Serializes a document into a JSON value.
fn to_value<T: Serialize>(document: &T) -> Result<Value, CliError> {
    serde_json::to_value(document).map_err(|serde_err| CliError::Output(serde_err.to_string()))
}
