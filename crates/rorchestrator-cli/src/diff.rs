// rorchestrator-cli/src/diff.rs
// ============================================================================
// Module: Patch Diffing
// Description: Structural diff between two parsed patch documents.
// Purpose: Report added, removed, and changed flows, stages, and modules.
// Dependencies: rorchestrator-core, serde
// ============================================================================

//! ## Overview
//! The diff walks two parsed patch documents and reports structural entries
//! with dotted paths (`HomeFeed.s1.modules.m2`). Entries are ordered by
//! path segment: flows, then stages, then stage fields, then modules, so
//! diff output is deterministic for identical inputs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rorchestrator_core::ModuleEntry;
use rorchestrator_core::PatchDocument;
use rorchestrator_core::StagePatch;
use serde::Serialize;

// ============================================================================
// SECTION: Diff Entries
// ============================================================================

/// Operation of a diff entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffOp {
    /// Present only in the new patch.
    Add,
    /// Present only in the old patch.
    Remove,
    /// Present in both with different content.
    Change,
}

/// One structural difference between two patches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    /// Operation kind.
    pub op: DiffOp,
    /// Dotted path of the differing element.
    pub path: String,
    /// Short description of what changed, when helpful.
    pub detail: Option<String>,
}

impl DiffEntry {
    /// Creates an entry without detail.
    fn new(op: DiffOp, path: String) -> Self {
        Self {
            op,
            path,
            detail: None,
        }
    }

    /// Creates a change entry with detail.
    fn change(path: String, detail: String) -> Self {
        Self {
            op: DiffOp::Change,
            path,
            detail: Some(detail),
        }
    }
}

// ============================================================================
// SECTION: Diffing
// ============================================================================

/// Computes the structural diff from `old` to `new`.
#[must_use]
pub fn diff_patches(old: &PatchDocument, new: &PatchDocument) -> Vec<DiffEntry> {
    let mut entries = Vec::new();

    for (flow, old_flow) in &old.flows {
        match new.flows.get(flow) {
            None => entries.push(DiffEntry::new(DiffOp::Remove, flow.clone())),
            Some(new_flow) => {
                diff_stages(flow, &old_flow.stages, &new_flow.stages, &mut entries);
            }
        }
    }
    for flow in new.flows.keys() {
        if !old.flows.contains_key(flow) {
            entries.push(DiffEntry::new(DiffOp::Add, flow.clone()));
        }
    }

    entries
}

/// Diffs the stages of one flow present on both sides.
fn diff_stages(
    flow: &str,
    old: &std::collections::BTreeMap<String, StagePatch>,
    new: &std::collections::BTreeMap<String, StagePatch>,
    entries: &mut Vec<DiffEntry>,
) {
    for (stage, old_stage) in old {
        let path = format!("{flow}.{stage}");
        match new.get(stage) {
            None => entries.push(DiffEntry::new(DiffOp::Remove, path)),
            Some(new_stage) => diff_stage(&path, old_stage, new_stage, entries),
        }
    }
    for stage in new.keys() {
        if !old.contains_key(stage) {
            entries.push(DiffEntry::new(DiffOp::Add, format!("{flow}.{stage}")));
        }
    }
}

/// Diffs one stage present on both sides.
fn diff_stage(path: &str, old: &StagePatch, new: &StagePatch, entries: &mut Vec<DiffEntry>) {
    if old.fanout_max != new.fanout_max {
        entries.push(DiffEntry::change(
            format!("{path}.fanoutMax"),
            format!("{} -> {}", render_fanout(old.fanout_max), render_fanout(new.fanout_max)),
        ));
    }
    if old.failure_policy != new.failure_policy {
        entries.push(DiffEntry::change(
            format!("{path}.failurePolicy"),
            format!(
                "{} -> {}",
                render_policy(old.failure_policy),
                render_policy(new.failure_policy)
            ),
        ));
    }

    for entry in &old.modules {
        let module_path = format!("{path}.modules.{}", entry.id);
        match new.modules.iter().find(|candidate| candidate.id == entry.id) {
            None => entries.push(DiffEntry::new(DiffOp::Remove, module_path)),
            Some(new_entry) => {
                if let Some(detail) = module_change(entry, new_entry) {
                    entries.push(DiffEntry::change(module_path, detail));
                }
            }
        }
    }
    for entry in &new.modules {
        if !old.modules.iter().any(|candidate| candidate.id == entry.id) {
            entries.push(DiffEntry::new(DiffOp::Add, format!("{path}.modules.{}", entry.id)));
        }
    }
}

/// Renders an optional fan-out bound for diff detail text.
fn render_fanout(value: Option<usize>) -> String {
    value.map_or_else(|| "unset".to_string(), |bound| bound.to_string())
}

/// Renders an optional failure policy for diff detail text.
fn render_policy(value: Option<rorchestrator_core::FailurePolicy>) -> &'static str {
    value.map_or("unset", rorchestrator_core::FailurePolicy::as_str)
}

/// Describes what changed between two module entries with the same id.
fn module_change(old: &ModuleEntry, new: &ModuleEntry) -> Option<String> {
    let mut changed = Vec::new();
    if old.module_type != new.module_type {
        changed.push("use");
    }
    if old.params != new.params {
        changed.push("with");
    }
    if old.gate != new.gate {
        changed.push("gate");
    }
    if changed.is_empty() { None } else { Some(changed.join(",")) }
}
