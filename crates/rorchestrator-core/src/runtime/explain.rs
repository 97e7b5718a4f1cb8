// rorchestrator-core/src/runtime/explain.rs
// ============================================================================
// Module: Execution Explain
// Description: Optional per-node execution trace records.
// Purpose: Collect node outcomes in engine-observed completion order.
// Dependencies: rorchestrator-gate, serde, std::sync
// ============================================================================

//! ## Overview
//! When a context enables explain, the engine appends one record per
//! completed node: step records in completion order, the stage's join record
//! after them. Records are immutable once emitted; the collector serializes
//! writes internally so in-stage fan-out needs no external locking.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use rorchestrator_gate::GateDecision;
use serde::Serialize;

// ============================================================================
// SECTION: Records
// ============================================================================

/// One node-level execution record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplainRecord {
    /// Node name (module id for config-driven fan-out steps).
    pub node: String,
    /// Stage the node ran in.
    pub stage: String,
    /// Node kind label (`step` or `join`).
    pub kind: String,
    /// Outcome kind label.
    pub outcome_kind: String,
    /// Outcome reason code; empty for ok.
    pub outcome_code: String,
    /// Module id for step records.
    pub module_id: Option<String>,
    /// Module type for step records.
    pub module_type: Option<String>,
    /// Gate decision when a gate was evaluated for the node.
    pub gate: Option<GateDecision>,
    /// Node duration in milliseconds; zero for skipped nodes.
    pub duration_ms: u64,
}

/// Ordered per-invocation execution trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ExecExplain {
    /// Node records in engine-observed completion order.
    pub records: Vec<ExplainRecord>,
}

// ============================================================================
// SECTION: Collector
// ============================================================================

/// Internally synchronized explain record collector.
#[derive(Debug, Default)]
pub(crate) struct ExplainCollector {
    /// Collected records behind the serialization lock.
    records: Mutex<Vec<ExplainRecord>>,
}

impl ExplainCollector {
    /// Appends a record; poisoned locks drop the record rather than panic.
    pub(crate) fn record(&self, record: ExplainRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }

    /// Takes the collected trace, leaving the collector empty.
    pub(crate) fn take(&self) -> ExecExplain {
        let records =
            self.records.lock().map(|mut records| std::mem::take(&mut *records)).unwrap_or_default();
        ExecExplain {
            records,
        }
    }
}
