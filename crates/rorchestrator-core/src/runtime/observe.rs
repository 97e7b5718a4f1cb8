// rorchestrator-core/src/runtime/observe.rs
// ============================================================================
// Module: Observability Names
// Description: Fixed span/metric names, tag keys, and code sanitizing.
// Purpose: Keep the engine's observability vocabulary stable for consumers.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Span names, metric names, and tag keys are a fixed public vocabulary;
//! dashboards and alerting depend on them verbatim. Skip reason codes are
//! sanitized before use as tag values so unbounded or malformed codes cannot
//! explode tag cardinality.

// ============================================================================
// SECTION: Span Names
// ============================================================================

/// Flow invocation span.
pub const SPAN_FLOW: &str = "rorchestrator.flow";
/// Blueprint step node span.
pub const SPAN_STEP: &str = "rorchestrator.node.step";
/// Join node span.
pub const SPAN_JOIN: &str = "rorchestrator.node.join";
/// Config-driven fan-out module span.
pub const SPAN_FANOUT_MODULE: &str = "rorchestrator.stage.fanout.module";

// ============================================================================
// SECTION: Metric Names
// ============================================================================

/// Flow latency histogram, milliseconds.
pub const HIST_FLOW_LATENCY: &str = "rorchestrator.flow.latency.ms";
/// Step latency histogram, milliseconds.
pub const HIST_STEP_LATENCY: &str = "rorchestrator.step.latency.ms";
/// Join latency histogram, milliseconds.
pub const HIST_JOIN_LATENCY: &str = "rorchestrator.join.latency.ms";
/// Flow outcome counter.
pub const CTR_FLOW_OUTCOMES: &str = "rorchestrator.flow.outcomes";
/// Step outcome counter.
pub const CTR_STEP_OUTCOMES: &str = "rorchestrator.step.outcomes";
/// Join outcome counter.
pub const CTR_JOIN_OUTCOMES: &str = "rorchestrator.join.outcomes";
/// Step skip reason counter.
pub const CTR_STEP_SKIPPED: &str = "rorchestrator.step.skipped.reasons";

// ============================================================================
// SECTION: Tag Keys
// ============================================================================

/// Flow name tag key.
pub const TAG_FLOW_NAME: &str = "flow.name";
/// Plan hash tag key.
pub const TAG_PLAN_HASH: &str = "plan.hash";
/// Config version tag key.
pub const TAG_CONFIG_VERSION: &str = "config.version";
/// Node name tag key.
pub const TAG_NODE_NAME: &str = "node.name";
/// Node kind tag key.
pub const TAG_NODE_KIND: &str = "node.kind";
/// Stage name tag key.
pub const TAG_STAGE_NAME: &str = "stage.name";
/// Module id tag key.
pub const TAG_MODULE_ID: &str = "module.id";
/// Module type tag key.
pub const TAG_MODULE_TYPE: &str = "module.type";
/// Outcome kind tag key.
pub const TAG_OUTCOME_KIND: &str = "outcome.kind";
/// Outcome code tag key.
pub const TAG_OUTCOME_CODE: &str = "outcome.code";
/// Skip reason tag key.
pub const TAG_SKIP_CODE: &str = "skip.code";

// ============================================================================
// SECTION: Sanitizing
// ============================================================================

/// Maximum accepted length of a skip code tag value.
const MAX_CODE_LEN: usize = 64;

/// Maximum accepted run of consecutive digits in a skip code.
const MAX_DIGIT_RUN: usize = 5;

/// Bucket label for codes failing sanitization.
const OTHER_BUCKET: &str = "OTHER";

/// Sanitizes a skip reason code for use as a metric tag value.
///
/// A code passes when it is non-empty, at most 64 characters, made of
/// `A`-`Z`, digits, and underscores, with digit runs shorter than 6; any
/// other code buckets to `OTHER`.
#[must_use]
pub fn sanitize_skip_code(code: &str) -> String {
    if code.is_empty() || code.len() > MAX_CODE_LEN {
        return OTHER_BUCKET.to_string();
    }
    let mut digit_run = 0usize;
    for ch in code.chars() {
        if ch.is_ascii_digit() {
            digit_run += 1;
            if digit_run > MAX_DIGIT_RUN {
                return OTHER_BUCKET.to_string();
            }
        } else if ch.is_ascii_uppercase() || ch == '_' {
            digit_run = 0;
        } else {
            return OTHER_BUCKET.to_string();
        }
    }
    code.to_string()
}
