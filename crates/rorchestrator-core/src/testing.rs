// rorchestrator-core/src/testing.rs
// ============================================================================
// Module: Testing Harness
// Description: Override providers and collectors for host test suites.
// Purpose: Supply snapshot overrides, invocation recording, and recording
// observability sinks. Dependencies: async-trait, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The testing harness is the boundary surface hosts use in their test
//! suites: a static snapshot provider overriding the dynamic config, a
//! failing provider for unavailability paths, an invocation collector
//! tracking which modules ran and how concurrently, and recording
//! observability sinks for asserting on spans and counters. Production code
//! never depends on this module.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;

use crate::core::snapshot::ConfigSnapshot;
use crate::core::snapshot::SnapshotMeta;
use crate::interfaces::FlowMetrics;
use crate::interfaces::FlowObserver;
use crate::interfaces::FlowSpan;
use crate::interfaces::SnapshotError;
use crate::interfaces::SnapshotProvider;
use crate::interfaces::SpanFields;

// ============================================================================
// SECTION: Snapshot Overrides
// ============================================================================

/// Provider returning one fixed snapshot, overriding any config source.
#[derive(Debug, Clone)]
pub struct StaticSnapshotProvider {
    /// The snapshot returned on every fetch.
    snapshot: ConfigSnapshot,
}

impl StaticSnapshotProvider {
    /// Creates a provider over an explicit snapshot.
    #[must_use]
    pub const fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            snapshot,
        }
    }

    /// Creates a provider from a patch body and version.
    #[must_use]
    pub fn from_patch(config_version: u64, patch_json: impl Into<String>) -> Self {
        Self::new(ConfigSnapshot::new(config_version, patch_json, SnapshotMeta {
            source: "test".to_string(),
            timestamp_utc: String::new(),
            overlays: Vec::new(),
        }))
    }
}

#[async_trait]
impl SnapshotProvider for StaticSnapshotProvider {
    async fn fetch(&self) -> Result<ConfigSnapshot, SnapshotError> {
        Ok(self.snapshot.clone())
    }
}

/// Provider failing every fetch, for `CFG_UNAVAILABLE` paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSnapshotProvider;

#[async_trait]
impl SnapshotProvider for FailingSnapshotProvider {
    async fn fetch(&self) -> Result<ConfigSnapshot, SnapshotError> {
        Err(SnapshotError::Unavailable("test provider always fails".to_string()))
    }
}

// ============================================================================
// SECTION: Invocation Collector
// ============================================================================

/// One recorded module invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRecord {
    /// Module id of the invocation.
    pub module_id: String,
    /// Module type of the invocation.
    pub module_type: String,
}

/// Records module invocations and the peak in-flight concurrency.
///
/// Test modules call [`Self::enter`] at the top of `execute`; the returned
/// guard tracks concurrency until dropped.
#[derive(Debug, Default)]
pub struct InvocationCollector {
    /// Recorded invocations in begin order.
    records: Mutex<Vec<InvocationRecord>>,
    /// Currently in-flight invocations.
    active: AtomicUsize,
    /// Highest observed in-flight count.
    peak: AtomicUsize,
}

impl InvocationCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an invocation begin and returns its concurrency guard.
    #[must_use]
    pub fn enter(
        &self,
        module_id: impl Into<String>,
        module_type: impl Into<String>,
    ) -> InvocationGuard<'_> {
        if let Ok(mut records) = self.records.lock() {
            records.push(InvocationRecord {
                module_id: module_id.into(),
                module_type: module_type.into(),
            });
        }
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        InvocationGuard {
            collector: self,
        }
    }

    /// Returns the recorded invocations.
    #[must_use]
    pub fn invocations(&self) -> Vec<InvocationRecord> {
        self.records.lock().map(|records| records.clone()).unwrap_or_default()
    }

    /// Returns how many invocations were recorded.
    #[must_use]
    pub fn count(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    /// Returns the highest in-flight concurrency observed.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Guard decrementing the in-flight count on drop.
pub struct InvocationGuard<'a> {
    /// Owning collector.
    collector: &'a InvocationCollector,
}

impl Drop for InvocationGuard<'_> {
    fn drop(&mut self) {
        self.collector.active.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// SECTION: Recording Observability Sinks
// ============================================================================

/// One recorded span start/end pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanRecord {
    /// Span name.
    pub name: &'static str,
    /// Node name tag, when present.
    pub node: Option<String>,
    /// Outcome kind the span ended with.
    pub outcome_kind: String,
    /// Outcome code the span ended with.
    pub outcome_code: String,
}

/// Observer recording every completed span.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    /// Completed spans in end order.
    spans: Arc<Mutex<Vec<SpanRecord>>>,
}

impl RecordingObserver {
    /// Creates an empty recording observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the completed spans.
    #[must_use]
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans.lock().map(|spans| spans.clone()).unwrap_or_default()
    }

    /// Returns how many completed spans carry the given name.
    #[must_use]
    pub fn count_of(&self, name: &str) -> usize {
        self.spans().iter().filter(|span| span.name == name).count()
    }
}

/// Span handle recording its completion into the owning observer.
struct RecordingSpan {
    /// Destination span list.
    spans: Arc<Mutex<Vec<SpanRecord>>>,
    /// Span name.
    name: &'static str,
    /// Node name tag, when present.
    node: Option<String>,
}

impl FlowSpan for RecordingSpan {
    fn end(self: Box<Self>, outcome_kind: &str, outcome_code: &str) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.push(SpanRecord {
                name: self.name,
                node: self.node,
                outcome_kind: outcome_kind.to_string(),
                outcome_code: outcome_code.to_string(),
            });
        }
    }
}

impl FlowObserver for RecordingObserver {
    fn start_span(&self, fields: &SpanFields<'_>) -> Box<dyn FlowSpan> {
        Box::new(RecordingSpan {
            spans: Arc::clone(&self.spans),
            name: fields.name,
            node: fields.node.map(str::to_string),
        })
    }
}

/// One recorded metric event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricRecord {
    /// Metric name.
    pub name: &'static str,
    /// Tag pairs as recorded.
    pub tags: Vec<(String, String)>,
    /// Histogram sample in milliseconds; `None` for counters.
    pub millis: Option<u64>,
}

/// Metrics sink recording every counter increment and latency sample.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    /// Recorded events in emission order.
    events: Mutex<Vec<MetricRecord>>,
}

impl RecordingMetrics {
    /// Creates an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<MetricRecord> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns the total count recorded under a counter name.
    #[must_use]
    pub fn counter_total(&self, name: &str) -> usize {
        self.events().iter().filter(|event| event.name == name && event.millis.is_none()).count()
    }

    /// Returns counter events carrying a specific tag value.
    #[must_use]
    pub fn counter_with_tag(&self, name: &str, key: &str, value: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| {
                event.name == name
                    && event.millis.is_none()
                    && event.tags.iter().any(|(k, v)| k == key && v == value)
            })
            .count()
    }

    /// Records one event.
    fn push(&self, name: &'static str, tags: &[(&'static str, &str)], millis: Option<u64>) {
        if let Ok(mut events) = self.events.lock() {
            events.push(MetricRecord {
                name,
                tags: tags.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect(),
                millis,
            });
        }
    }
}

impl FlowMetrics for RecordingMetrics {
    fn record_latency_ms(&self, name: &'static str, millis: u64, tags: &[(&'static str, &str)]) {
        self.push(name, tags, Some(millis));
    }

    fn increment(&self, name: &'static str, tags: &[(&'static str, &str)]) {
        self.push(name, tags, None);
    }
}
