// rorchestrator-core/src/core/snapshot.rs
// ============================================================================
// Module: Config Snapshots
// Description: Versioned config snapshot value and the empty provider.
// Purpose: Carry the patch document the engine resolves once per context.
// Dependencies: async-trait, serde, crate::interfaces
// ============================================================================

//! ## Overview
//! A [`ConfigSnapshot`] is an immutable value: a config version, the raw
//! patch JSON, and provenance metadata. The engine never mutates snapshots;
//! a flow context resolves one snapshot at most once per invocation through
//! its [`SnapshotProvider`](crate::interfaces::SnapshotProvider).

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::interfaces::SnapshotError;
use crate::interfaces::SnapshotProvider;

// ============================================================================
// SECTION: Snapshot Value
// ============================================================================

/// Provenance metadata of a config snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Origin of the snapshot (store name, service, or test fixture).
    pub source: String,
    /// ISO-8601 timestamp the snapshot was produced at.
    pub timestamp_utc: String,
    /// Overlay names merged into the patch, in application order.
    pub overlays: Vec<String>,
}

/// Immutable, versioned view over the dynamic flow configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// Monotonic config version.
    pub config_version: u64,
    /// Raw patch JSON in schema v1.
    pub patch_json: String,
    /// Provenance metadata.
    pub meta: SnapshotMeta,
}

impl ConfigSnapshot {
    /// Creates a snapshot with the given version and patch body.
    #[must_use]
    pub fn new(config_version: u64, patch_json: impl Into<String>, meta: SnapshotMeta) -> Self {
        Self {
            config_version,
            patch_json: patch_json.into(),
            meta,
        }
    }

    /// Creates an empty v1 snapshot configuring no flows.
    #[must_use]
    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            config_version: 0,
            patch_json: r#"{"schemaVersion":"v1","flows":{}}"#.to_string(),
            meta: SnapshotMeta {
                source: source.into(),
                timestamp_utc: String::new(),
                overlays: Vec::new(),
            },
        }
    }
}

// ============================================================================
// SECTION: Empty Provider
// ============================================================================

/// Provider yielding an empty snapshot; the default for new contexts.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySnapshotProvider;

#[async_trait]
impl SnapshotProvider for EmptySnapshotProvider {
    async fn fetch(&self) -> Result<ConfigSnapshot, SnapshotError> {
        Ok(ConfigSnapshot::empty("empty"))
    }
}
