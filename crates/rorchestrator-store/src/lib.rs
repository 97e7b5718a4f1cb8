// rorchestrator-store/src/lib.rs
// ============================================================================
// Module: RORchestrator Store Crate Root
// Description: Last-known-good config snapshot persistence.
// Purpose: Expose the LKG file store and its snapshot provider adapter.
// Dependencies: rorchestrator-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The store crate persists the last-known-good config snapshot as a JSON
//! file and adapts it to the engine's snapshot-provider interface. Writes
//! are atomic (temp file + rename in the same directory) so readers never
//! observe a torn snapshot.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use store::LkgSnapshotProvider;
pub use store::LkgSnapshotStore;
pub use store::StoreError;
