// rorchestrator-core/src/core/hashing.rs
// ============================================================================
// Module: Plan Hashing Support
// Description: Type tokens and canonical plan-hash rendering.
// Purpose: Provide stable type identity and the 16-hex plan hash form.
// Dependencies: rorchestrator-gate (FNV-1a-64), serde
// ============================================================================

//! ## Overview
//! Plan hashes must be identical for identical blueprints on every platform.
//! Type identity enters the hash through [`TypeToken`], a developer-visible
//! type name captured at registration time, which substitutes for runtime
//! type reflection. The canonical byte encoding (length-prefixed UTF-16
//! code units, little-endian) lives in the shared FNV hasher of
//! `rorchestrator-gate`; this module renders hashes and carries the tokens.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::TypeId;
use std::fmt;

use serde::Serialize;

// ============================================================================
// SECTION: Type Tokens
// ============================================================================

/// Stable type identity for hashing and compile-time signature checks.
///
/// # Invariants
/// - `id` and `name` are captured from the same `T`; two tokens compare
///   equal exactly when their `T`s are the same type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TypeToken {
    /// Developer-visible qualified type name fed into plan hashes.
    name: &'static str,
    /// Runtime type identity used for payload downcasts.
    #[serde(skip)]
    id: TypeId,
}

impl TypeToken {
    /// Captures the token for a type.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
            id: TypeId::of::<T>(),
        }
    }

    /// Returns the qualified type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the runtime type identity.
    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    /// Returns true when the token identifies `T`.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ============================================================================
// SECTION: Hash Rendering
// ============================================================================

/// Renders a plan hash as its canonical 16-hex form.
#[must_use]
pub fn format_plan_hash(hash: u64) -> String {
    format!("{hash:016x}")
}
