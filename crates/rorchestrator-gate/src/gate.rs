// rorchestrator-gate/src/gate.rs
// ============================================================================
// Module: Gate Core Types
// Description: Composable boolean gate tree with validated construction.
// Purpose: Define `Gate`, its leaf predicates, and composite operators.
// Dependencies: smallvec, crate::identifiers
// ============================================================================

//! ## Overview
//! This module defines the gate tree. Leaves carry the domain predicates
//! (experiment variant, rollout bucket, request attribute, named selector);
//! composites provide short-circuiting boolean structure. Construction is
//! validated: composites reject empty child lists and rollout percentages
//! outside `0..=100` are refused, so an instantiated tree is always
//! evaluable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use smallvec::SmallVec;

use crate::identifiers::LayerName;
use crate::identifiers::SelectorName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum nesting depth a gate tree may reach.
///
/// A single leaf has depth 1; each composite layer adds 1.
pub const MAX_GATE_DEPTH: usize = 10;

// ============================================================================
// SECTION: Request Attribute Fields
// ============================================================================

/// Request attribute fields a [`Gate::RequestAttr`] may test.
///
/// # Invariants
/// - The set is closed; configuration naming any other field is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestAttrField {
    /// Originating region of the request.
    Region,
    /// Device class of the request.
    Device,
    /// Application version string of the request.
    AppVersion,
}

impl RequestAttrField {
    /// Returns the canonical wire name for the field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::Device => "device",
            Self::AppVersion => "appVersion",
        }
    }

    /// Parses a wire name into a field, returning `None` for unknown names.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "region" => Some(Self::Region),
            "device" => Some(Self::Device),
            "appVersion" => Some(Self::AppVersion),
            _ => None,
        }
    }
}

impl fmt::Display for RequestAttrField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Gate Definition
// ============================================================================

/// Composable gate tree deciding whether a step module runs.
///
/// # Invariants
/// - Composite child lists are non-empty (enforced by constructors).
/// - `Rollout.percent` lies in `0..=100` (enforced by constructors).
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    /// Allows when the context's variant for `layer` is one of `variants`.
    Experiment {
        /// Experiment layer whose assigned variant is tested.
        layer: LayerName,
        /// Variants that allow the gate.
        variants: Vec<String>,
    },

    /// Allows when the user's rollout bucket falls below `percent`.
    Rollout {
        /// Percentage of buckets that allow, in `0..=100`.
        percent: u8,
        /// Salt mixed into the bucket hash.
        salt: String,
    },

    /// Allows when the named request attribute matches one of `values`.
    RequestAttr {
        /// Attribute field under test.
        field: RequestAttrField,
        /// Values that allow the gate (ordinal comparison).
        values: Vec<String>,
    },

    /// Delegates to a selector function registered under this name.
    Selector(SelectorName),

    /// Allows when every child allows; denial short-circuits left-to-right.
    All(SmallVec<[Box<Self>; 4]>),

    /// Allows when any child allows; allowance short-circuits left-to-right.
    Any(SmallVec<[Box<Self>; 4]>),

    /// Inverts the child's allowance.
    Not(Box<Self>),
}

// ============================================================================
// SECTION: Construction Errors
// ============================================================================

/// Errors that can occur while constructing a [`Gate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateBuildError {
    /// A composite gate was given an empty child list.
    EmptyComposite {
        /// Composite kind label (`all` or `any`).
        kind: &'static str,
    },
    /// A rollout percentage was outside `0..=100`.
    PercentOutOfRange {
        /// Offending percentage value.
        percent: u64,
    },
    /// A gate tree exceeded [`MAX_GATE_DEPTH`].
    TooDeep {
        /// Depth encountered during validation.
        depth: usize,
    },
}

impl fmt::Display for GateBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyComposite {
                kind,
            } => write!(f, "composite gate '{kind}' requires at least one child"),
            Self::PercentOutOfRange {
                percent,
            } => write!(f, "rollout percent {percent} is outside 0..=100"),
            Self::TooDeep {
                depth,
            } => write!(f, "gate tree depth {depth} exceeds maximum {MAX_GATE_DEPTH}"),
        }
    }
}

impl std::error::Error for GateBuildError {}

// ============================================================================
// SECTION: Constructor Helpers
// ============================================================================

impl Gate {
    /// Creates an experiment-variant gate.
    #[must_use]
    pub fn experiment(layer: impl Into<LayerName>, variants: Vec<String>) -> Self {
        Self::Experiment {
            layer: layer.into(),
            variants,
        }
    }

    /// Creates a rollout gate.
    ///
    /// # Errors
    ///
    /// Returns [`GateBuildError::PercentOutOfRange`] when `percent > 100`.
    pub fn rollout(percent: u64, salt: impl Into<String>) -> Result<Self, GateBuildError> {
        let bounded = u8::try_from(percent)
            .ok()
            .filter(|value| *value <= 100)
            .ok_or(GateBuildError::PercentOutOfRange {
                percent,
            })?;
        Ok(Self::Rollout {
            percent: bounded,
            salt: salt.into(),
        })
    }

    /// Creates a request-attribute gate.
    #[must_use]
    pub const fn request_attr(field: RequestAttrField, values: Vec<String>) -> Self {
        Self::RequestAttr {
            field,
            values,
        }
    }

    /// Creates a selector gate delegating to a registered selector.
    #[must_use]
    pub fn selector(name: impl Into<SelectorName>) -> Self {
        Self::Selector(name.into())
    }

    /// Creates a conjunction of the given gates.
    ///
    /// # Errors
    ///
    /// Returns [`GateBuildError::EmptyComposite`] when `children` is empty.
    pub fn all(children: Vec<Self>) -> Result<Self, GateBuildError> {
        if children.is_empty() {
            return Err(GateBuildError::EmptyComposite {
                kind: "all",
            });
        }
        Ok(Self::All(children.into_iter().map(Box::new).collect()))
    }

    /// Creates a disjunction of the given gates.
    ///
    /// # Errors
    ///
    /// Returns [`GateBuildError::EmptyComposite`] when `children` is empty.
    pub fn any(children: Vec<Self>) -> Result<Self, GateBuildError> {
        if children.is_empty() {
            return Err(GateBuildError::EmptyComposite {
                kind: "any",
            });
        }
        Ok(Self::Any(children.into_iter().map(Box::new).collect()))
    }

    /// Creates a negation of the given gate.
    #[must_use]
    pub fn negate(child: Self) -> Self {
        Self::Not(Box::new(child))
    }
}

// ============================================================================
// SECTION: Tree Analysis
// ============================================================================

impl Gate {
    /// Returns the nesting depth of this gate tree.
    ///
    /// Leaves have depth 1; composites add one level per layer.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Experiment {
                ..
            }
            | Self::Rollout {
                ..
            }
            | Self::RequestAttr {
                ..
            }
            | Self::Selector(_) => 1,
            Self::Not(child) => 1 + child.depth(),
            Self::All(children) | Self::Any(children) => {
                1 + children.iter().map(|child| child.depth()).max().unwrap_or(0)
            }
        }
    }

    /// Validates that the tree stays within [`MAX_GATE_DEPTH`].
    ///
    /// # Errors
    ///
    /// Returns [`GateBuildError::TooDeep`] when the depth limit is exceeded.
    pub fn validate_depth(&self) -> Result<(), GateBuildError> {
        let depth = self.depth();
        if depth > MAX_GATE_DEPTH {
            return Err(GateBuildError::TooDeep {
                depth,
            });
        }
        Ok(())
    }

    /// Returns a stable label for the gate kind.
    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::Experiment {
                ..
            } => "experiment",
            Self::Rollout {
                ..
            } => "rollout",
            Self::RequestAttr {
                ..
            } => "request_attr",
            Self::Selector(_) => "selector",
            Self::All(_) => "all",
            Self::Any(_) => "any",
            Self::Not(_) => "not",
        }
    }
}

impl std::ops::Not for Gate {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self::Not(Box::new(self))
    }
}
