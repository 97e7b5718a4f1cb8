// rorchestrator-store/src/store.rs
// ============================================================================
// Module: LKG Snapshot Store
// Description: JSON file persistence for the last-known-good snapshot.
// Purpose: Load and atomically save config snapshots between deployments.
// Dependencies: rorchestrator-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The last-known-good store keeps one [`ConfigSnapshot`] as a JSON file
//! with the stable field layout `{config_version, patch_json, meta}`. Saves
//! write to a temp file in the destination directory and rename it into
//! place, so a crash mid-write leaves the previous snapshot intact. Loads
//! distinguish a missing file from an unreadable or invalid one.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use rorchestrator_core::ConfigSnapshot;
use rorchestrator_core::SnapshotError;
use rorchestrator_core::SnapshotProvider;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the LKG store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No snapshot file exists at the configured path.
    #[error("no snapshot at {0}")]
    Missing(PathBuf),
    /// The snapshot file could not be read or written.
    #[error("snapshot io failure at {path}: {source}")]
    Io {
        /// Path involved in the failing operation.
        path: PathBuf,
        /// Underlying io error.
        #[source]
        source: std::io::Error,
    },
    /// The snapshot file holds invalid JSON or an unexpected layout.
    #[error("snapshot file invalid at {path}: {message}")]
    Invalid {
        /// Path of the invalid file.
        path: PathBuf,
        /// Parse failure description.
        message: String,
    },
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// File-backed last-known-good snapshot store.
///
/// # Invariants
/// - The temp file lives in the destination directory so the final rename
///   stays on one filesystem.
#[derive(Debug, Clone)]
pub struct LkgSnapshotStore {
    /// Path of the snapshot file.
    path: PathBuf,
}

impl LkgSnapshotStore {
    /// Creates a store over the given snapshot file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    /// Returns the snapshot file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Missing`] when no file exists,
    /// [`StoreError::Io`] on read failures, and [`StoreError::Invalid`] when
    /// the file does not hold a snapshot document.
    pub fn load(&self) -> Result<ConfigSnapshot, StoreError> {
        let body = match fs::read_to_string(&self.path) {
            Ok(body) => body,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::Missing(self.path.clone()));
            }
            Err(err) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source: err,
                });
            }
        };
        serde_json::from_str(&body).map_err(|err| StoreError::Invalid {
            path: self.path.clone(),
            message: err.to_string(),
        })
    }

    /// Atomically saves a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the temp write or the rename fails,
    /// and [`StoreError::Invalid`] when the snapshot cannot be serialized.
    pub fn save(&self, snapshot: &ConfigSnapshot) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(snapshot).map_err(|err| StoreError::Invalid {
            path: self.path.clone(),
            message: err.to_string(),
        })?;
        let temp_path = self.temp_path();
        fs::write(&temp_path, &body).map_err(|err| StoreError::Io {
            path: temp_path.clone(),
            source: err,
        })?;
        fs::rename(&temp_path, &self.path).map_err(|err| StoreError::Io {
            path: self.path.clone(),
            source: err,
        })
    }

    /// Returns the sibling temp path used for atomic writes.
    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map_or_else(
            || std::ffi::OsString::from("snapshot"),
            std::ffi::OsStr::to_os_string,
        );
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

// ============================================================================
// SECTION: Provider Adapter
// ============================================================================

/// Snapshot provider serving the stored last-known-good snapshot.
#[derive(Debug, Clone)]
pub struct LkgSnapshotProvider {
    /// Underlying file store.
    store: LkgSnapshotStore,
}

impl LkgSnapshotProvider {
    /// Creates a provider over a store.
    #[must_use]
    pub const fn new(store: LkgSnapshotStore) -> Self {
        Self {
            store,
        }
    }
}

#[async_trait]
impl SnapshotProvider for LkgSnapshotProvider {
    async fn fetch(&self) -> Result<ConfigSnapshot, SnapshotError> {
        self.store.load().map_err(|err| SnapshotError::Unavailable(err.to_string()))
    }
}
