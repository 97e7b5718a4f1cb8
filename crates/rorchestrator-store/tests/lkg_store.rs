// rorchestrator-store/tests/lkg_store.rs
// ============================================================================
// Module: LKG Store Tests
// Description: Tests for snapshot persistence and the provider adapter.
// ============================================================================
//! ## Overview
//! Validates the snapshot file layout, atomic save behavior, load error
//! distinctions, and the snapshot-provider adapter.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use rorchestrator_core::ConfigSnapshot;
use rorchestrator_core::SnapshotMeta;
use rorchestrator_core::SnapshotProvider;
use rorchestrator_store::LkgSnapshotProvider;
use rorchestrator_store::LkgSnapshotStore;
use rorchestrator_store::StoreError;

/// Builds a snapshot fixture.
fn snapshot() -> ConfigSnapshot {
    ConfigSnapshot::new(
        42,
        r#"{"schemaVersion":"v1","flows":{}}"#,
        SnapshotMeta {
            source: "deploy-pipeline".to_string(),
            timestamp_utc: "2026-07-30T12:00:00Z".to_string(),
            overlays: vec!["region-eu".to_string()],
        },
    )
}

/// Tests the save/load round trip and the stable field layout.
#[test]
fn test_save_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = LkgSnapshotStore::new(dir.path().join("lkg.json"));

    store.save(&snapshot()).unwrap();
    let loaded = store.load().unwrap();
    assert_eq!(loaded, snapshot());

    // Field names are a stable wire contract.
    let body = std::fs::read_to_string(store.path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["config_version"], 42);
    assert!(value["patch_json"].is_string());
    assert_eq!(value["meta"]["source"], "deploy-pipeline");
    assert_eq!(value["meta"]["timestamp_utc"], "2026-07-30T12:00:00Z");
    assert_eq!(value["meta"]["overlays"][0], "region-eu");
}

/// Tests that saving over an existing snapshot replaces it atomically.
#[test]
fn test_save_replaces_existing() {
    let dir = tempfile::tempdir().unwrap();
    let store = LkgSnapshotStore::new(dir.path().join("lkg.json"));

    store.save(&snapshot()).unwrap();
    let mut updated = snapshot();
    updated.config_version = 43;
    store.save(&updated).unwrap();

    assert_eq!(store.load().unwrap().config_version, 43);
    // No temp file is left behind after a successful save.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("lkg.json")]);
}

/// Tests load error distinctions.
#[test]
fn test_load_errors() {
    let dir = tempfile::tempdir().unwrap();
    let store = LkgSnapshotStore::new(dir.path().join("lkg.json"));

    assert!(matches!(store.load().unwrap_err(), StoreError::Missing(_)));

    std::fs::write(store.path(), "{not json").unwrap();
    assert!(matches!(
        store.load().unwrap_err(),
        StoreError::Invalid {
            ..
        }
    ));
}

/// Tests the snapshot-provider adapter over the store.
#[tokio::test]
async fn test_provider_adapter() {
    let dir = tempfile::tempdir().unwrap();
    let store = LkgSnapshotStore::new(dir.path().join("lkg.json"));
    store.save(&snapshot()).unwrap();

    let provider = LkgSnapshotProvider::new(store.clone());
    let fetched = provider.fetch().await.unwrap();
    assert_eq!(fetched, snapshot());

    std::fs::remove_file(store.path()).unwrap();
    assert!(provider.fetch().await.is_err());
}
