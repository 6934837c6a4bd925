//! Persistence layer.
//!
//! Saves and loads the baseline snapshot and item catalog as JSON files.
//! Saves go through a temp file and an atomic rename, so a run that dies
//! mid-write leaves the prior snapshot intact — the commit is
//! all-or-nothing and is the last step of a run.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::baseline::BaselineStore;
use crate::catalog::ItemCatalog;
use crate::types::SnipeError;

/// Load the baseline snapshot.
///
/// A missing file is a fresh start (first run) and returns `None`. An
/// unreadable or unparseable file is `BaselineCorruption` — starting
/// from empty history silently would reset all deviation detection, so
/// that case is fatal and needs operator intervention.
pub fn load_baselines(path: &str) -> Result<Option<BaselineStore>> {
    if !Path::new(path).exists() {
        info!(path, "No baseline snapshot found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path).map_err(|e| SnipeError::BaselineCorruption {
        path: path.to_string(),
        message: e.to_string(),
    })?;

    let store: BaselineStore =
        serde_json::from_str(&json).map_err(|e| SnipeError::BaselineCorruption {
            path: path.to_string(),
            message: e.to_string(),
        })?;

    info!(path, items = store.len(), "Baseline snapshot loaded");
    Ok(Some(store))
}

/// Commit the baseline snapshot. Called exactly once per run, after
/// scanning completes and alerts are handed off.
pub fn save_baselines(store: &BaselineStore, path: &str) -> Result<()> {
    let json =
        serde_json::to_string_pretty(store).context("Failed to serialise baseline snapshot")?;
    write_atomic(path, &json)?;
    debug!(path, items = store.len(), "Baseline snapshot committed");
    Ok(())
}

/// Load the item catalog.
///
/// Unlike baselines, the catalog is re-fetchable reference data: a
/// corrupt file is logged and replaced by an empty catalog that the
/// next sync repopulates.
pub fn load_catalog(path: &str) -> ItemCatalog {
    if !Path::new(path).exists() {
        info!(path, "No item catalog found, starting empty");
        return ItemCatalog::new();
    }

    match std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|json| serde_json::from_str(&json).map_err(anyhow::Error::from))
    {
        Ok(catalog) => {
            let catalog: ItemCatalog = catalog;
            info!(path, items = catalog.len(), "Item catalog loaded");
            catalog
        }
        Err(e) => {
            warn!(path, error = %e, "Item catalog unreadable, rebuilding from scratch");
            ItemCatalog::new()
        }
    }
}

/// Save the item catalog alongside the baseline commit.
pub fn save_catalog(catalog: &ItemCatalog, path: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(catalog).context("Failed to serialise item catalog")?;
    write_atomic(path, &json)?;
    debug!(path, items = catalog.len(), "Item catalog saved");
    Ok(())
}

/// Write via temp file + rename so a partial write is never visible.
fn write_atomic(path: &str, contents: &str) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SnipeError::Storage(format!("Failed to create {parent:?}: {e}")))?;
        }
    }
    let tmp = format!("{path}.tmp");
    std::fs::write(&tmp, contents)
        .map_err(|e| SnipeError::Storage(format!("Failed to write {tmp}: {e}")))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| SnipeError::Storage(format!("Failed to commit {path}: {e}")))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Item, PriceBaseline};
    use chrono::Utc;

    fn temp_path(prefix: &str) -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("snipewatch_{prefix}_{}.json", uuid::Uuid::new_v4()));
        p.to_string_lossy().to_string()
    }

    fn store_with_entry() -> BaselineStore {
        let mut store = BaselineStore::new();
        store.insert(
            100,
            PriceBaseline {
                average_unit_price: 1234.5,
                sample_count: 42,
                last_updated: Utc::now(),
            },
        );
        store
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = temp_path("baselines");
        let store = store_with_entry();
        save_baselines(&store, &path).unwrap();

        let loaded = load_baselines(&path).unwrap().unwrap();
        assert_eq!(loaded.get(100), store.get(100));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_idle_round_trip_identical_content() {
        // Load → save with no changes → identical file content.
        let path = temp_path("baselines_idle");
        save_baselines(&store_with_entry(), &path).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();

        let loaded = load_baselines(&path).unwrap().unwrap();
        save_baselines(&loaded, &path).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();

        assert_eq!(first, second);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_is_fresh_start() {
        let loaded = load_baselines("/tmp/snipewatch_nonexistent_baselines.json").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_corrupt_baselines_fatal() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_baselines(&path).unwrap_err();
        assert!(err.to_string().contains("Baseline snapshot corrupt"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let path = temp_path("tmpcheck");
        save_baselines(&store_with_entry(), &path).unwrap();
        assert!(!Path::new(&format!("{path}.tmp")).exists());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_catalog_round_trip() {
        let path = temp_path("catalog");
        let mut catalog = ItemCatalog::new();
        catalog.insert(Item::sample(100));
        save_catalog(&catalog, &path).unwrap();

        let loaded = load_catalog(&path);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(100).unwrap().name, "Test Item 100");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_corrupt_catalog_rebuilds_empty() {
        let path = temp_path("catalog_corrupt");
        std::fs::write(&path, "][").unwrap();
        let loaded = load_catalog(&path);
        assert!(loaded.is_empty());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = std::env::temp_dir().join(format!("snipewatch_dir_{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested/baselines.json");
        save_baselines(&store_with_entry(), &path.to_string_lossy()).unwrap();
        assert!(path.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
