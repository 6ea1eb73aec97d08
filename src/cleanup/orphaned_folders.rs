use crate::registry_store::DatasetCatalog;
use crate::server::metrics;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrphanCleanupReport {
    pub found: usize,
    pub deleted: usize,
    pub failed: usize,
    pub org_folders_removed: usize,
}

/// Deletes dataset folders that no longer have a registry record.
pub struct OrphanedFolderCleanupService {
    catalog: Arc<dyn DatasetCatalog>,
    datasets_path: PathBuf,
}

fn is_directory_empty(path: &Path) -> Result<bool> {
    Ok(fs::read_dir(path)?.next().is_none())
}

fn child_directories(path: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(path).with_context(|| format!("Failed to list {:?}", path))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

impl OrphanedFolderCleanupService {
    pub fn new(catalog: Arc<dyn DatasetCatalog>, datasets_path: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            datasets_path: datasets_path.into(),
        }
    }

    pub fn cleanup_orphaned_folders(&self) -> Result<OrphanCleanupReport> {
        let mut report = OrphanCleanupReport::default();
        let root = &self.datasets_path;
        if root.as_os_str().is_empty() || !root.is_dir() {
            info!(
                "Datasets path {:?} does not exist, skipping orphaned folder cleanup",
                root
            );
            return Ok(report);
        }
        info!("Starting orphaned dataset folder cleanup in {:?}", root);

        let mut valid_refs: HashMap<String, HashSet<Uuid>> = HashMap::new();
        for ds in self.catalog.list_datasets()? {
            valid_refs
                .entry(ds.org_slug)
                .or_default()
                .insert(ds.internal_ref);
        }

        let no_refs = HashSet::new();
        for org_dir in child_directories(root)? {
            let Some(org_slug) = org_dir.file_name().map(|n| n.to_string_lossy().into_owned())
            else {
                continue;
            };
            let org_refs = valid_refs.get(&org_slug).unwrap_or(&no_refs);

            let dataset_dirs = match child_directories(&org_dir) {
                Ok(dirs) => dirs,
                Err(e) => {
                    warn!("Failed to list organization folder {:?}: {:#}", org_dir, e);
                    continue;
                }
            };
            for dataset_dir in dataset_dirs {
                let name = dataset_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let Ok(internal_ref) = Uuid::parse_str(&name) else {
                    debug!("Skipping non-UUID folder: {:?}", dataset_dir);
                    continue;
                };
                if org_refs.contains(&internal_ref) {
                    continue;
                }

                report.found += 1;
                info!("Found orphaned folder: {:?}", dataset_dir);
                match fs::remove_dir_all(&dataset_dir) {
                    Ok(()) => {
                        report.deleted += 1;
                        info!("Deleted orphaned folder: {:?}", dataset_dir);
                    }
                    Err(e) => {
                        report.failed += 1;
                        warn!("Failed to delete orphaned folder {:?}: {}", dataset_dir, e);
                    }
                }
            }

            if !valid_refs.contains_key(&org_slug) {
                match is_directory_empty(&org_dir) {
                    Ok(true) => match fs::remove_dir(&org_dir) {
                        Ok(()) => {
                            report.org_folders_removed += 1;
                            info!("Deleted empty organization folder: {:?}", org_dir);
                        }
                        Err(e) => warn!(
                            "Failed to delete empty organization folder {:?}: {}",
                            org_dir, e
                        ),
                    },
                    Ok(false) => {}
                    Err(e) => warn!("Failed to inspect organization folder {:?}: {}", org_dir, e),
                }
            }
        }

        metrics::record_orphaned_folders_deleted(report.deleted);
        info!(
            "Orphaned folder cleanup completed: {} found, {} deleted, {} failed",
            report.found, report.deleted, report.failed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry_store::DatasetRecord;
    use tempfile::TempDir;

    struct StaticCatalog(Vec<DatasetRecord>);

    impl DatasetCatalog for StaticCatalog {
        fn list_datasets(&self) -> Result<Vec<DatasetRecord>> {
            Ok(self.0.clone())
        }
    }

    fn record(org: &str, ds: &str, internal_ref: Uuid) -> DatasetRecord {
        DatasetRecord {
            org_slug: org.to_string(),
            ds_slug: ds.to_string(),
            internal_ref,
        }
    }

    #[test]
    fn test_missing_root_is_skipped() {
        let dir = TempDir::new().unwrap();
        let service = OrphanedFolderCleanupService::new(
            Arc::new(StaticCatalog(Vec::new())),
            dir.path().join("nope"),
        );
        assert_eq!(
            service.cleanup_orphaned_folders().unwrap(),
            OrphanCleanupReport::default()
        );

        let blank = OrphanedFolderCleanupService::new(Arc::new(StaticCatalog(Vec::new())), "");
        assert_eq!(
            blank.cleanup_orphaned_folders().unwrap(),
            OrphanCleanupReport::default()
        );
    }

    #[test]
    fn test_deletes_orphans_and_keeps_known_and_foreign_folders() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let kept = Uuid::new_v4();
        let orphan = Uuid::new_v4();
        let stray_org_orphan = Uuid::new_v4();

        fs::create_dir_all(root.join("acme").join(kept.to_string()).join(".ddb")).unwrap();
        fs::create_dir_all(root.join("acme").join(orphan.to_string())).unwrap();
        fs::write(root.join("acme").join(orphan.to_string()).join("a.tif"), b"x").unwrap();
        fs::create_dir_all(root.join("acme").join("not-a-guid")).unwrap();
        fs::create_dir_all(root.join("gone").join(stray_org_orphan.to_string())).unwrap();
        fs::create_dir_all(root.join("empty-org").join("not-a-guid")).unwrap();

        let service = OrphanedFolderCleanupService::new(
            Arc::new(StaticCatalog(vec![record("acme", "survey", kept)])),
            root,
        );
        let report = service.cleanup_orphaned_folders().unwrap();

        assert_eq!(
            report,
            OrphanCleanupReport {
                found: 2,
                deleted: 2,
                failed: 0,
                org_folders_removed: 1
            }
        );
        assert!(root.join("acme").join(kept.to_string()).exists());
        assert!(!root.join("acme").join(orphan.to_string()).exists());
        assert!(root.join("acme").join("not-a-guid").exists());
        assert!(!root.join("gone").exists());
        // Org without datasets keeps its non-UUID child
        assert!(root.join("empty-org").join("not-a-guid").exists());

        let again = service.cleanup_orphaned_folders().unwrap();
        assert_eq!(again, OrphanCleanupReport::default());
    }
}
