use super::{Ddb, DdbManager, Stamp};
use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;

/// Metadata folder inside every dataset, excluded from the stamp.
pub const DDB_FOLDER: &str = ".ddb";
/// Marker files dropped here flag the dataset as needing a build.
pub const PENDING_FOLDER: &str = "pending";

/// Dataset folders laid out as `{root}/{org_slug}/{internal_ref}`.
pub struct FsDdbManager {
    root: PathBuf,
}

impl FsDdbManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dataset_path(&self, org_slug: &str, internal_ref: Uuid) -> PathBuf {
        self.root.join(org_slug).join(internal_ref.to_string())
    }

    /// Create the folder (and metadata folder) of a dataset.
    pub fn create(&self, org_slug: &str, internal_ref: Uuid) -> Result<FsDdb> {
        let path = self.dataset_path(org_slug, internal_ref);
        fs::create_dir_all(path.join(DDB_FOLDER))
            .with_context(|| format!("Failed to create dataset folder {:?}", path))?;
        Ok(FsDdb::new(path))
    }
}

impl DdbManager for FsDdbManager {
    fn get(&self, org_slug: &str, internal_ref: Uuid) -> Result<Arc<dyn Ddb>> {
        let path = self.dataset_path(org_slug, internal_ref);
        if !path.is_dir() {
            bail!("Dataset folder {:?} does not exist", path);
        }
        Ok(Arc::new(FsDdb::new(path)))
    }

    fn delete(&self, org_slug: &str, internal_ref: Uuid) -> Result<()> {
        let path = self.dataset_path(org_slug, internal_ref);
        if !path.exists() {
            debug!("Dataset folder {:?} already gone", path);
            return Ok(());
        }
        fs::remove_dir_all(&path)
            .with_context(|| format!("Failed to delete dataset folder {:?}", path))?;
        info!("Deleted dataset folder {:?}", path);
        Ok(())
    }
}

pub struct FsDdb {
    path: PathBuf,
}

impl FsDdb {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn pending_dir(&self) -> PathBuf {
        self.path.join(DDB_FOLDER).join(PENDING_FOLDER)
    }

    /// Drop a marker flagging `name` as waiting for a build.
    pub fn mark_pending(&self, name: &str) -> Result<()> {
        let dir = self.pending_dir();
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(name), b"")
            .with_context(|| format!("Failed to write pending marker {}", name))?;
        Ok(())
    }

    fn pending_markers(&self) -> Result<Vec<PathBuf>> {
        let dir = self.pending_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut markers = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("Failed to read {:?}", dir))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                markers.push(entry.path());
            }
        }
        Ok(markers)
    }
}

impl Ddb for FsDdb {
    fn is_build_pending(&self) -> Result<bool> {
        if !self.path.is_dir() {
            bail!("Dataset folder {:?} does not exist", self.path);
        }
        Ok(!self.pending_markers()?.is_empty())
    }

    fn get_stamp(&self) -> Result<Stamp> {
        if !self.path.is_dir() {
            bail!("Dataset folder {:?} does not exist", self.path);
        }

        let mut hasher = Sha256::new();
        let walker = WalkDir::new(&self.path)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter()
            .filter_entry(|e| !(e.depth() == 1 && e.file_name() == DDB_FOLDER));
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.path)
                .context("Failed to relativize dataset entry")?;
            let metadata = entry.metadata()?;
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .unwrap_or_default();

            hasher.update(rel.to_string_lossy().as_bytes());
            hasher.update([0u8]);
            hasher.update(metadata.len().to_le_bytes());
            hasher.update(mtime.as_nanos().to_le_bytes());
        }

        Ok(Stamp {
            checksum: format!("sha256:{:x}", hasher.finalize()),
        })
    }

    fn build_pending(&self) -> Result<()> {
        let markers = self.pending_markers()?;
        for marker in &markers {
            fs::remove_file(marker)
                .with_context(|| format!("Failed to consume pending marker {:?}", marker))?;
        }
        info!("Built {} pending entries in {:?}", markers.len(), self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (FsDdbManager, Uuid, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let manager = FsDdbManager::new(temp_dir.path());
        let internal_ref = Uuid::new_v4();
        manager.create("acme", internal_ref).unwrap();
        (manager, internal_ref, temp_dir)
    }

    #[test]
    fn test_get_missing_dataset_fails() {
        let (manager, _, _dir) = setup();
        assert!(manager.get("acme", Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_pending_markers_are_consumed_by_build() {
        let (manager, internal_ref, _dir) = setup();
        let ddb = manager.create("acme", internal_ref).unwrap();
        let handle = manager.get("acme", internal_ref).unwrap();

        assert!(!handle.is_build_pending().unwrap());
        ddb.mark_pending("images-a.tif").unwrap();
        assert!(handle.is_build_pending().unwrap());

        handle.build_pending().unwrap();
        assert!(!handle.is_build_pending().unwrap());
    }

    #[test]
    fn test_stamp_ignores_metadata_folder() {
        let (manager, internal_ref, _dir) = setup();
        let ddb = manager.create("acme", internal_ref).unwrap();
        fs::write(ddb.path().join("a.txt"), b"hello").unwrap();

        let before = ddb.get_stamp().unwrap();
        ddb.mark_pending("a.txt").unwrap();
        assert_eq!(ddb.get_stamp().unwrap(), before);

        fs::write(ddb.path().join("b.txt"), b"world").unwrap();
        let after = ddb.get_stamp().unwrap();
        assert_ne!(after, before);
        assert!(after.checksum.starts_with("sha256:"));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (manager, internal_ref, _dir) = setup();
        manager.delete("acme", internal_ref).unwrap();
        assert!(!manager.dataset_path("acme", internal_ref).exists());
        manager.delete("acme", internal_ref).unwrap();
    }
}
