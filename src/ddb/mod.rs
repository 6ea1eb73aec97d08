//! Access to on-disk dataset folders.

mod fs_ddb;

pub use fs_ddb::{FsDdb, FsDdbManager, DDB_FOLDER, PENDING_FOLDER};

use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

/// Content fingerprint of a dataset folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub checksum: String,
}

/// Handle to one dataset folder.
pub trait Ddb: Send + Sync {
    /// Whether files are waiting for a build.
    fn is_build_pending(&self) -> Result<bool>;

    fn get_stamp(&self) -> Result<Stamp>;

    /// Run the build over pending files.
    fn build_pending(&self) -> Result<()>;
}

pub trait DdbManager: Send + Sync {
    fn get(&self, org_slug: &str, internal_ref: Uuid) -> Result<Arc<dyn Ddb>>;

    /// Remove the dataset folder. Missing folders are not an error.
    fn delete(&self, org_slug: &str, internal_ref: Uuid) -> Result<()>;
}
