//! Organizations and datasets known to the registry.

mod models;
mod schema;
mod sqlite_registry_store;

pub use models::*;
pub use schema::REGISTRY_VERSIONED_SCHEMAS;
pub use sqlite_registry_store::SqliteRegistryStore;

use anyhow::Result;

/// Read access to the dataset records the reconcilers compare against.
pub trait DatasetCatalog: Send + Sync {
    fn list_datasets(&self) -> Result<Vec<DatasetRecord>>;
}
