use super::models::DatasetRecord;
use super::schema::REGISTRY_VERSIONED_SCHEMAS;
use super::DatasetCatalog;
use crate::sqlite_persistence::{lock_conn, open_versioned_db};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

pub struct SqliteRegistryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRegistryStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), REGISTRY_VERSIONED_SCHEMAS, "registry")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Adds an organization. Adding an existing slug is a no-op.
    pub fn add_organization(&self, slug: &str) -> Result<()> {
        let conn = lock_conn(&self.conn)?;
        conn.execute(
            "INSERT OR IGNORE INTO organizations (slug, created_at) VALUES (?1, ?2)",
            params![slug, Utc::now().timestamp()],
        )
        .with_context(|| format!("Failed to add organization {}", slug))?;
        Ok(())
    }

    pub fn list_organizations(&self) -> Result<Vec<String>> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt = conn.prepare("SELECT slug FROM organizations ORDER BY slug")?;
        let slugs = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(slugs)
    }

    /// Registers a dataset under an existing organization and returns its
    /// folder reference.
    pub fn add_dataset(&self, org_slug: &str, ds_slug: &str) -> Result<Uuid> {
        let internal_ref = Uuid::new_v4();
        let conn = lock_conn(&self.conn)?;
        conn.execute(
            "INSERT INTO datasets (org_slug, slug, internal_ref, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![org_slug, ds_slug, internal_ref.to_string(), Utc::now().timestamp()],
        )
        .with_context(|| format!("Failed to add dataset {}/{}", org_slug, ds_slug))?;
        info!("Registered dataset {}/{} as {}", org_slug, ds_slug, internal_ref);
        Ok(internal_ref)
    }

    /// Removes a dataset record, returning its folder reference if it existed.
    pub fn remove_dataset(&self, org_slug: &str, ds_slug: &str) -> Result<Option<Uuid>> {
        let conn = lock_conn(&self.conn)?;
        let internal_ref: Option<String> = conn
            .query_row(
                "SELECT internal_ref FROM datasets WHERE org_slug = ?1 AND slug = ?2",
                params![org_slug, ds_slug],
                |row| row.get(0),
            )
            .optional()?;
        if internal_ref.is_some() {
            conn.execute(
                "DELETE FROM datasets WHERE org_slug = ?1 AND slug = ?2",
                params![org_slug, ds_slug],
            )?;
        }
        Ok(internal_ref.and_then(|r| Uuid::parse_str(&r).ok()))
    }
}

impl DatasetCatalog for SqliteRegistryStore {
    fn list_datasets(&self) -> Result<Vec<DatasetRecord>> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt =
            conn.prepare("SELECT org_slug, slug, internal_ref FROM datasets ORDER BY org_slug, slug")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut datasets = Vec::with_capacity(rows.len());
        for (org_slug, ds_slug, internal_ref) in rows {
            match Uuid::parse_str(&internal_ref) {
                Ok(internal_ref) => datasets.push(DatasetRecord {
                    org_slug,
                    ds_slug,
                    internal_ref,
                }),
                Err(_) => warn!(
                    "Dataset {}/{} has malformed internal ref '{}', skipping",
                    org_slug, ds_slug, internal_ref
                ),
            }
        }
        Ok(datasets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteRegistryStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteRegistryStore::new(temp_dir.path().join("registry.db")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_add_and_list_datasets() {
        let (store, _dir) = create_test_store();
        store.add_organization("acme").unwrap();
        store.add_organization("acme").unwrap();
        let survey = store.add_dataset("acme", "survey").unwrap();
        let roads = store.add_dataset("acme", "roads").unwrap();

        assert_eq!(store.list_organizations().unwrap(), vec!["acme".to_string()]);
        let datasets = store.list_datasets().unwrap();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].ds_slug, "roads");
        assert_eq!(datasets[0].internal_ref, roads);
        assert_eq!(datasets[1].internal_ref, survey);
    }

    #[test]
    fn test_dataset_requires_organization_and_unique_slug() {
        let (store, _dir) = create_test_store();
        assert!(store.add_dataset("ghost", "survey").is_err());

        store.add_organization("acme").unwrap();
        store.add_dataset("acme", "survey").unwrap();
        assert!(store.add_dataset("acme", "survey").is_err());
    }

    #[test]
    fn test_remove_dataset_returns_reference() {
        let (store, _dir) = create_test_store();
        store.add_organization("acme").unwrap();
        let survey = store.add_dataset("acme", "survey").unwrap();

        assert_eq!(store.remove_dataset("acme", "survey").unwrap(), Some(survey));
        assert_eq!(store.remove_dataset("acme", "survey").unwrap(), None);
        assert!(store.list_datasets().unwrap().is_empty());
    }
}
