use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};

const ORGANIZATIONS_TABLE_V1: Table = Table {
    name: "organizations",
    columns: &[
        sqlite_column!("slug", &SqlType::Text, is_primary_key = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

const ORGANIZATION_FK: ForeignKey = ForeignKey {
    foreign_table: "organizations",
    foreign_column: "slug",
    on_delete: ForeignKeyOnChange::Cascade,
};

const DATASETS_TABLE_V1: Table = Table {
    name: "datasets",
    columns: &[
        sqlite_column!(
            "org_slug",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ORGANIZATION_FK)
        ),
        sqlite_column!("slug", &SqlType::Text, non_null = true),
        sqlite_column!("internal_ref", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_datasets_internal_ref", "internal_ref")],
    unique_constraints: &[&["org_slug", "slug"]],
};

pub const REGISTRY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[ORGANIZATIONS_TABLE_V1, DATASETS_TABLE_V1],
    migration: None,
}];
