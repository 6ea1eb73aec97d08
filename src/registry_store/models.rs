use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRecord {
    pub org_slug: String,
    pub ds_slug: String,
    /// Name of the dataset folder under the organization directory.
    pub internal_ref: Uuid,
}
