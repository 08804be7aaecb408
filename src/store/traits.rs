use crate::model::{BlogResult, Category, Id, Record};

/// The four blog operations plus `clear`, implemented once per storage backend.
///
/// Every operation validates its spec first, and fails with the full list of
/// structured errors; nothing is partially applied.
#[async_trait::async_trait]
pub trait BlogStore: Send + Sync {
    /// Create a record and return its id (generated when the spec has none)
    async fn create(&self, category: Category, spec: &Record) -> BlogResult<Id>;
    /// Matching records, newest first, windowed by `_index` / `_count`
    async fn find(&self, category: Category, spec: &Record) -> BlogResult<Vec<Record>>;
    /// Apply the mutable fields of `spec` to record `spec.id`
    async fn update(&self, category: Category, spec: &Record) -> BlogResult<()>;
    /// Remove record `spec.id` unless another record references it
    async fn remove(&self, category: Category, spec: &Record) -> BlogResult<()>;
    /// Remove all data of every category
    async fn clear(&self) -> BlogResult<()>;
}
