use crate::{errors::StoreError, record::ValidatedRecord};
use async_trait::async_trait;
use dyn_clone::DynClone;
use std::fmt::Debug;

/// Selects which asset identities `list_identities` returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityFilter {
    /// Every stored document.
    All,
    /// Documents that already hold every one of these feature fields.
    HasFields(Vec<String>),
}

/// A trait for the document store that receives extracted features.
///
/// Documents are keyed by asset identity. Writes merge into the existing
/// document so that several tasks can enrich the same asset.
#[async_trait]
pub trait FeatureStore: Send + Sync + DynClone + Debug {
    /// Returns the name of the store (e.g., "SQLite").
    fn name(&self) -> &str;

    /// Writes the record's fields onto the asset's document, creating it if
    /// needed. Returns whether a document for the asset already existed.
    async fn upsert(&self, asset_id: &str, record: &ValidatedRecord) -> Result<bool, StoreError>;

    /// Lists asset identities whose documents match `filter`.
    async fn list_identities(&self, filter: &IdentityFilter) -> Result<Vec<String>, StoreError>;
}

dyn_clone::clone_trait_object!(FeatureStore);
