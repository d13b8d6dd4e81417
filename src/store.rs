use std::sync::Arc;

use crate::error::Result;
use crate::item::{ClientData, FeatureFlagStoreItem, FeatureFlagStoreMeta};

/// FeatureFlagStore is the contract every flag backend implements, and the one the caching layer
/// both consumes and provides.
///
/// Stores are shared between threads and take `&self`; implementations synchronize internally.
pub trait FeatureFlagStore: Send + Sync {
    /// Create (or overwrite) the flag `feature_name` with fresh metadata.
    fn create(
        &self,
        feature_name: &str,
        is_enabled: bool,
        client_data: Option<ClientData>,
    ) -> Result<FeatureFlagStoreItem>;

    /// Retrieve the flag `feature_name`, or None if the store has no such flag.
    fn get(&self, feature_name: &str) -> Result<Option<FeatureFlagStoreItem>>;

    /// Switch the flag on or off, keeping its metadata.
    fn set(&self, feature_name: &str, is_enabled: bool) -> Result<()>;

    /// Remove the flag. Removing a missing flag is not an error.
    fn delete(&self, feature_name: &str) -> Result<()>;

    /// Flags sorted by name, skipping `offset` and returning at most `limit`.
    fn list(&self, limit: Option<usize>, offset: usize) -> Result<Vec<FeatureFlagStoreItem>>;

    /// Replace the flag's metadata. Fails with [crate::Error::FlagNotFound] for a missing flag.
    fn set_meta(&self, feature_name: &str, meta: FeatureFlagStoreMeta) -> Result<()>;
}

impl<S: FeatureFlagStore + ?Sized> FeatureFlagStore for Arc<S> {
    fn create(
        &self,
        feature_name: &str,
        is_enabled: bool,
        client_data: Option<ClientData>,
    ) -> Result<FeatureFlagStoreItem> {
        (**self).create(feature_name, is_enabled, client_data)
    }

    fn get(&self, feature_name: &str) -> Result<Option<FeatureFlagStoreItem>> {
        (**self).get(feature_name)
    }

    fn set(&self, feature_name: &str, is_enabled: bool) -> Result<()> {
        (**self).set(feature_name, is_enabled)
    }

    fn delete(&self, feature_name: &str) -> Result<()> {
        (**self).delete(feature_name)
    }

    fn list(&self, limit: Option<usize>, offset: usize) -> Result<Vec<FeatureFlagStoreItem>> {
        (**self).list(limit, offset)
    }

    fn set_meta(&self, feature_name: &str, meta: FeatureFlagStoreMeta) -> Result<()> {
        (**self).set_meta(feature_name, meta)
    }
}
