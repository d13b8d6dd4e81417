use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::item::{ClientData, FeatureFlagStoreItem, FeatureFlagStoreMeta};
use crate::store::FeatureFlagStore;
use crate::util::now_epoch_secs;

/// An in-process store. Flags live in a name-ordered map, so listing is already sorted.
#[derive(Debug, Default)]
pub struct MemoryFeatureFlagStore {
    memory: RwLock<BTreeMap<String, FeatureFlagStoreItem>>,
}

impl MemoryFeatureFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn save(&self, item: FeatureFlagStoreItem) -> FeatureFlagStoreItem {
        self.memory
            .write()
            .insert(item.feature_name.clone(), item.clone());
        item
    }
}

impl FeatureFlagStore for MemoryFeatureFlagStore {
    fn create(
        &self,
        feature_name: &str,
        is_enabled: bool,
        client_data: Option<ClientData>,
    ) -> Result<FeatureFlagStoreItem> {
        let item = FeatureFlagStoreItem::new(
            feature_name,
            is_enabled,
            FeatureFlagStoreMeta::new(now_epoch_secs(), client_data),
        );
        Ok(self.save(item))
    }

    fn get(&self, feature_name: &str) -> Result<Option<FeatureFlagStoreItem>> {
        Ok(self.memory.read().get(feature_name).cloned())
    }

    // Setting a flag that does not exist creates it.
    fn set(&self, feature_name: &str, is_enabled: bool) -> Result<()> {
        let mut memory = self.memory.write();
        match memory.get(feature_name) {
            Some(existing) => {
                let item = FeatureFlagStoreItem::new(feature_name, is_enabled, existing.meta.clone());
                memory.insert(feature_name.to_string(), item);
            }
            None => {
                let item = FeatureFlagStoreItem::new(
                    feature_name,
                    is_enabled,
                    FeatureFlagStoreMeta::new(now_epoch_secs(), None),
                );
                memory.insert(feature_name.to_string(), item);
            }
        }
        Ok(())
    }

    fn delete(&self, feature_name: &str) -> Result<()> {
        self.memory.write().remove(feature_name);
        Ok(())
    }

    fn list(&self, limit: Option<usize>, offset: usize) -> Result<Vec<FeatureFlagStoreItem>> {
        Ok(self
            .memory
            .read()
            .values()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn set_meta(&self, feature_name: &str, meta: FeatureFlagStoreMeta) -> Result<()> {
        let mut memory = self.memory.write();
        let is_enabled = memory
            .get(feature_name)
            .map(FeatureFlagStoreItem::raw_is_enabled)
            .ok_or_else(|| Error::FlagNotFound(feature_name.to_string()))?;
        memory.insert(
            feature_name.to_string(),
            FeatureFlagStoreItem::new(feature_name, is_enabled, meta),
        );
        Ok(())
    }
}
