use log::debug;

use crate::error::{Error, Result};
use crate::events::{EventEmitter, FlagEvent};
use crate::flag::FeatureFlag;
use crate::item::{ClientData, FeatureFlagStoreItem, FeatureFlagStoreMeta, MetaUpdate};
use crate::store::FeatureFlagStore;
use crate::{Bucketer, Condition, Context};

/// FeatureFlagClient is the application-facing entry point: it evaluates flags against a context
/// and manages their lifecycle in the underlying store, emitting events around each write.
///
/// Every write to an existing flag first checks that the flag exists and fails with
/// [Error::FlagNotFound] otherwise.
pub struct FeatureFlagClient<S> {
    store: S,
    events: EventEmitter,
}

impl<S: FeatureFlagStore> FeatureFlagClient<S> {
    pub fn new(store: S) -> Self {
        FeatureFlagClient {
            store,
            events: EventEmitter::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn set_events(&mut self, events: EventEmitter) {
        self.events = events;
    }

    pub fn create(
        &self,
        feature_name: &str,
        is_enabled: bool,
        client_data: Option<ClientData>,
    ) -> Result<FeatureFlag<'_, S>> {
        self.events.emit(&FlagEvent::PreCreate {
            feature_name,
            is_enabled,
            client_data: client_data.as_ref(),
        })?;
        debug!("Creating feature flag {} (enabled: {})", feature_name, is_enabled);
        self.store
            .create(feature_name, is_enabled, client_data.clone())?;
        self.events.emit(&FlagEvent::PostCreate {
            feature_name,
            is_enabled,
            client_data: client_data.as_ref(),
        })?;
        Ok(self.get(feature_name))
    }

    /// Whether `feature_name` is on for `context`. A flag the store does not know evaluates to
    /// `default`.
    pub fn is_enabled(&self, feature_name: &str, default: bool, context: &Context) -> Result<bool> {
        match self.store.get(feature_name)? {
            Some(item) => item.is_enabled(context),
            None => {
                debug!(
                    "Feature flag {} not found, using default {}",
                    feature_name, default
                );
                Ok(default)
            }
        }
    }

    pub fn exists(&self, feature_name: &str) -> Result<bool> {
        Ok(self.store.get(feature_name)?.is_some())
    }

    /// A handle on `feature_name`. The flag need not exist.
    pub fn get(&self, feature_name: &str) -> FeatureFlag<'_, S> {
        FeatureFlag::new(feature_name, self)
    }

    /// Handles on stored flags in name order, skipping `offset` and returning at most `limit`.
    pub fn list(&self, limit: Option<usize>, offset: usize) -> Result<Vec<FeatureFlag<'_, S>>> {
        Ok(self
            .store
            .list(limit, offset)?
            .into_iter()
            .map(|item| FeatureFlag::new(item.feature_name, self))
            .collect())
    }

    pub fn enable(&self, feature_name: &str) -> Result<()> {
        self.must_exist(feature_name)?;
        self.events.emit(&FlagEvent::PreEnable { feature_name })?;
        debug!("Enabling feature flag {}", feature_name);
        self.store.set(feature_name, true)?;
        self.events.emit(&FlagEvent::PostEnable { feature_name })
    }

    pub fn disable(&self, feature_name: &str) -> Result<()> {
        self.must_exist(feature_name)?;
        self.events.emit(&FlagEvent::PreDisable { feature_name })?;
        debug!("Disabling feature flag {}", feature_name);
        self.store.set(feature_name, false)?;
        self.events.emit(&FlagEvent::PostDisable { feature_name })
    }

    pub fn destroy(&self, feature_name: &str) -> Result<()> {
        self.must_exist(feature_name)?;
        self.events.emit(&FlagEvent::PreDestroy { feature_name })?;
        debug!("Destroying feature flag {}", feature_name);
        self.store.delete(feature_name)?;
        self.events.emit(&FlagEvent::PostDestroy { feature_name })
    }

    /// Append `condition` to the flag's conditions.
    pub fn add_condition(&self, feature_name: &str, condition: Condition) -> Result<()> {
        let mut meta = self.must_exist(feature_name)?.meta;
        meta.conditions.push(condition.clone());

        self.events.emit(&FlagEvent::PreAddCondition {
            feature_name,
            condition: &condition,
        })?;
        self.store.set_meta(feature_name, meta)?;
        self.events.emit(&FlagEvent::PostAddCondition {
            feature_name,
            condition: &condition,
        })
    }

    /// Replace the flag's conditions wholesale.
    pub fn set_conditions(&self, feature_name: &str, conditions: Vec<Condition>) -> Result<()> {
        let mut meta = self.must_exist(feature_name)?.meta;
        meta.update(MetaUpdate::default().conditions(conditions.clone()));

        self.events.emit(&FlagEvent::PreSetConditions {
            feature_name,
            conditions: &conditions,
        })?;
        self.store.set_meta(feature_name, meta)?;
        self.events.emit(&FlagEvent::PostSetConditions {
            feature_name,
            conditions: &conditions,
        })
    }

    /// Merge `client_data` into the flag's client data, new keys winning.
    pub fn set_client_data(&self, feature_name: &str, client_data: ClientData) -> Result<()> {
        let mut meta = self.must_exist(feature_name)?.meta;
        meta.update(MetaUpdate::default().client_data(client_data));
        let merged = meta.client_data.clone();

        self.events.emit(&FlagEvent::PreSetClientData {
            feature_name,
            client_data: &merged,
        })?;
        self.store.set_meta(feature_name, meta)?;
        self.events.emit(&FlagEvent::PostSetClientData {
            feature_name,
            client_data: &merged,
        })
    }

    pub fn get_client_data(&self, feature_name: &str) -> Result<ClientData> {
        Ok(self.get_meta(feature_name)?.client_data)
    }

    pub fn get_meta(&self, feature_name: &str) -> Result<FeatureFlagStoreMeta> {
        Ok(self.must_exist(feature_name)?.meta)
    }

    pub fn set_bucketer(&self, feature_name: &str, bucketer: impl Into<Bucketer>) -> Result<()> {
        let bucketer = bucketer.into();
        let mut meta = self.must_exist(feature_name)?.meta;
        meta.update(MetaUpdate::default().bucketer(bucketer.clone()));

        self.events.emit(&FlagEvent::PreSetBucketer {
            feature_name,
            bucketer: &bucketer,
        })?;
        self.store.set_meta(feature_name, meta)?;
        self.events.emit(&FlagEvent::PostSetBucketer {
            feature_name,
            bucketer: &bucketer,
        })
    }

    fn must_exist(&self, feature_name: &str) -> Result<FeatureFlagStoreItem> {
        self.store
            .get(feature_name)?
            .ok_or_else(|| Error::FlagNotFound(feature_name.to_string()))
    }
}
