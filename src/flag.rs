use std::fmt;

use crate::client::FeatureFlagClient;
use crate::error::Result;
use crate::item::{ClientData, FeatureFlagStoreMeta};
use crate::store::FeatureFlagStore;
use crate::{Bucketer, Condition, Context};

/// FeatureFlag is a handle on one named flag. It holds no flag state of its own; every call goes
/// through the client to the store.
pub struct FeatureFlag<'a, S> {
    name: String,
    client: &'a FeatureFlagClient<S>,
}

impl<'a, S> fmt::Debug for FeatureFlag<'a, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureFlag").field("name", &self.name).finish()
    }
}

impl<'a, S: FeatureFlagStore> FeatureFlag<'a, S> {
    pub(crate) fn new(name: impl Into<String>, client: &'a FeatureFlagClient<S>) -> Self {
        FeatureFlag {
            name: name.into(),
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// See [FeatureFlagClient::is_enabled].
    pub fn is_enabled(&self, default: bool, context: &Context) -> Result<bool> {
        self.client.is_enabled(&self.name, default, context)
    }

    pub fn exists(&self) -> Result<bool> {
        self.client.exists(&self.name)
    }

    pub fn enable(&self) -> Result<()> {
        self.client.enable(&self.name)
    }

    pub fn disable(&self) -> Result<()> {
        self.client.disable(&self.name)
    }

    pub fn destroy(&self) -> Result<()> {
        self.client.destroy(&self.name)
    }

    pub fn add_condition(&self, condition: Condition) -> Result<()> {
        self.client.add_condition(&self.name, condition)
    }

    pub fn set_conditions(&self, conditions: Vec<Condition>) -> Result<()> {
        self.client.set_conditions(&self.name, conditions)
    }

    pub fn set_client_data(&self, client_data: ClientData) -> Result<()> {
        self.client.set_client_data(&self.name, client_data)
    }

    pub fn get_client_data(&self) -> Result<ClientData> {
        self.client.get_client_data(&self.name)
    }

    pub fn get_meta(&self) -> Result<FeatureFlagStoreMeta> {
        self.client.get_meta(&self.name)
    }

    pub fn set_bucketer(&self, bucketer: impl Into<Bucketer>) -> Result<()> {
        self.client.set_bucketer(&self.name, bucketer)
    }
}
