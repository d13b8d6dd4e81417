use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::{Bucketer, Condition, Context};

/// Free-form data attached to a flag by the application.
pub type ClientData = Map<String, Value>;

/// Everything about a flag beyond its on/off switch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlagStoreMeta {
    /// Creation time in epoch seconds.
    pub created_date: i64,
    #[serde(default)]
    pub client_data: ClientData,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucketer: Option<Bucketer>,
}

/// A partial change to [FeatureFlagStoreMeta]. Fields left as None are kept.
#[derive(Clone, Debug, Default)]
pub struct MetaUpdate {
    pub created_date: Option<i64>,
    pub client_data: Option<ClientData>,
    pub conditions: Option<Vec<Condition>>,
    pub bucketer: Option<Bucketer>,
}

impl MetaUpdate {
    pub fn created_date(mut self, created_date: i64) -> Self {
        self.created_date = Some(created_date);
        self
    }

    pub fn client_data(mut self, client_data: ClientData) -> Self {
        self.client_data = Some(client_data);
        self
    }

    pub fn conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn bucketer(mut self, bucketer: impl Into<Bucketer>) -> Self {
        self.bucketer = Some(bucketer.into());
        self
    }
}

impl FeatureFlagStoreMeta {
    pub fn new(created_date: i64, client_data: Option<ClientData>) -> Self {
        FeatureFlagStoreMeta {
            created_date,
            client_data: client_data.unwrap_or_default(),
            conditions: Vec::new(),
            bucketer: None,
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_bucketer(mut self, bucketer: impl Into<Bucketer>) -> Self {
        self.bucketer = Some(bucketer.into());
        self
    }

    /// Apply `update`. Client data is merged key by key with new keys winning; everything else is
    /// replaced outright.
    pub fn update(&mut self, update: MetaUpdate) {
        if let Some(created_date) = update.created_date {
            self.created_date = created_date;
        }
        if let Some(client_data) = update.client_data {
            for (k, v) in client_data {
                self.client_data.insert(k, v);
            }
        }
        if let Some(conditions) = update.conditions {
            self.conditions = conditions;
        }
        if let Some(bucketer) = update.bucketer {
            self.bucketer = Some(bucketer);
        }
    }
}

/// A flag as a store holds it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlagStoreItem {
    pub feature_name: String,
    #[serde(rename = "is_enabled")]
    raw_is_enabled: bool,
    pub meta: FeatureFlagStoreMeta,
}

impl FeatureFlagStoreItem {
    pub fn new(
        feature_name: impl Into<String>,
        is_enabled: bool,
        meta: FeatureFlagStoreMeta,
    ) -> Self {
        FeatureFlagStoreItem {
            feature_name: feature_name.into(),
            raw_is_enabled: is_enabled,
            meta,
        }
    }

    /// The on/off switch alone, ignoring conditions and bucketing.
    pub fn raw_is_enabled(&self) -> bool {
        self.raw_is_enabled
    }

    /// Whether the flag is on for `context`: the switch is on, every condition holds, and the
    /// bucketer (if any) lets the context through. Conditions and bucketer are not consulted for
    /// a flag that is switched off.
    pub fn is_enabled(&self, context: &Context) -> Result<bool> {
        if !self.raw_is_enabled {
            return Ok(false);
        }
        if !Condition::check_all(&self.meta.conditions, context)? {
            return Ok(false);
        }
        Ok(self
            .meta
            .bucketer
            .as_ref()
            .map(|bucketer| bucketer.check(context))
            .unwrap_or(true))
    }

    /// Compact JSON bytes, the form backends persist.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
