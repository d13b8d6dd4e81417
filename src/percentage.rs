use std::cmp::Ordering;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::util::{now_epoch_secs, now_epoch_secs_f64};

const DEFAULT_RAMP_DURATION_SECS: i64 = 3600;

fn default_full() -> f64 {
    1.0
}

/// The fraction of evaluations a bucketer lets through, in `[0, 1]`.
///
/// Percentages compare directly against `f64`, so `percentage >= 0.5` reads the value resolved
/// at the time of the comparison.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Percentage {
    #[serde(rename = "Percentage")]
    Fixed(FixedPercentage),
    #[serde(rename = "LinearRampPercentage")]
    LinearRamp(LinearRampPercentage),
}

/// A constant fraction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixedPercentage {
    #[serde(default = "default_full")]
    pub value: f64,
}

/// A fraction that moves linearly from `initial_value` to `final_value` over `ramp_duration`
/// seconds, starting at `initial_time` (epoch seconds).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearRampPercentage {
    #[serde(default)]
    pub initial_value: f64,
    #[serde(default = "default_full")]
    pub final_value: f64,
    #[serde(default = "default_ramp_duration")]
    pub ramp_duration: i64,
    #[serde(default = "now_epoch_secs")]
    pub initial_time: i64,
}

fn default_ramp_duration() -> i64 {
    DEFAULT_RAMP_DURATION_SECS
}

impl FixedPercentage {
    pub const TYPE: &'static str = "Percentage";
}

impl Default for FixedPercentage {
    fn default() -> Self {
        FixedPercentage {
            value: default_full(),
        }
    }
}

impl LinearRampPercentage {
    pub const TYPE: &'static str = "LinearRampPercentage";

    /// A ramp from `initial_value` to `final_value` that starts now.
    pub fn new(initial_value: f64, final_value: f64, ramp_duration: i64) -> Self {
        LinearRampPercentage {
            initial_value,
            final_value,
            ramp_duration,
            initial_time: now_epoch_secs(),
        }
    }

    pub fn starting_at(mut self, initial_time: i64) -> Self {
        self.initial_time = initial_time;
        self
    }

    /// The ramp's value at `now` (epoch seconds). Clamped to `initial_value` before the ramp
    /// starts and to `final_value` once it has finished; a zero duration is already finished.
    pub fn value_at(&self, now: f64) -> f64 {
        if self.ramp_duration <= 0 {
            return self.final_value;
        }
        let duration = self.ramp_duration as f64;
        let elapsed = (now - self.initial_time as f64).clamp(0.0, duration);
        if elapsed >= duration {
            return self.final_value;
        }
        self.initial_value + (self.final_value - self.initial_value) * (elapsed / duration)
    }
}

impl Default for LinearRampPercentage {
    fn default() -> Self {
        LinearRampPercentage::new(0.0, default_full(), DEFAULT_RAMP_DURATION_SECS)
    }
}

impl Default for Percentage {
    fn default() -> Self {
        Percentage::Fixed(FixedPercentage::default())
    }
}

impl From<f64> for Percentage {
    fn from(value: f64) -> Self {
        Percentage::Fixed(FixedPercentage { value })
    }
}

impl From<LinearRampPercentage> for Percentage {
    fn from(ramp: LinearRampPercentage) -> Self {
        Percentage::LinearRamp(ramp)
    }
}

impl Percentage {
    /// The `type` tag this percentage serializes with.
    pub fn get_type(&self) -> &'static str {
        match self {
            Percentage::Fixed(_) => FixedPercentage::TYPE,
            Percentage::LinearRamp(_) => LinearRampPercentage::TYPE,
        }
    }

    /// The fraction in effect right now.
    pub fn value(&self) -> f64 {
        match self {
            Percentage::Fixed(fixed) => fixed.value,
            Percentage::LinearRamp(ramp) => ramp.value_at(now_epoch_secs_f64()),
        }
    }

    /// The fraction in effect at `now` (epoch seconds).
    pub fn value_at(&self, now: f64) -> f64 {
        match self {
            Percentage::Fixed(fixed) => fixed.value,
            Percentage::LinearRamp(ramp) => ramp.value_at(now),
        }
    }
}

impl PartialEq<f64> for Percentage {
    #[allow(clippy::float_cmp)]
    fn eq(&self, other: &f64) -> bool {
        self.value() == *other
    }
}

impl PartialOrd<f64> for Percentage {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.value().partial_cmp(other)
    }
}

impl<'de> Deserialize<'de> for Percentage {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = Value::deserialize(deserializer)?;
        PercentageFactory::create(fields).map_err(D::Error::custom)
    }
}

/// Resolves a serialized percentage's `type` tag to its variant.
pub struct PercentageFactory;

impl PercentageFactory {
    pub const TYPES: [&'static str; 2] = [FixedPercentage::TYPE, LinearRampPercentage::TYPE];

    /// Build a percentage from its serialized fields. An unknown or missing `type` fails with
    /// [Error::InvalidPercentageType].
    pub fn create(fields: Value) -> Result<Percentage> {
        let tag = fields
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match tag.as_str() {
            FixedPercentage::TYPE => Ok(Percentage::Fixed(serde_json::from_value(fields)?)),
            LinearRampPercentage::TYPE => {
                Ok(Percentage::LinearRamp(serde_json::from_value(fields)?))
            }
            _ => Err(Error::InvalidPercentageType(tag)),
        }
    }
}
