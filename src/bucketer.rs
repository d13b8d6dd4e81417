use std::collections::BTreeMap;

use log::warn;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::{AttributeValue, Context, Percentage};

const BUCKET_SCALE_INT: i64 = 0x0FFF_FFFF_FFFF_FFFF;
const BUCKET_SCALE: f64 = BUCKET_SCALE_INT as f64;

/// A bucketer decides whether a flag that is otherwise on should be on for this particular
/// evaluation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Bucketer {
    #[serde(rename = "NoOpBucketer")]
    NoOp(NoOpBucketer),
    #[serde(rename = "PercentageBucketer")]
    Percentage(PercentageBucketer),
    #[serde(rename = "ConsistentHashPercentageBucketer")]
    ConsistentHash(ConsistentHashPercentageBucketer),
}

/// Lets every evaluation through.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NoOpBucketer {}

/// Lets a random fraction of evaluations through. Repeated evaluations for the same context are
/// independent draws.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentageBucketer {
    #[serde(default)]
    pub percentage: Percentage,
}

/// Lets a fraction of contexts through, always the same ones: the context is hashed to a score
/// in `[0, 1)` and compared against the percentage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsistentHashPercentageBucketer {
    /// When set, only these context variables take part in the hash.
    #[serde(default)]
    pub key_whitelist: Option<Vec<String>>,
    #[serde(default)]
    pub percentage: Percentage,
}

impl NoOpBucketer {
    pub const TYPE: &'static str = "NoOpBucketer";

    pub fn check(&self, _context: &Context) -> bool {
        true
    }
}

impl PercentageBucketer {
    pub const TYPE: &'static str = "PercentageBucketer";

    pub fn new(percentage: impl Into<Percentage>) -> Self {
        PercentageBucketer {
            percentage: percentage.into(),
        }
    }

    pub fn check(&self, _context: &Context) -> bool {
        self.check_with(rand::random::<f64>)
    }

    /// Draw from `randomizer`, which must return values in `[0, 1)`. A percentage of zero never
    /// passes, even for a draw of exactly zero.
    pub fn check_with<R: FnOnce() -> f64>(&self, randomizer: R) -> bool {
        let percentage = self.percentage.value();
        if percentage <= 0.0 {
            return false;
        }
        randomizer() <= percentage
    }
}

impl ConsistentHashPercentageBucketer {
    pub const TYPE: &'static str = "ConsistentHashPercentageBucketer";

    pub fn new(percentage: impl Into<Percentage>) -> Self {
        ConsistentHashPercentageBucketer {
            key_whitelist: None,
            percentage: percentage.into(),
        }
    }

    pub fn with_key_whitelist<S: Into<String>>(mut self, keys: Vec<S>) -> Self {
        self.key_whitelist = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn check(&self, context: &Context) -> bool {
        let percentage = self.percentage.value();
        if percentage <= 0.0 {
            return false;
        }
        self.score(context) <= percentage
    }

    /// The context's position in `[0, 1)`.
    ///
    /// The hash input is the compact JSON object of the (whitelisted) context variables, keys in
    /// sorted order; an empty context hashes `{}`.
    pub fn score(&self, context: &Context) -> f64 {
        let included: BTreeMap<&String, &AttributeValue> = context
            .iter()
            .filter(|(k, _)| match &self.key_whitelist {
                Some(whitelist) => whitelist.iter().any(|w| w == *k),
                None => true,
            })
            .collect();

        let serialized = serde_json::to_string(&included).unwrap_or_else(|e| {
            warn!("could not serialize context for bucketing: {}", e);
            String::new()
        });

        let mut hash = Sha1::new();
        hash.update(serialized.as_bytes());
        let digest = hash.finalize();
        let hexhash = base16ct::lower::encode_string(&digest);

        let hexhash_15 = &hexhash[..15]; // 15 chars keeps the value below BUCKET_SCALE_INT
        let numhash = i64::from_str_radix(hexhash_15, 16).unwrap_or_default();

        numhash as f64 / BUCKET_SCALE
    }
}

impl Default for Bucketer {
    fn default() -> Self {
        Bucketer::NoOp(NoOpBucketer::default())
    }
}

impl From<NoOpBucketer> for Bucketer {
    fn from(b: NoOpBucketer) -> Self {
        Bucketer::NoOp(b)
    }
}

impl From<PercentageBucketer> for Bucketer {
    fn from(b: PercentageBucketer) -> Self {
        Bucketer::Percentage(b)
    }
}

impl From<ConsistentHashPercentageBucketer> for Bucketer {
    fn from(b: ConsistentHashPercentageBucketer) -> Self {
        Bucketer::ConsistentHash(b)
    }
}

impl Bucketer {
    /// The `type` tag this bucketer serializes with.
    pub fn get_type(&self) -> &'static str {
        match self {
            Bucketer::NoOp(_) => NoOpBucketer::TYPE,
            Bucketer::Percentage(_) => PercentageBucketer::TYPE,
            Bucketer::ConsistentHash(_) => ConsistentHashPercentageBucketer::TYPE,
        }
    }

    pub fn percentage(&self) -> Option<&Percentage> {
        match self {
            Bucketer::NoOp(_) => None,
            Bucketer::Percentage(b) => Some(&b.percentage),
            Bucketer::ConsistentHash(b) => Some(&b.percentage),
        }
    }

    pub fn check(&self, context: &Context) -> bool {
        match self {
            Bucketer::NoOp(b) => b.check(context),
            Bucketer::Percentage(b) => b.check(context),
            Bucketer::ConsistentHash(b) => b.check(context),
        }
    }
}

impl<'de> Deserialize<'de> for Bucketer {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = Value::deserialize(deserializer)?;
        BucketerFactory::create(fields).map_err(D::Error::custom)
    }
}

/// Resolves a serialized bucketer's `type` tag to its variant.
pub struct BucketerFactory;

impl BucketerFactory {
    pub const TYPES: [&'static str; 3] = [
        NoOpBucketer::TYPE,
        PercentageBucketer::TYPE,
        ConsistentHashPercentageBucketer::TYPE,
    ];

    /// Build a bucketer from its serialized fields. An unknown or missing `type` fails with
    /// [Error::InvalidBucketerType]; a bad nested percentage fails the way the percentage does.
    pub fn create(fields: Value) -> Result<Bucketer> {
        let tag = fields
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let percentage = match fields.get("percentage") {
            Some(p) if !p.is_null() => Some(crate::PercentageFactory::create(p.clone())?),
            _ => None,
        };
        let bucketer = match tag.as_str() {
            NoOpBucketer::TYPE => Bucketer::NoOp(NoOpBucketer {}),
            PercentageBucketer::TYPE => Bucketer::Percentage(PercentageBucketer {
                percentage: percentage.unwrap_or_default(),
            }),
            ConsistentHashPercentageBucketer::TYPE => {
                let key_whitelist = match fields.get("key_whitelist") {
                    Some(keys) if !keys.is_null() => Some(serde_json::from_value(keys.clone())?),
                    _ => None,
                };
                Bucketer::ConsistentHash(ConsistentHashPercentageBucketer {
                    key_whitelist,
                    percentage: percentage.unwrap_or_default(),
                })
            }
            _ => return Err(Error::InvalidBucketerType(tag)),
        };
        Ok(bucketer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContextBuilder, LinearRampPercentage};
    use proptest::prelude::*;
    use serde_json::json;
    use spectral::prelude::*;
    use test_case::test_case;

    fn foo_bar() -> Context {
        ContextBuilder::new().set_string("foo", "bar").build()
    }

    fn foo_herp_derp() -> Context {
        ContextBuilder::new()
            .set_string("foo", "bar")
            .set_int("herp", 99)
            .set_bool("derp", false)
            .build()
    }

    #[test]
    fn noop_always_passes() {
        let bucketer = Bucketer::default();
        assert_that!(bucketer.get_type()).is_equal_to("NoOpBucketer");
        assert!(bucketer.check(&Context::empty()));
        assert!(bucketer.check(&foo_bar()));
        assert_that!(bucketer.percentage()).is_none();
    }

    #[test_case(0.4, true; "draw below percentage")]
    #[test_case(0.5, true; "draw equal to percentage")]
    #[test_case(0.6, false; "draw above percentage")]
    fn percentage_bucketer_compares_draw(draw: f64, expected: bool) {
        let bucketer = PercentageBucketer::new(0.5);
        assert_that!(bucketer.check_with(|| draw)).is_equal_to(expected);
    }

    #[test]
    fn percentage_bucketer_at_zero_never_passes() {
        let bucketer = PercentageBucketer::new(0.0);
        assert!(!bucketer.check_with(|| 0.0));
        for _ in 0..100 {
            assert!(!bucketer.check(&foo_bar()));
        }
    }

    #[test]
    fn percentage_bucketer_at_one_always_passes() {
        let bucketer = Bucketer::from(PercentageBucketer::new(1.0));
        for _ in 0..100 {
            assert!(bucketer.check(&Context::empty()));
        }
    }

    // scores: {} -> 0.7466, {"foo":"bar"} -> 0.6481, {"derp":false,"foo":"bar","herp":99} -> 0.4979
    #[test_case(Context::empty(), 0.8, true)]
    #[test_case(Context::empty(), 0.7, false)]
    #[test_case(foo_bar(), 0.65, true)]
    #[test_case(foo_bar(), 0.64, false)]
    #[test_case(foo_herp_derp(), 0.5, true)]
    #[test_case(foo_herp_derp(), 0.49, false)]
    fn consistent_hash_compares_score(context: Context, percentage: f64, expected: bool) {
        let bucketer = ConsistentHashPercentageBucketer::new(percentage);
        assert_that!(bucketer.check(&context)).is_equal_to(expected);
    }

    #[test]
    fn consistent_hash_scores_are_stable() {
        let bucketer = ConsistentHashPercentageBucketer::new(0.5);
        assert!((bucketer.score(&Context::empty()) - 0.746_607).abs() < 1e-6);
        assert!((bucketer.score(&foo_bar()) - 0.648_060).abs() < 1e-6);
        assert!((bucketer.score(&foo_herp_derp()) - 0.497_859).abs() < 1e-6);
    }

    #[test]
    fn consistent_hash_is_consistent() {
        let bucketer = ConsistentHashPercentageBucketer::new(0.5);
        let first = bucketer.check(&foo_herp_derp());
        for _ in 0..10 {
            assert_that!(bucketer.check(&foo_herp_derp())).is_equal_to(first);
        }
    }

    #[test]
    fn consistent_hash_at_zero_never_passes() {
        let bucketer = ConsistentHashPercentageBucketer::new(0.0);
        assert!(!bucketer.check(&Context::empty()));
        assert!(!bucketer.check(&foo_bar()));
    }

    #[test]
    fn whitelist_limits_hashed_variables() {
        let bucketer = ConsistentHashPercentageBucketer::new(0.5).with_key_whitelist(vec!["foo"]);
        assert_that!(bucketer.score(&foo_herp_derp())).is_equal_to(bucketer.score(&foo_bar()));

        let unfiltered = ConsistentHashPercentageBucketer::new(0.5);
        assert_that!(unfiltered.score(&foo_herp_derp())).is_not_equal_to(unfiltered.score(&foo_bar()));
    }

    #[test]
    fn ramped_percentage_is_resolved_at_check_time() {
        let finished = LinearRampPercentage::new(0.0, 1.0, 60).starting_at(0);
        let bucketer = ConsistentHashPercentageBucketer::new(finished);
        assert!(bucketer.check(&foo_bar()));
    }

    #[test]
    fn serializes_with_type_tags() {
        assert_that!(serde_json::to_value(Bucketer::default()).unwrap())
            .is_equal_to(json!({"type": "NoOpBucketer"}));
        assert_that!(serde_json::to_value(Bucketer::from(PercentageBucketer::new(0.5))).unwrap())
            .is_equal_to(json!({
                "type": "PercentageBucketer",
                "percentage": {"type": "Percentage", "value": 0.5},
            }));
        let hashed = ConsistentHashPercentageBucketer::new(0.5).with_key_whitelist(vec!["foo"]);
        assert_that!(serde_json::to_value(Bucketer::from(hashed)).unwrap()).is_equal_to(json!({
            "type": "ConsistentHashPercentageBucketer",
            "key_whitelist": ["foo"],
            "percentage": {"type": "Percentage", "value": 0.5},
        }));
    }

    #[test_case("NoOpBucketer")]
    #[test_case("PercentageBucketer")]
    #[test_case("ConsistentHashPercentageBucketer")]
    fn factory_creates_each_variant(tag: &str) {
        let bucketer = BucketerFactory::create(json!({ "type": tag })).unwrap();
        assert_that!(bucketer.get_type()).is_equal_to(tag);
    }

    #[test]
    fn factory_passes_arguments_through() {
        let bucketer = BucketerFactory::create(json!({
            "type": "PercentageBucketer",
            "percentage": {"type": "Percentage", "value": 0.21},
        }))
        .unwrap();
        assert!(*bucketer.percentage().unwrap() == 0.21);
    }

    #[test]
    fn factory_rejects_unknown_types() {
        assert!(matches!(
            BucketerFactory::create(json!({"type": "xyz"})),
            Err(Error::InvalidBucketerType(t)) if t == "xyz"
        ));
        assert!(matches!(
            BucketerFactory::create(json!({
                "type": "PercentageBucketer",
                "percentage": {"type": "xyz"},
            })),
            Err(Error::InvalidPercentageType(_))
        ));
    }

    proptest! {
        #[test]
        fn consistent_hash_scores_are_in_unit_interval(user_id in any::<i64>(), name in ".*") {
            let context = ContextBuilder::new()
                .set_int("user_id", user_id)
                .set_string("name", name)
                .build();
            let bucketer = ConsistentHashPercentageBucketer::new(0.5);
            let score = bucketer.score(&context);
            prop_assert!((0.0..1.0).contains(&score));
            prop_assert_eq!(score, bucketer.score(&context.clone()));
        }

        #[test]
        fn serialization_round_trips(value in 0.0f64..=1.0, whitelist in proptest::option::of(proptest::collection::vec("[a-z]{1,6}", 0..4))) {
            let bucketers = vec![
                Bucketer::default(),
                Bucketer::from(PercentageBucketer::new(value)),
                Bucketer::from(ConsistentHashPercentageBucketer {
                    key_whitelist: whitelist,
                    percentage: value.into(),
                }),
            ];
            for bucketer in bucketers {
                let json = serde_json::to_value(&bucketer).unwrap();
                let parsed = BucketerFactory::create(json.clone()).unwrap();
                prop_assert_eq!(serde_json::to_value(&parsed).unwrap(), json);
            }
        }
    }
}
