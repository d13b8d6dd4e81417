use std::cmp::Ordering;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::AttributeValue;

/// Operator is a two-argument predicate applied by a [crate::Check] to the actual context value
/// and the check's expected value, in that order.
///
/// On the wire an operator is its symbol, with equality written as `null`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    In,
    NotIn,
}

impl Default for Operator {
    fn default() -> Self {
        Operator::Equal
    }
}

impl Operator {
    pub const ALL: [Operator; 8] = [
        Operator::Equal,
        Operator::NotEqual,
        Operator::LessThan,
        Operator::LessThanOrEqual,
        Operator::GreaterThan,
        Operator::GreaterThanOrEqual,
        Operator::In,
        Operator::NotIn,
    ];

    /// The symbol used in check keys (`age__gte`) and in serialized checks. Equality has none.
    pub fn symbol(&self) -> Option<&'static str> {
        match self {
            Operator::Equal => None,
            Operator::NotEqual => Some("ne"),
            Operator::LessThan => Some("lt"),
            Operator::LessThanOrEqual => Some("lte"),
            Operator::GreaterThan => Some("gt"),
            Operator::GreaterThanOrEqual => Some("gte"),
            Operator::In => Some("in"),
            Operator::NotIn => Some("not_in"),
        }
    }

    /// Resolve a symbol. Both a missing symbol and the empty string mean equality.
    pub fn from_symbol(symbol: Option<&str>) -> Result<Operator> {
        match symbol {
            None | Some("") => Ok(Operator::Equal),
            Some(s) => Operator::ALL
                .iter()
                .find(|op| op.symbol() == Some(s))
                .copied()
                .ok_or_else(|| Error::InvalidOperator(s.to_string())),
        }
    }

    /// Apply the operator to `(actual, expected)`.
    ///
    /// Ordering operators fail with [Error::IncomparableTypes] when the operands have no common
    /// ordering; membership operators fail when `expected` is not an array.
    pub fn compare(&self, actual: &AttributeValue, expected: &AttributeValue) -> Result<bool> {
        match self {
            Operator::Equal => Ok(actual.loosely_equals(expected)),
            Operator::NotEqual => Ok(!actual.loosely_equals(expected)),

            Operator::LessThan => self.ordering_op(actual, expected, |o| o == Ordering::Less),
            Operator::LessThanOrEqual => {
                self.ordering_op(actual, expected, |o| o != Ordering::Greater)
            }
            Operator::GreaterThan => {
                self.ordering_op(actual, expected, |o| o == Ordering::Greater)
            }
            Operator::GreaterThanOrEqual => {
                self.ordering_op(actual, expected, |o| o != Ordering::Less)
            }

            Operator::In => self.membership_op(actual, expected),
            Operator::NotIn => self.membership_op(actual, expected).map(|found| !found),
        }
    }

    fn ordering_op<F: Fn(Ordering) -> bool>(
        &self,
        actual: &AttributeValue,
        expected: &AttributeValue,
        f: F,
    ) -> Result<bool> {
        actual
            .compare(expected)
            .map(f)
            .ok_or_else(|| self.incomparable(actual, expected))
    }

    fn membership_op(&self, actual: &AttributeValue, expected: &AttributeValue) -> Result<bool> {
        let members = expected
            .as_array()
            .ok_or_else(|| self.incomparable(actual, expected))?;
        Ok(members.iter().any(|member| actual.loosely_equals(member)))
    }

    fn incomparable(&self, actual: &AttributeValue, expected: &AttributeValue) -> Error {
        Error::IncomparableTypes {
            operator: self.symbol().unwrap_or("eq"),
            actual: actual.kind_name().to_string(),
            expected: expected.kind_name().to_string(),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol().unwrap_or("eq"))
    }
}

impl Serialize for Operator {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.symbol() {
            Some(symbol) => serializer.serialize_str(symbol),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let symbol = Option::<String>::deserialize(deserializer)?;
        Operator::from_symbol(symbol.as_deref()).map_err(D::Error::custom)
    }
}
