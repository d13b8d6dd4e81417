use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::util::f64_to_i64_safe;

/// An attribute value represents the possible values of a [crate::Context] variable and of the
/// expected operand of a [crate::Check].
///
/// Integers and floats are kept apart so that values survive a trip through the wire format
/// unchanged, but they compare with each other numerically.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Stores a boolean.
    Bool(bool),
    /// Stores an integer.
    Int(i64),
    /// Stores a floating point number.
    Float(f64),
    /// Stores a string value.
    String(String),
    /// Stores an array of attribute values.
    Array(Vec<AttributeValue>),
    /// Stores a map of attribute values.
    Object(BTreeMap<String, AttributeValue>),
    /// Stores a null value.
    Null,
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> AttributeValue {
        AttributeValue::String(s.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> AttributeValue {
        AttributeValue::String(s)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> AttributeValue {
        AttributeValue::Bool(b)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Int(i)
    }
}

impl From<i32> for AttributeValue {
    fn from(i: i32) -> Self {
        AttributeValue::Int(i.into())
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::Float(f)
    }
}

impl<T> From<Vec<T>> for AttributeValue
where
    AttributeValue: From<T>,
{
    fn from(v: Vec<T>) -> AttributeValue {
        v.into_iter().collect()
    }
}

impl<S, T> From<HashMap<S, T>> for AttributeValue
where
    String: From<S>,
    AttributeValue: From<T>,
{
    fn from(hashmap: HashMap<S, T>) -> AttributeValue {
        hashmap.into_iter().collect()
    }
}

impl<T> FromIterator<T> for AttributeValue
where
    AttributeValue: From<T>,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        AttributeValue::Array(iter.into_iter().map(AttributeValue::from).collect())
    }
}

impl<S, T> FromIterator<(S, T)> for AttributeValue
where
    String: From<S>,
    AttributeValue: From<T>,
{
    fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
        AttributeValue::Object(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<&Value> for AttributeValue {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => AttributeValue::Null,
            Value::Bool(b) => AttributeValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    AttributeValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    AttributeValue::Float(f)
                } else {
                    warn!("could not interpret '{:?}' as a number", n);
                    AttributeValue::String(n.to_string())
                }
            }
            Value::String(str) => AttributeValue::String(str.clone()),
            Value::Array(arr) => {
                AttributeValue::Array(arr.iter().map(AttributeValue::from).collect())
            }
            Value::Object(obj) => {
                AttributeValue::Object(obj.iter().map(|(k, v)| (k.into(), v.into())).collect())
            }
        }
    }
}

impl From<Value> for AttributeValue {
    fn from(v: Value) -> Self {
        AttributeValue::from(&v)
    }
}

impl AttributeValue {
    /// Returns None unless self is a String. It will not convert.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the wrapped value as a float for numeric types, and None otherwise.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the wrapped value as an integer. Floats are truncated if they fit.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            AttributeValue::Float(f) => f64_to_i64_safe(*f),
            _ => None,
        }
    }

    /// Returns None unless self is a bool. It will not convert.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the elements of an array value.
    pub fn as_array(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::Array(values) => Some(values),
            _ => None,
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            AttributeValue::Bool(_) => "bool",
            AttributeValue::Int(_) => "int",
            AttributeValue::Float(_) => "float",
            AttributeValue::String(_) => "string",
            AttributeValue::Array(_) => "array",
            AttributeValue::Object(_) => "object",
            AttributeValue::Null => "null",
        }
    }

    /// Equality as the condition operators see it: integers and floats are equal when they are
    /// numerically equal, containers compare element by element.
    #[allow(clippy::float_cmp)]
    pub fn loosely_equals(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (AttributeValue::Array(l), AttributeValue::Array(r)) => {
                l.len() == r.len() && l.iter().zip(r).all(|(l, r)| l.loosely_equals(r))
            }
            (AttributeValue::Object(l), AttributeValue::Object(r)) => {
                l.len() == r.len()
                    && l.iter()
                        .all(|(k, v)| r.get(k).map(|rv| v.loosely_equals(rv)).unwrap_or(false))
            }
            (AttributeValue::Int(l), AttributeValue::Int(r)) => l == r,
            (AttributeValue::Float(l), AttributeValue::Float(r)) => l == r,
            (AttributeValue::Int(i), AttributeValue::Float(f))
            | (AttributeValue::Float(f), AttributeValue::Int(i)) => {
                compare_int_float(*i, *f) == Some(Ordering::Equal)
            }
            (l, r) => l == r,
        }
    }

    /// Ordering between two values of comparable kinds: numbers with numbers, strings with
    /// strings, bools with bools and arrays lexicographically. Returns None for anything else.
    pub fn compare(&self, other: &AttributeValue) -> Option<Ordering> {
        match (self, other) {
            (AttributeValue::Int(l), AttributeValue::Int(r)) => Some(l.cmp(r)),
            (AttributeValue::Float(l), AttributeValue::Float(r)) => l.partial_cmp(r),
            (AttributeValue::Int(l), AttributeValue::Float(r)) => compare_int_float(*l, *r),
            (AttributeValue::Float(l), AttributeValue::Int(r)) => {
                compare_int_float(*r, *l).map(Ordering::reverse)
            }
            (AttributeValue::String(l), AttributeValue::String(r)) => Some(l.cmp(r)),
            (AttributeValue::Bool(l), AttributeValue::Bool(r)) => Some(l.cmp(r)),
            (AttributeValue::Array(l), AttributeValue::Array(r)) => {
                for (lv, rv) in l.iter().zip(r) {
                    match lv.compare(rv)? {
                        Ordering::Equal => continue,
                        unequal => return Some(unequal),
                    }
                }
                Some(l.len().cmp(&r.len()))
            }
            _ => None,
        }
    }
}

// 2^63 as a float. Every float at or above it is beyond i64::MAX, every float below its
// negation is beyond i64::MIN.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

// Exact ordering of an integer against a float. Casting the integer to f64 would round above
// 2^53 and make distinct values compare equal.
fn compare_int_float(i: i64, f: f64) -> Option<Ordering> {
    if f.is_nan() {
        return None;
    }
    if f >= I64_BOUND {
        return Some(Ordering::Less);
    }
    if f < -I64_BOUND {
        return Some(Ordering::Greater);
    }
    // In range, so the floor is an integral float that converts to i64 without loss.
    let floor = f.floor();
    let floor_int = floor as i64;
    match i.cmp(&floor_int) {
        Ordering::Equal if floor != f => Some(Ordering::Less),
        ordering => Some(ordering),
    }
}
