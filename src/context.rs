use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::AttributeValue;

/// Context is the set of runtime values a flag is evaluated against, e.g. the id of the current
/// user or whether they are an administrator.
///
/// Variables are kept sorted by name, so iterating a context (and hashing it for consistent
/// bucketing) is independent of the order in which values were set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: BTreeMap<String, AttributeValue>,
}

impl Context {
    /// A context with no variables.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up a variable. Absent variables are None; callers treat that as a non-match.
    pub fn get(&self, variable: &str) -> Option<&AttributeValue> {
        self.values.get(variable)
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.values.contains_key(variable)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Iterate over variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.values.iter()
    }
}

impl<S, T> FromIterator<(S, T)> for Context
where
    String: From<S>,
    AttributeValue: From<T>,
{
    fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
        Context {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Contains methods for building a [Context].
///
/// Setting the same variable twice keeps the last value.
#[derive(Debug, Default)]
pub struct ContextBuilder {
    values: BTreeMap<String, AttributeValue>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a variable to a boolean value.
    pub fn set_bool(&mut self, variable: &str, value: bool) -> &mut Self {
        self.set_value(variable, AttributeValue::Bool(value))
    }

    /// Sets a variable to an integer value.
    pub fn set_int(&mut self, variable: &str, value: i64) -> &mut Self {
        self.set_value(variable, AttributeValue::Int(value))
    }

    /// Sets a variable to a f64 numeric value.
    pub fn set_float(&mut self, variable: &str, value: f64) -> &mut Self {
        self.set_value(variable, AttributeValue::Float(value))
    }

    /// Sets a variable to a string value.
    pub fn set_string(&mut self, variable: &str, value: impl Into<String>) -> &mut Self {
        self.set_value(variable, AttributeValue::String(value.into()))
    }

    /// Sets the value of any variable for the context.
    pub fn set_value(&mut self, variable: &str, value: AttributeValue) -> &mut Self {
        self.values.insert(variable.to_owned(), value);
        self
    }

    pub fn build(&self) -> Context {
        Context {
            values: self.values.clone(),
        }
    }
}
