use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::operator::Operator;
use crate::{AttributeValue, Context};

/// Separates the variable name from the operator symbol in a check key, e.g. `age__gte`.
pub const OPERATOR_DELIMITER: &str = "__";

/// A single comparison of one context variable against an expected value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub variable: String,
    pub value: AttributeValue,
    #[serde(default)]
    pub operator: Operator,
}

impl Check {
    pub fn new(variable: impl Into<String>, value: AttributeValue, operator: Operator) -> Self {
        Check {
            variable: variable.into(),
            value,
            operator,
        }
    }

    /// Build a check from a keyword-style key: `variable` for equality or
    /// `variable__symbol` for any other operator. Only the last delimiter separates the operator,
    /// so variable names may themselves contain `__`.
    pub fn factory(key: &str, value: AttributeValue) -> Result<Check> {
        let (variable, operator) = match key.rsplit_once(OPERATOR_DELIMITER) {
            Some((variable, symbol)) => (variable, Operator::from_symbol(Some(symbol))?),
            None => (key, Operator::Equal),
        };
        Ok(Check::new(variable, value, operator))
    }

    /// The inverse of [Check::factory]'s key parsing.
    pub fn make_check_key(variable: &str, operator: Option<&str>) -> String {
        match operator {
            Some(symbol) if !symbol.is_empty() => {
                format!("{}{}{}", variable, OPERATOR_DELIMITER, symbol)
            }
            _ => variable.to_string(),
        }
    }

    pub fn key(&self) -> String {
        Check::make_check_key(&self.variable, self.operator.symbol())
    }

    /// Apply the operator to `(actual, self.value)`.
    pub fn check(&self, actual: &AttributeValue) -> Result<bool> {
        self.operator.compare(actual, &self.value)
    }
}

/// A named group of checks, keyed by variable. A condition holds for a context when every check
/// of every variable passes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Condition {
    checks: BTreeMap<String, Vec<Check>>,
}

impl Condition {
    /// Build a condition from keyword-style constraints:
    ///
    /// ```
    /// # use flipper_flags::Condition;
    /// let teenager = Condition::new(vec![("age__gte", 13.into()), ("age__lt", 20.into())]).unwrap();
    /// ```
    pub fn new<K, I>(constraints: I) -> Result<Condition>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, AttributeValue)>,
    {
        let checks = constraints
            .into_iter()
            .map(|(key, value)| Check::factory(key.as_ref(), value))
            .collect::<Result<Vec<_>>>()?;
        Ok(Condition::from_checks(checks))
    }

    pub fn from_checks<I: IntoIterator<Item = Check>>(checks: I) -> Condition {
        let mut grouped: BTreeMap<String, Vec<Check>> = BTreeMap::new();
        for check in checks {
            grouped
                .entry(check.variable.clone())
                .or_default()
                .push(check);
        }
        Condition { checks: grouped }
    }

    /// The checks registered for `variable`, in insertion order.
    pub fn checks_for(&self, variable: &str) -> &[Check] {
        self.checks.get(variable).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn variables(&self) -> impl Iterator<Item = &String> {
        self.checks.keys()
    }

    /// A variable the context does not supply fails its checks; it is never an error.
    /// Operand type mismatches are.
    pub fn check(&self, context: &Context) -> Result<bool> {
        for (variable, checks) in &self.checks {
            if checks.is_empty() {
                continue;
            }
            let actual = match context.get(variable) {
                Some(v) => v,
                None => return Ok(false),
            };
            for check in checks {
                if !check.check(actual)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Conditions combine with AND. No conditions at all is a pass.
    pub fn check_all(conditions: &[Condition], context: &Context) -> Result<bool> {
        for condition in conditions {
            if !condition.check(context)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
