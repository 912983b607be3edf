use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DomainError;
use crate::signal::path::{self, coerce_to_number, coerce_to_string};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
    NotContains,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Gt | Self::Lt | Self::Gte | Self::Lte)
    }
}

impl FromStr for Operator {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "eq" | "==" => Ok(Self::Eq),
            "ne" | "!=" => Ok(Self::Ne),
            "gt" | ">" => Ok(Self::Gt),
            "lt" | "<" => Ok(Self::Lt),
            "gte" | ">=" => Ok(Self::Gte),
            "lte" | "<=" => Ok(Self::Lte),
            "contains" => Ok(Self::Contains),
            "not_contains" => Ok(Self::NotContains),
            other => Err(DomainError::UnknownOperator(other.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a condition. Untagged so rule documents can write
/// `"value": 90` or `"value": "prod"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Number(f64),
    Text(String),
}

impl ConditionValue {
    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    fn as_text(&self) -> String {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for ConditionValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for ConditionValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    field: String,
    operator: Operator,
    value: ConditionValue,
}

impl Condition {
    pub fn new(
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<ConditionValue>,
    ) -> Result<Self, DomainError> {
        let condition = Self {
            field: field.into(),
            operator,
            value: value.into(),
        };
        condition.validate()?;
        Ok(condition)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let field = self.field.trim();
        if field.is_empty() || field.split('.').any(str::is_empty) {
            return Err(DomainError::InvalidCondition {
                field: self.field.clone(),
                reason: "field path is empty or has an empty segment".into(),
            });
        }
        if self.operator.is_numeric() && self.value.as_number().is_none() {
            return Err(DomainError::InvalidCondition {
                field: self.field.clone(),
                reason: format!("operator {} needs a numeric value", self.operator),
            });
        }
        Ok(())
    }

    /// Evaluates against a payload. Missing fields and uncomparable values
    /// are a non-match, never an error.
    pub fn evaluate(&self, payload: &Value) -> bool {
        let Some(actual) = path::resolve(payload, &self.field).value() else {
            return false;
        };

        match self.operator {
            Operator::Eq => self.equals(actual),
            Operator::Ne => !self.equals(actual),
            Operator::Gt => self.compare(actual, |a, b| a > b),
            Operator::Lt => self.compare(actual, |a, b| a < b),
            Operator::Gte => self.compare(actual, |a, b| a >= b),
            Operator::Lte => self.compare(actual, |a, b| a <= b),
            Operator::Contains => coerce_to_string(actual).contains(&self.value.as_text()),
            Operator::NotContains => !coerce_to_string(actual).contains(&self.value.as_text()),
        }
    }

    fn equals(&self, actual: &Value) -> bool {
        match &self.value {
            ConditionValue::Number(expected) => {
                coerce_to_number(actual).is_some_and(|a| a == *expected)
            }
            ConditionValue::Text(expected) => coerce_to_string(actual) == *expected,
        }
    }

    fn compare(&self, actual: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
        match (coerce_to_number(actual), self.value.as_number()) {
            (Some(a), Some(b)) => cmp(a, b),
            _ => false,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &ConditionValue {
        &self.value
    }
}

/// Free-function form of [`Condition::evaluate`].
pub fn evaluate(condition: &Condition, payload: &Value) -> bool {
    condition.evaluate(payload)
}
