//! Condition predicates used by loop and branch nodes
//!
//! A predicate compares the content of a value (a message's `content`
//! field, or the value itself) against a target string using a fixed,
//! case-sensitive operator vocabulary.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{Result, WorkflowError};
use crate::value::{value_text, FlowValue};

/// The supported comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionOperator {
    Contains,
    NotContains,
    StartWith,
    EndWith,
    Equals,
    NotEquals,
    IsEmpty,
    IsNotEmpty,
    IsNull,
    IsNotNull,
}

impl ConditionOperator {
    pub const ALL: [ConditionOperator; 10] = [
        Self::Contains,
        Self::NotContains,
        Self::StartWith,
        Self::EndWith,
        Self::Equals,
        Self::NotEquals,
        Self::IsEmpty,
        Self::IsNotEmpty,
        Self::IsNull,
        Self::IsNotNull,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::NotContains => "not contains",
            Self::StartWith => "start with",
            Self::EndWith => "end with",
            Self::Equals => "equals",
            Self::NotEquals => "not equals",
            Self::IsEmpty => "is empty",
            Self::IsNotEmpty => "is not empty",
            Self::IsNull => "is null",
            Self::IsNotNull => "is not null",
        }
    }

    /// Apply the operator to already-extracted content
    pub fn apply(&self, actual: &Value, target: &str) -> Result<bool> {
        let text = || {
            if actual.is_null() {
                Err(WorkflowError::InvalidCondition {
                    operator: self.as_str().to_string(),
                    message: "value is null".to_string(),
                })
            } else {
                Ok(value_text(actual))
            }
        };

        Ok(match self {
            Self::Contains => text()?.contains(target),
            Self::NotContains => !text()?.contains(target),
            Self::StartWith => text()?.starts_with(target),
            Self::EndWith => text()?.ends_with(target),
            Self::Equals => text()? == target,
            Self::NotEquals => text()? != target,
            Self::IsEmpty => !is_truthy(actual),
            Self::IsNotEmpty => is_truthy(actual),
            Self::IsNull => actual.is_null(),
            Self::IsNotNull => !actual.is_null(),
        })
    }
}

impl FromStr for ConditionOperator {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| WorkflowError::UnknownCondition(s.to_string()))
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluate `operator` against `value` and `target`
///
/// Unknown operators are reported here, at evaluation time.
pub fn evaluate(value: &FlowValue, operator: &str, target: &str) -> Result<bool> {
    let op: ConditionOperator = operator.parse()?;
    op.apply(&value.content(), target)
}

/// Python-style truthiness over JSON
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// A predicate with its operator resolved once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub operator: ConditionOperator,
    pub target: String,
}

impl Condition {
    pub fn new(operator: ConditionOperator, target: impl Into<String>) -> Self {
        Self {
            operator,
            target: target.into(),
        }
    }

    pub fn parse(operator: &str, target: impl Into<String>) -> Result<Self> {
        Ok(Self::new(operator.parse()?, target))
    }

    pub fn evaluate(&self, value: &FlowValue) -> Result<bool> {
        self.operator.apply(&value.content(), &self.target)
    }
}
