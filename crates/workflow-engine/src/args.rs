//! Node arguments
//!
//! Arguments arrive as a JSON object. A value is either a literal or a
//! tagged expression:
//!
//! ```json
//! { "max_loop": 3,
//!   "greeting": { "kind": "literal", "value": "hi" },
//!   "condition_func": { "kind": "expression",
//!                       "expr": { "type": "field", "pointer": "/route" } } }
//! ```
//!
//! Expressions are compiled once, when the node is constructed, into a
//! [`CompiledExpression`] closure.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::condition::{is_truthy, Condition};
use crate::error::{Result, WorkflowError};
use crate::value::FlowValue;

/// A resolved expression: input value in, JSON out
pub type CompiledExpression = Arc<dyn Fn(&FlowValue) -> Result<Value> + Send + Sync>;

/// Expression forms accepted in node arguments
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expression {
    /// A condition predicate; yields a boolean
    Condition {
        operator: String,
        #[serde(default)]
        target: String,
    },
    /// A field of the input's content, addressed by JSON pointer
    /// (empty pointer selects the whole content)
    Field {
        #[serde(default)]
        pointer: String,
    },
    Constant { value: Value },
    /// Boolean negation of the inner expression's truthiness
    Not { expr: Box<Expression> },
}

impl Expression {
    pub fn compile(&self) -> Result<CompiledExpression> {
        Ok(match self {
            Self::Condition { operator, target } => {
                let condition = Condition::parse(operator, target.clone())?;
                Arc::new(move |input: &FlowValue| condition.evaluate(input).map(Value::Bool))
            }
            Self::Field { pointer } => {
                let pointer = pointer.clone();
                Arc::new(move |input: &FlowValue| {
                    let content = input.content();
                    if pointer.is_empty() {
                        return Ok(content);
                    }
                    Ok(content.pointer(&pointer).cloned().unwrap_or(Value::Null))
                })
            }
            Self::Constant { value } => {
                let value = value.clone();
                Arc::new(move |_: &FlowValue| Ok(value.clone()))
            }
            Self::Not { expr } => {
                let inner = expr.compile()?;
                Arc::new(move |input: &FlowValue| Ok(Value::Bool(!is_truthy(&inner(input)?))))
            }
        })
    }
}

/// An argument value after tag resolution
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Literal(Value),
    Expression(Expression),
}

impl Argument {
    /// Resolve the `kind` tag; untagged values are literals
    pub fn from_value(value: &Value) -> std::result::Result<Self, String> {
        let Some(obj) = value.as_object() else {
            return Ok(Self::Literal(value.clone()));
        };
        match obj.get("kind").and_then(Value::as_str) {
            Some("expression") => {
                let expr = obj.get("expr").ok_or("expression without 'expr'")?;
                serde_json::from_value(expr.clone())
                    .map(Self::Expression)
                    .map_err(|e| e.to_string())
            }
            Some("literal") => Ok(Self::Literal(obj.get("value").cloned().unwrap_or(Value::Null))),
            _ => Ok(Self::Literal(value.clone())),
        }
    }
}

/// Typed view over one node's arguments
#[derive(Debug, Clone)]
pub struct NodeArgs<'a> {
    node_id: &'a str,
    values: &'a Map<String, Value>,
}

impl<'a> NodeArgs<'a> {
    pub fn new(node_id: &'a str, values: &'a Map<String, Value>) -> Self {
        Self { node_id, values }
    }

    pub fn raw(&self) -> &'a Map<String, Value> {
        self.values
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn error(&self, key: &str, message: impl Into<String>) -> WorkflowError {
        WorkflowError::invalid_argument(self.node_id, key, message)
    }

    /// Literal value of `key`, with expression tags rejected
    pub fn literal(&self, key: &str) -> Result<Option<Value>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(v) => match Argument::from_value(v).map_err(|e| self.error(key, e))? {
                Argument::Literal(value) => Ok(Some(value)),
                Argument::Expression(_) => Err(self.error(key, "expected a literal")),
            },
        }
    }

    pub fn opt_str(&self, key: &str) -> Result<Option<String>> {
        match self.literal(key)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Ok(Some(other.to_string())),
        }
    }

    pub fn str(&self, key: &str) -> Result<String> {
        self.opt_str(key)?
            .ok_or_else(|| self.error(key, "required argument is missing"))
    }

    pub fn str_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self.opt_str(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// Unsigned integer; numeric strings are accepted since editors
    /// often store every field as text
    pub fn opt_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.literal(key)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| self.error(key, "expected a non-negative integer")),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.error(key, format!("'{s}' is not an integer"))),
            Some(_) => Err(self.error(key, "expected a non-negative integer")),
        }
    }

    pub fn opt_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.literal(key)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(b)),
            Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(self.error(key, format!("'{s}' is not a boolean"))),
            },
            Some(_) => Err(self.error(key, "expected a boolean")),
        }
    }

    /// List of labels; a JSON-encoded string list is accepted too
    pub fn str_list(&self, key: &str) -> Result<Vec<String>> {
        let value = match self.literal(key)? {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::String(s)) => serde_json::from_str::<Value>(&s)
                .map_err(|_| self.error(key, "expected a list"))?,
            Some(other) => other,
        };
        let Value::Array(items) = value else {
            return Err(self.error(key, "expected a list"));
        };
        Ok(items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect())
    }

    /// JSON object argument; a JSON-encoded string is accepted too
    pub fn opt_object(&self, key: &str) -> Result<Option<Map<String, Value>>> {
        match self.literal(key)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(Value::String(s)) => match serde_json::from_str::<Value>(s.trim()) {
                Ok(Value::Object(map)) => Ok(Some(map)),
                _ => Err(self.error(key, "expected a JSON object")),
            },
            Some(_) => Err(self.error(key, "expected a JSON object")),
        }
    }

    /// Compile `key` when it holds a tagged expression
    pub fn expression(&self, key: &str) -> Result<Option<CompiledExpression>> {
        let Some(raw) = self.values.get(key) else {
            return Ok(None);
        };
        match Argument::from_value(raw).map_err(|e| self.error(key, e))? {
            Argument::Expression(expr) => expr.compile().map(Some),
            Argument::Literal(_) => Err(self.error(key, "expected a tagged expression")),
        }
    }

    /// The `condition_op` / `target_value` pair used by branch and loop nodes
    pub fn condition(&self) -> Result<Option<Condition>> {
        match self.opt_str("condition_op")? {
            None => Ok(None),
            Some(op) => {
                let target = self.opt_str("target_value")?.unwrap_or_default();
                Condition::parse(&op, target).map(Some)
            }
        }
    }
}
