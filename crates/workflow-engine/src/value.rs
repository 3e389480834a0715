//! Values flowing between operators
//!
//! Operators exchange [`FlowValue`]s. Most leaf operators speak and return
//! structured messages ([`Msg`]); tools may return plain JSON data, and a
//! node with several predecessors receives their outputs as a list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Speaker role attached to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    #[default]
    Assistant,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A structured message produced by agents and message nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Msg {
    pub id: String,
    pub name: String,
    pub content: Value,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub timestamp: String,
}

impl Msg {
    pub fn new(name: impl Into<String>, content: impl Into<Value>, role: Role) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            content: content.into(),
            role,
            url: None,
            metadata: None,
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    pub fn with_url(mut self, url: Vec<String>) -> Self {
        self.url = Some(url);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Content rendered as text; strings are returned verbatim
    pub fn text(&self) -> String {
        value_text(&self.content)
    }
}

/// The value passed along graph edges and into composite children
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum FlowValue {
    /// No input, or an operator that produced nothing
    #[default]
    Null,
    Message(Msg),
    /// Ordered outputs of several predecessors
    List(Vec<FlowValue>),
    Data(Value),
}

impl FlowValue {
    /// True for the absent sentinel, including JSON null data
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Data(Value::Null))
    }

    pub fn as_msg(&self) -> Option<&Msg> {
        match self {
            Self::Message(msg) => Some(msg),
            _ => None,
        }
    }

    /// The value a predicate is evaluated against: a message's content,
    /// or the value itself
    pub fn content(&self) -> Value {
        match self {
            Self::Message(msg) => msg.content.clone(),
            other => other.to_json(),
        }
    }

    /// Full JSON rendering, messages included as objects
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Message(msg) => serde_json::to_value(msg).unwrap_or(Value::Null),
            Self::List(items) => Value::Array(items.iter().map(FlowValue::to_json).collect()),
            Self::Data(value) => value.clone(),
        }
    }

    /// Flatten into the messages it carries, in order
    pub fn messages(&self) -> Vec<Msg> {
        match self {
            Self::Message(msg) => vec![msg.clone()],
            Self::List(items) => items.iter().flat_map(FlowValue::messages).collect(),
            _ => Vec::new(),
        }
    }

    /// Text form of the extracted content
    pub fn text(&self) -> String {
        value_text(&self.content())
    }
}

impl From<Msg> for FlowValue {
    fn from(msg: Msg) -> Self {
        Self::Message(msg)
    }
}

impl From<Value> for FlowValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            other => Self::Data(other),
        }
    }
}

impl From<&str> for FlowValue {
    fn from(value: &str) -> Self {
        Self::Data(Value::String(value.to_string()))
    }
}

impl From<String> for FlowValue {
    fn from(value: String) -> Self {
        Self::Data(Value::String(value))
    }
}

impl From<Vec<FlowValue>> for FlowValue {
    fn from(items: Vec<FlowValue>) -> Self {
        Self::List(items)
    }
}

/// Render a JSON value as text: strings verbatim, null as empty,
/// everything else as compact JSON
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_extracts_message_body() {
        let msg = Msg::new("Host", "hello", Role::System);
        let value = FlowValue::from(msg);
        assert_eq!(value.content(), json!("hello"));
        assert_eq!(value.text(), "hello");
    }

    #[test]
    fn test_null_data_is_null() {
        assert!(FlowValue::Null.is_null());
        assert!(FlowValue::Data(Value::Null).is_null());
        assert!(FlowValue::from(Value::Null).is_null());
        assert!(!FlowValue::from("").is_null());
    }

    #[test]
    fn test_messages_flattens_lists() {
        let a = Msg::new("a", "1", Role::User);
        let b = Msg::new("b", "2", Role::User);
        let value = FlowValue::List(vec![a.clone().into(), json!(3).into(), b.clone().into()]);
        let names: Vec<_> = value.messages().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_role_round_trip_names() {
        for role in [Role::System, Role::User, Role::Assistant] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("narrator"), None);
    }

    #[test]
    fn test_msg_serializes_role_lowercase() {
        let msg = Msg::new("Bob", "hi", Role::Assistant);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json.get("url").is_none());
    }
}
