//! Workflow configuration documents
//!
//! A configuration maps node ids to node records. The document may be
//! nested once inside the editor envelope
//! `{"drawflow": {"Home": {"data": {...}}}}`, in which case the editor's
//! `welcome` placeholder entries are dropped. Node order is preserved as
//! declared.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, WorkflowError};

/// One end of a port connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(deserialize_with = "deserialize_id")]
    pub node: String,
    /// Port on the far side of the connection
    #[serde(default, alias = "input", alias = "output")]
    pub port: String,
}

/// A named port with its connections
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Port {
    pub name: String,
    pub connections: Vec<Connection>,
}

#[derive(Debug, Default, Deserialize)]
struct PortRecord {
    #[serde(default)]
    connections: Vec<Connection>,
}

/// The `data` block of a node record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default, deserialize_with = "deserialize_ids")]
    pub elements: Vec<String>,
    #[serde(default)]
    pub source: Map<String, Value>,
}

/// A single node record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Node type name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default)]
    pub data: NodeData,
    #[serde(default, deserialize_with = "deserialize_ports")]
    pub inputs: Vec<Port>,
    #[serde(default, deserialize_with = "deserialize_ports")]
    pub outputs: Vec<Port>,
}

impl NodeSpec {
    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// Drop empty-string args and snapshot the originals as `source`
    fn sanitize(&mut self) {
        self.data.args.retain(|_, v| !matches!(v, Value::String(s) if s.is_empty()));
        let mut source = self.data.args.clone();
        source.remove("condition_op");
        source.remove("target_value");
        self.data.source = source;
    }
}

/// A parsed, sanitized workflow configuration
#[derive(Debug, Clone, Default)]
pub struct WorkflowConfig {
    nodes: Vec<(String, NodeSpec)>,
    index: HashMap<String, usize>,
}

impl WorkflowConfig {
    /// Parse a JSON document, unwrapping the editor envelope if present
    pub fn from_value(value: Value) -> Result<Self> {
        let (records, enveloped) = match unwrap_envelope(value) {
            Ok(data) => (data, true),
            Err(value) => match value {
                Value::Object(map) => (map, false),
                _ => {
                    return Err(WorkflowError::InvalidConfig(
                        "configuration must be a JSON object".to_string(),
                    ))
                }
            },
        };

        let mut config = Self::default();
        for (id, record) in records {
            if enveloped && record.get("class").and_then(Value::as_str) == Some("welcome") {
                log::debug!("Dropping editor placeholder node '{}'", id);
                continue;
            }
            let mut spec: NodeSpec = serde_json::from_value(record).map_err(|e| {
                WorkflowError::InvalidConfig(format!("node '{}': {}", id, e))
            })?;
            spec.sanitize();
            config.insert(id, spec)?;
        }
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    pub fn insert(&mut self, id: impl Into<String>, spec: NodeSpec) -> Result<()> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(WorkflowError::InvalidConfig(format!("duplicate node id '{}'", id)));
        }
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push((id, spec));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&NodeSpec> {
        self.index.get(id).map(|&i| &self.nodes[i].1)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Nodes in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeSpec)> {
        self.nodes.iter().map(|(id, spec)| (id.as_str(), spec))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Returns the inner node map if `value` is wrapped in the editor envelope,
/// otherwise hands the value back untouched
fn unwrap_envelope(value: Value) -> std::result::Result<Map<String, Value>, Value> {
    let is_envelope = value
        .get("drawflow")
        .and_then(|d| d.get("Home"))
        .and_then(|h| h.get("data"))
        .map(Value::is_object)
        .unwrap_or(false);
    if !is_envelope {
        return Err(value);
    }
    match value {
        Value::Object(mut root) => match root.remove("drawflow") {
            Some(Value::Object(mut drawflow)) => match drawflow.remove("Home") {
                Some(Value::Object(mut home)) => match home.remove("data") {
                    Some(Value::Object(data)) => Ok(data),
                    _ => Ok(Map::new()),
                },
                _ => Ok(Map::new()),
            },
            _ => Ok(Map::new()),
        },
        other => Err(other),
    }
}

fn id_from_value(value: Value) -> std::result::Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("invalid node id: {}", other)),
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    id_from_value(Value::deserialize(deserializer)?).map_err(serde::de::Error::custom)
}

fn deserialize_ids<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<Value>::deserialize(deserializer)?
        .into_iter()
        .map(|v| id_from_value(v).map_err(serde::de::Error::custom))
        .collect()
}

fn deserialize_ports<'de, D>(deserializer: D) -> std::result::Result<Vec<Port>, D::Error>
where
    D: Deserializer<'de>,
{
    // Editors emit `[]` for nodes without ports
    let raw = Value::deserialize(deserializer)?;
    let map = match raw {
        Value::Object(map) => map,
        Value::Array(items) if items.is_empty() => return Ok(Vec::new()),
        Value::Null => return Ok(Vec::new()),
        other => return Err(serde::de::Error::custom(format!("invalid ports: {}", other))),
    };
    map.into_iter()
        .map(|(name, record)| {
            let record: PortRecord =
                serde_json::from_value(record).map_err(serde::de::Error::custom)?;
            Ok(Port {
                name,
                connections: record.connections,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_is_unwrapped_and_welcome_dropped() {
        let doc = json!({
            "drawflow": {"Home": {"data": {
                "1": {"name": "welcome", "class": "welcome", "data": {}},
                "2": {"name": "start", "data": {"args": {}}}
            }}}
        });
        let config = WorkflowConfig::from_value(doc).unwrap();
        assert_eq!(config.len(), 1);
        assert!(config.get("2").is_some());
        assert!(!config.contains("1"));
    }

    #[test]
    fn test_bare_document_keeps_all_nodes() {
        let doc = json!({
            "1": {"name": "start", "class": "welcome", "data": {}}
        });
        let config = WorkflowConfig::from_value(doc).unwrap();
        assert_eq!(config.len(), 1);
    }

    #[test]
    fn test_empty_args_dropped_and_source_snapshotted() {
        let doc = json!({
            "3": {"name": "IF/ELSE", "data": {
                "args": {"condition_op": "equals", "target_value": "x", "note": ""},
                "source": {"stale": true}
            }}
        });
        let config = WorkflowConfig::from_value(doc).unwrap();
        let spec = config.get("3").unwrap();
        assert!(!spec.data.args.contains_key("note"));
        assert_eq!(spec.data.args["condition_op"], "equals");
        assert!(spec.data.source.is_empty());
    }

    #[test]
    fn test_ports_keep_declaration_order_and_numeric_ids() {
        let doc = json!({
            "4": {
                "name": "Message",
                "data": {"elements": [5, "6"]},
                "inputs": {
                    "input_2": {"connections": [{"node": "2", "input": "output_1"}]},
                    "input_1": {"connections": [{"node": 1, "input": "output_1"}]}
                },
                "outputs": []
            }
        });
        let config = WorkflowConfig::from_value(doc).unwrap();
        let spec = config.get("4").unwrap();
        assert_eq!(spec.data.elements, vec!["5", "6"]);
        let names: Vec<_> = spec.inputs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["input_2", "input_1"]);
        assert_eq!(spec.inputs[1].connections[0].node, "1");
        assert_eq!(spec.inputs[1].connections[0].port, "output_1");
        assert!(spec.outputs.is_empty());
    }

    #[test]
    fn test_non_object_document_rejected() {
        let err = WorkflowConfig::from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidConfig(_)));
    }

    #[test]
    fn test_record_without_name_rejected() {
        let err = WorkflowConfig::from_value(json!({"1": {"data": {}}})).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidConfig(msg) if msg.contains("node '1'")));
    }
}
