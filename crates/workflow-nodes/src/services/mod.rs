//! Service nodes
//!
//! Services are plain operators that can also serve as ReActAgent tools. A
//! ReActAgent invokes them with the function-call arguments as a JSON
//! object; any other input is treated as the primary argument.

mod python;
mod read_text;
mod write_text;

pub use python::PythonService;
pub use read_text::ReadTextService;
pub use write_text::WriteTextService;

use serde_json::{json, Map, Value};
use workflow_engine::{FlowValue, NodeKind};

/// How a service presents itself to a reasoning agent
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// Tool description for a service kind
pub fn service_spec(kind: NodeKind) -> Option<ServiceSpec> {
    match kind {
        NodeKind::ReadTextService => Some(ServiceSpec {
            name: "read_text_file",
            description: "Read the content of a text file.",
            parameters: json!({"file_path": "path of the file to read"}),
        }),
        NodeKind::WriteTextService => Some(ServiceSpec {
            name: "write_text_file",
            description: "Write content to a text file, creating parent directories.",
            parameters: json!({
                "file_path": "path of the file to write",
                "content": "text to write"
            }),
        }),
        NodeKind::PythonService => Some(ServiceSpec {
            name: "execute_python_code",
            description: "Execute Python code and return what it prints.",
            parameters: json!({"code": "the Python code to execute"}),
        }),
        _ => None,
    }
}

/// Function-call arguments carried by `input`, if it is a JSON object
pub(crate) fn call_args(input: &FlowValue) -> Option<&Map<String, Value>> {
    match input {
        FlowValue::Data(Value::Object(args)) => Some(args),
        _ => None,
    }
}

/// String argument from a call, falling back to the node's own setting
pub(crate) fn call_str(input: &FlowValue, key: &str, fallback: Option<&str>) -> Option<String> {
    call_args(input)
        .and_then(|args| args.get(key))
        .and_then(Value::as_str)
        .or(fallback)
        .map(str::to_string)
}
