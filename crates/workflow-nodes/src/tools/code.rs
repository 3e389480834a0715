//! Code Tool
//!
//! Wraps the user's code in a small driver program. The driver decodes the
//! node inputs from JSON, calls the user's `main(*inputs)`, and prints the
//! JSON-encoded result between two `<<RESULT>>` markers so it can be told
//! apart from anything else the code prints.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use workflow_engine::{
    BuildContext, FactoryRegistration, FlowValue, NodeKind, NodeRequest, Operator, Outcome,
    Scope, WorkflowError,
};

use crate::error::NodeError;
use crate::python::{run_python, DEFAULT_TIMEOUT_SECS};

const RESULT_TAG: &str = "<<RESULT>>";

pub struct CodeTool {
    node_id: String,
    code: String,
    timeout_secs: u64,
}

impl CodeTool {
    pub fn new(node_id: impl Into<String>, code: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            node_id: node_id.into(),
            code: code.into(),
            timeout_secs,
        }
    }
}

/// Positional arguments for `main`: a single value becomes a one-element
/// list, several predecessors keep their order, no input means none
fn inputs_of(input: &FlowValue) -> Value {
    match input {
        FlowValue::List(items) => Value::Array(items.iter().map(FlowValue::to_json).collect()),
        other if other.is_null() => Value::Array(Vec::new()),
        other => Value::Array(vec![other.to_json()]),
    }
}

/// The full program for `code` applied to `inputs`
pub fn render_program(code: &str, inputs: &Value) -> Result<String, NodeError> {
    // Inputs travel as a Python string literal holding JSON
    let literal = serde_json::to_string(&Value::String(serde_json::to_string(inputs)?))?;
    Ok(format!(
        "{code}\n\
         import json\n\
         \n\
         inputs_obj = json.loads({literal})\n\
         output_obj = main(*inputs_obj)\n\
         output_json = json.dumps(output_obj, indent=4)\n\
         print('{tag}' + output_json + '{tag}')\n",
        code = code,
        literal = literal,
        tag = RESULT_TAG,
    ))
}

/// Parse the JSON between the first and last result markers of `stdout`
pub fn extract_result(node_id: &str, stdout: &str) -> workflow_engine::Result<Value> {
    let unreadable = |message: String| WorkflowError::ValueExtraction {
        node_id: node_id.to_string(),
        message,
    };
    let start = stdout
        .find(RESULT_TAG)
        .ok_or_else(|| unreadable("no result marker in output".to_string()))?;
    let end = stdout
        .rfind(RESULT_TAG)
        .filter(|end| *end > start)
        .ok_or_else(|| unreadable("unterminated result marker".to_string()))?;
    let body = &stdout[start + RESULT_TAG.len()..end];
    serde_json::from_str(body.trim()).map_err(|e| unreadable(format!("invalid JSON result: {}", e)))
}

#[async_trait]
impl Operator for CodeTool {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Code
    }

    async fn invoke(&self, input: FlowValue, _scope: &Scope<'_>) -> workflow_engine::Result<Outcome> {
        let program = render_program(&self.code, &inputs_of(&input))?;
        let output = run_python(&program, self.timeout_secs).await?;
        if !output.success() {
            return Err(NodeError::Process(format!(
                "Code id: {}, error executing: {}",
                self.node_id,
                output.stderr.trim()
            ))
            .into());
        }
        let result = extract_result(&self.node_id, &output.stdout)?;
        log::debug!("Code {} returned {}", self.node_id, result);
        Ok(FlowValue::from(result).into())
    }
}

fn build(
    request: &NodeRequest<'_>,
    _ctx: &mut BuildContext<'_>,
) -> workflow_engine::Result<Arc<dyn Operator>> {
    let args = request.args();
    let code = args.str_or("code", "")?;
    let timeout_secs = args.opt_u64("timeout")?.unwrap_or(DEFAULT_TIMEOUT_SECS);
    Ok(Arc::new(CodeTool::new(request.node_id, code, timeout_secs)))
}

inventory::submit!(FactoryRegistration {
    kind: NodeKind::Code,
    factory: build,
});

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use workflow_engine::{Msg, NullEventSink, OperatorTable, Role};

    #[test]
    fn test_extract_between_first_and_last_marker() {
        let stdout = "debug line\n<<RESULT>>{\"a\": \"<<RESULT>>\"}<<RESULT>>\n";
        assert_eq!(extract_result("5", stdout).unwrap(), json!({"a": "<<RESULT>>"}));
    }

    #[test]
    fn test_missing_marker_is_extraction_error() {
        let err = extract_result("5", "nothing here").unwrap_err();
        assert!(matches!(err, WorkflowError::ValueExtraction { ref node_id, .. } if node_id == "5"));
        assert_eq!(err.node_id(), Some("5"));

        let err = extract_result("5", "<<RESULT>>{}").unwrap_err();
        assert!(matches!(err, WorkflowError::ValueExtraction { .. }));
    }

    #[test]
    fn test_inputs_shape() {
        assert_eq!(inputs_of(&FlowValue::Null), json!([]));
        assert_eq!(inputs_of(&FlowValue::from(json!(3))), json!([3]));
        let list = FlowValue::List(vec![json!(1).into(), json!("x").into()]);
        assert_eq!(inputs_of(&list), json!([1, "x"]));
    }

    #[test]
    fn test_program_embeds_inputs_as_string_literal() {
        let program = render_program("def main(x):\n    return x", &json!([null, "q\"uote"])).unwrap();
        assert!(program.starts_with("def main(x):"));
        assert!(program.contains(r#"json.loads("[null,\"q\\\"uote\"]")"#));
    }

    #[tokio::test]
    async fn test_runs_main_over_inputs() {
        if which::which("python3").is_err() {
            return;
        }
        let table = OperatorTable::new();
        let scope = Scope::new(&table, &NullEventSink, "r");
        let code = "def main(msg, n):\n    print('noise')\n    return {'who': msg['name'], 'n': n + 1, 'none': None}";
        let tool = CodeTool::new("c", code, 30);

        let input = FlowValue::List(vec![
            Msg::new("Alice", "hi", Role::User).into(),
            json!(41).into(),
        ]);
        let out = tool.invoke(input, &scope).await.unwrap();
        assert_eq!(out.value, FlowValue::from(json!({"who": "Alice", "n": 42, "none": null})));
    }

    #[tokio::test]
    async fn test_failing_code_reports_node() {
        if which::which("python3").is_err() {
            return;
        }
        let table = OperatorTable::new();
        let scope = Scope::new(&table, &NullEventSink, "r");
        let tool = CodeTool::new("c9", "def main():\n    raise ValueError('bad')", 30);
        let err = tool.invoke(FlowValue::Null, &scope).await.unwrap_err();
        assert!(err.to_string().contains("Code id: c9"));
    }
}
