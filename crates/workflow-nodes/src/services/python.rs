//! Python Service
//!
//! Executes Python code and returns what it printed. A non-zero exit status
//! is reported as an error carrying stderr.

use std::sync::Arc;

use async_trait::async_trait;
use workflow_engine::{
    BuildContext, FactoryRegistration, FlowValue, NodeKind, NodeRequest, Operator, Outcome,
    Scope, WorkflowError,
};

use super::call_str;
use crate::error::NodeError;
use crate::python::{run_python, DEFAULT_TIMEOUT_SECS};

pub struct PythonService {
    node_id: String,
    timeout_secs: u64,
}

impl PythonService {
    pub fn new(node_id: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            node_id: node_id.into(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl Operator for PythonService {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::PythonService
    }

    async fn invoke(&self, input: FlowValue, _scope: &Scope<'_>) -> workflow_engine::Result<Outcome> {
        let code = call_str(&input, "code", None).unwrap_or_else(|| input.text());
        if code.trim().is_empty() {
            return Err(WorkflowError::invalid_argument(
                &self.node_id,
                "code",
                "no code to execute",
            ));
        }

        let output = run_python(&code, self.timeout_secs).await?;
        if !output.success() {
            return Err(NodeError::Process(format!(
                "python exited with {}: {}",
                output.exit_code,
                output.stderr.trim()
            ))
            .into());
        }
        Ok(FlowValue::from(output.stdout).into())
    }
}

fn build(
    request: &NodeRequest<'_>,
    _ctx: &mut BuildContext<'_>,
) -> workflow_engine::Result<Arc<dyn Operator>> {
    let timeout_secs = request
        .args()
        .opt_u64("timeout")?
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    Ok(Arc::new(PythonService::new(request.node_id, timeout_secs)))
}

inventory::submit!(FactoryRegistration {
    kind: NodeKind::PythonService,
    factory: build,
});
