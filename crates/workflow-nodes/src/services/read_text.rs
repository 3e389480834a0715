//! Read Text Service
//!
//! Reads a UTF-8 text file and returns its content.

use std::sync::Arc;

use async_trait::async_trait;
use workflow_engine::{
    BuildContext, FactoryRegistration, FlowValue, NodeKind, NodeRequest, Operator, Outcome,
    Scope, WorkflowError,
};

use super::call_str;
use crate::error::NodeError;

pub struct ReadTextService {
    node_id: String,
    file_path: Option<String>,
}

impl ReadTextService {
    pub fn new(node_id: impl Into<String>, file_path: Option<String>) -> Self {
        Self {
            node_id: node_id.into(),
            file_path,
        }
    }
}

#[async_trait]
impl Operator for ReadTextService {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::ReadTextService
    }

    async fn invoke(&self, input: FlowValue, _scope: &Scope<'_>) -> workflow_engine::Result<Outcome> {
        let path = call_str(&input, "file_path", self.file_path.as_deref())
            .or_else(|| Some(input.text()).filter(|t| !t.is_empty()))
            .ok_or_else(|| {
                WorkflowError::invalid_argument(&self.node_id, "file_path", "no file to read")
            })?;

        log::debug!("ReadTextService {}: reading '{}'", self.node_id, path);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(NodeError::from)?;
        Ok(FlowValue::from(content).into())
    }
}

fn build(
    request: &NodeRequest<'_>,
    _ctx: &mut BuildContext<'_>,
) -> workflow_engine::Result<Arc<dyn Operator>> {
    let file_path = request.args().opt_str("file_path")?;
    Ok(Arc::new(ReadTextService::new(request.node_id, file_path)))
}

inventory::submit!(FactoryRegistration {
    kind: NodeKind::ReadTextService,
    factory: build,
});
