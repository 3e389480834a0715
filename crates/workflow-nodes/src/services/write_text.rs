//! Write Text Service

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use workflow_engine::{
    BuildContext, FactoryRegistration, FlowValue, NodeKind, NodeRequest, Operator, Outcome,
    Scope, WorkflowError,
};

use super::call_str;
use crate::error::NodeError;

/// Writes text to a file, creating parent directories
pub struct WriteTextService {
    node_id: String,
    file_path: Option<String>,
    content: Option<String>,
}

impl WriteTextService {
    pub fn new(node_id: impl Into<String>, file_path: Option<String>, content: Option<String>) -> Self {
        Self {
            node_id: node_id.into(),
            file_path,
            content,
        }
    }
}

#[async_trait]
impl Operator for WriteTextService {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::WriteTextService
    }

    async fn invoke(&self, input: FlowValue, _scope: &Scope<'_>) -> workflow_engine::Result<Outcome> {
        let path = call_str(&input, "file_path", self.file_path.as_deref()).ok_or_else(|| {
            WorkflowError::invalid_argument(&self.node_id, "file_path", "no file to write")
        })?;
        let content = call_str(&input, "content", self.content.as_deref())
            .unwrap_or_else(|| input.text());

        if let Some(parent) = Path::new(&path).parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(NodeError::from)?;
        }
        tokio::fs::write(&path, content.as_bytes())
            .await
            .map_err(NodeError::from)?;

        log::debug!(
            "WriteTextService {}: wrote {} bytes to '{}'",
            self.node_id,
            content.len(),
            path
        );
        Ok(FlowValue::from(format!("Success writing to {}", path)).into())
    }
}

fn build(
    request: &NodeRequest<'_>,
    _ctx: &mut BuildContext<'_>,
) -> workflow_engine::Result<Arc<dyn Operator>> {
    let args = request.args();
    Ok(Arc::new(WriteTextService::new(
        request.node_id,
        args.opt_str("file_path")?,
        args.opt_str("content")?,
    )))
}

inventory::submit!(FactoryRegistration {
    kind: NodeKind::WriteTextService,
    factory: build,
});
