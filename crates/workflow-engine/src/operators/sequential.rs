use std::sync::Arc;

use async_trait::async_trait;

use crate::builder::BuildContext;
use crate::error::Result;
use crate::kind::NodeKind;
use crate::operator::{Operator, OperatorId, Outcome, Scope};
use crate::registry::NodeRequest;
use crate::value::FlowValue;

/// Runs its children in order, each output feeding the next input
pub struct SequentialPipeline {
    node_id: String,
    steps: Vec<OperatorId>,
}

impl SequentialPipeline {
    pub fn new(node_id: impl Into<String>, steps: Vec<OperatorId>) -> Self {
        Self {
            node_id: node_id.into(),
            steps,
        }
    }
}

#[async_trait]
impl Operator for SequentialPipeline {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::SequentialPipeline
    }

    fn children(&self) -> Vec<OperatorId> {
        self.steps.clone()
    }

    async fn invoke(&self, input: FlowValue, scope: &Scope<'_>) -> Result<Outcome> {
        let mut value = input;
        for &step in &self.steps {
            value = scope.call(step, value).await?;
        }
        Ok(value.into())
    }
}

pub(crate) fn build(
    request: &NodeRequest<'_>,
    _ctx: &mut BuildContext<'_>,
) -> Result<Arc<dyn Operator>> {
    Ok(Arc::new(SequentialPipeline::new(
        request.node_id,
        request.dependencies.clone(),
    )))
}
