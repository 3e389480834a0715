//! Copy and placeholder nodes

use std::sync::Arc;

use async_trait::async_trait;

use crate::builder::BuildContext;
use crate::error::Result;
use crate::kind::NodeKind;
use crate::operator::{Operator, OperatorId, Outcome, Scope};
use crate::registry::NodeRequest;
use crate::value::FlowValue;

/// Identity pass-through
pub struct Placeholder {
    node_id: String,
}

impl Placeholder {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }
}

#[async_trait]
impl Operator for Placeholder {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Placeholder
    }

    async fn invoke(&self, input: FlowValue, _scope: &Scope<'_>) -> Result<Outcome> {
        Ok(input.into())
    }
}

pub(crate) fn build_placeholder(
    request: &NodeRequest<'_>,
    _ctx: &mut BuildContext<'_>,
) -> Result<Arc<dyn Operator>> {
    Ok(Arc::new(Placeholder::new(request.node_id)))
}

/// Stands in for another operator
///
/// Holds only the handle of its source; every invocation runs the source
/// again, so two graph positions share one operator and its state.
pub struct CopyOperator {
    node_id: String,
    source: OperatorId,
    var_name: String,
}

#[async_trait]
impl Operator for CopyOperator {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Copy
    }

    fn var_name(&self) -> String {
        self.var_name.clone()
    }

    fn alias_of(&self) -> Option<OperatorId> {
        Some(self.source)
    }

    async fn invoke(&self, input: FlowValue, scope: &Scope<'_>) -> Result<Outcome> {
        scope.invoke(self.source, input).await
    }
}

pub(crate) fn build_copy(
    request: &NodeRequest<'_>,
    ctx: &mut BuildContext<'_>,
) -> Result<Arc<dyn Operator>> {
    request.expect_dependencies(1, 1)?;
    let source = ctx.operators().resolve(request.dependencies[0]);
    let var_name = ctx.operator(source)?.var_name();
    Ok(Arc::new(CopyOperator {
        node_id: request.node_id.to_string(),
        source,
        var_name,
    }))
}
