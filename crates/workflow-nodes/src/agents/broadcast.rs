//! Broadcast Agent

use std::sync::Arc;

use async_trait::async_trait;
use workflow_engine::{
    Agent, AgentOperator, BuildContext, FactoryRegistration, FlowValue, Msg, NodeKind,
    NodeRequest, Operator, Role, Scope,
};

/// Speaks its configured content whenever it is asked to reply
pub struct BroadcastAgent {
    name: String,
    content: String,
}

impl BroadcastAgent {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

#[async_trait]
impl Agent for BroadcastAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn reply(&self, _input: FlowValue, scope: &Scope<'_>) -> workflow_engine::Result<Msg> {
        let msg = Msg::new(&self.name, self.content.as_str(), Role::Assistant);
        scope.speak(&msg);
        Ok(msg)
    }

    fn observe(&self, _msg: &Msg) {}
}

fn build(
    request: &NodeRequest<'_>,
    _ctx: &mut BuildContext<'_>,
) -> workflow_engine::Result<Arc<dyn Operator>> {
    let args = request.args();
    let agent = BroadcastAgent::new(args.str_or("name", "Host")?, args.str_or("content", "")?);
    Ok(Arc::new(AgentOperator::new(
        request.node_id,
        NodeKind::BroadcastAgent,
        Arc::new(agent),
    )))
}

inventory::submit!(FactoryRegistration {
    kind: NodeKind::BroadcastAgent,
    factory: build,
});
