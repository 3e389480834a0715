//! Dialog Agent

use std::sync::Arc;

use async_trait::async_trait;
use workflow_engine::{
    Agent, AgentOperator, BuildContext, ChatModel, FactoryRegistration, FlowValue, Memory, Msg,
    NodeKind, NodeRequest, Operator, Role, Scope,
};

use super::{incoming, resolve_model, system_message};

/// Replies through a chat model, keeping the conversation in memory
pub struct DialogAgent {
    name: String,
    sys_prompt: Option<Msg>,
    model: Arc<dyn ChatModel>,
    memory: Memory,
}

impl DialogAgent {
    pub fn new(name: impl Into<String>, sys_prompt: Option<&str>, model: Arc<dyn ChatModel>) -> Self {
        let name = name.into();
        Self {
            sys_prompt: system_message(&name, sys_prompt),
            name,
            model,
            memory: Memory::new(),
        }
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }
}

#[async_trait]
impl Agent for DialogAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn reply(&self, input: FlowValue, scope: &Scope<'_>) -> workflow_engine::Result<Msg> {
        self.memory.extend(incoming(&input));

        let prompt: Vec<Msg> = self
            .sys_prompt
            .iter()
            .cloned()
            .chain(self.memory.snapshot())
            .collect();
        let response = self.model.chat(&prompt).await?;

        let msg = Msg::new(&self.name, response.text, Role::Assistant);
        scope.speak(&msg);
        self.memory.add(msg.clone());
        Ok(msg)
    }

    fn observe(&self, msg: &Msg) {
        self.memory.add(msg.clone());
    }
}

fn build(
    request: &NodeRequest<'_>,
    ctx: &mut BuildContext<'_>,
) -> workflow_engine::Result<Arc<dyn Operator>> {
    let args = request.args();
    let agent = DialogAgent::new(
        args.str("name")?,
        args.opt_str("sys_prompt")?.as_deref(),
        resolve_model(request, ctx)?,
    );
    Ok(Arc::new(AgentOperator::new(
        request.node_id,
        NodeKind::DialogAgent,
        Arc::new(agent),
    )))
}

inventory::submit!(FactoryRegistration {
    kind: NodeKind::DialogAgent,
    factory: build,
});
