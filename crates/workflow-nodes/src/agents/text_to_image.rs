//! Text-to-Image Agent
//!
//! Uses the text of the latest incoming message as the prompt and replies
//! with the generated image URLs, both as content and in `url`.

use std::sync::Arc;

use async_trait::async_trait;
use workflow_engine::{
    Agent, AgentOperator, BuildContext, FactoryRegistration, FlowValue, Memory, Msg, NodeKind,
    NodeRequest, Operator, Role, Scope, WorkflowError,
};

use super::incoming;
use crate::model::{image_model_for, ImageModel};

pub struct TextToImageAgent {
    name: String,
    model: Arc<dyn ImageModel>,
    memory: Memory,
}

impl TextToImageAgent {
    pub fn new(name: impl Into<String>, model: Arc<dyn ImageModel>) -> Self {
        Self {
            name: name.into(),
            model,
            memory: Memory::new(),
        }
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }
}

#[async_trait]
impl Agent for TextToImageAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn reply(&self, input: FlowValue, scope: &Scope<'_>) -> workflow_engine::Result<Msg> {
        let messages = incoming(&input);
        let prompt = messages.last().map(Msg::text).unwrap_or_default();
        self.memory.extend(messages);
        if prompt.is_empty() {
            return Err(WorkflowError::failed(format!(
                "{}: nothing to draw, the input has no text",
                self.name
            )));
        }

        log::debug!("{}: generating images for '{}'", self.name, prompt);
        let urls = self.model.generate(&prompt).await?;
        let msg = Msg::new(&self.name, urls.join("\n"), Role::Assistant).with_url(urls);
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
    let config_name = args.str("model_config_name")?;
    let model = image_model_for(ctx.models(), &config_name).map_err(|e| {
        WorkflowError::invalid_argument(request.node_id, "model_config_name", e.to_string())
    })?;
    let agent = TextToImageAgent::new(args.str("name")?, model);
    Ok(Arc::new(AgentOperator::new(
        request.node_id,
        NodeKind::TextToImageAgent,
        Arc::new(agent),
    )))
}

inventory::submit!(FactoryRegistration {
    kind: NodeKind::TextToImageAgent,
    factory: build,
});
