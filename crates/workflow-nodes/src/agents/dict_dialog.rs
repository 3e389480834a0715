//! Dict Dialog Agent
//!
//! A dialog agent whose model must answer with a JSON object. The
//! object's `speak` field becomes the reply content (the whole object when
//! there is none) and the parsed object is attached as metadata. Answers
//! that do not parse are retried up to `max_retries` times.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use workflow_engine::{
    Agent, AgentOperator, BuildContext, ChatModel, FactoryRegistration, FlowValue, Memory, Msg,
    NodeKind, NodeRequest, Operator, Role, Scope,
};

use super::{incoming, parse_json_object, resolve_model, system_message};
use crate::error::NodeError;

pub const DEFAULT_MAX_RETRIES: u64 = 3;

pub struct DictDialogAgent {
    name: String,
    sys_prompt: Option<Msg>,
    model: Arc<dyn ChatModel>,
    memory: Memory,
    max_retries: u64,
}

impl DictDialogAgent {
    pub fn new(name: impl Into<String>, sys_prompt: Option<&str>, model: Arc<dyn ChatModel>) -> Self {
        let name = name.into();
        Self {
            sys_prompt: system_message(&name, sys_prompt),
            name,
            model,
            memory: Memory::new(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u64) -> Self {
        self.max_retries = max_retries;
        self
    }
}

#[async_trait]
impl Agent for DictDialogAgent {
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

        let mut attempt = 0;
        let parsed = loop {
            let response = self.model.chat(&prompt).await?;
            if let Some(parsed) = parse_json_object(&response.text) {
                break parsed;
            }
            attempt += 1;
            if attempt > self.max_retries {
                return Err(NodeError::BadResponse(format!(
                    "{} did not answer with a JSON object: {}",
                    self.name, response.text
                ))
                .into());
            }
            log::warn!(
                "{}: response is not a JSON object, retrying ({}/{})",
                self.name,
                attempt,
                self.max_retries
            );
        };

        let metadata = Value::Object(parsed.clone());
        let content = match parsed.get("speak") {
            Some(speak) => speak.clone(),
            None => metadata.clone(),
        };
        let msg = Msg::new(&self.name, content, Role::Assistant).with_metadata(metadata);
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
    let agent = DictDialogAgent::new(
        args.str("name")?,
        args.opt_str("sys_prompt")?.as_deref(),
        resolve_model(request, ctx)?,
    )
    .with_max_retries(args.opt_u64("max_retries")?.unwrap_or(DEFAULT_MAX_RETRIES));
    Ok(Arc::new(AgentOperator::new(
        request.node_id,
        NodeKind::DictDialogAgent,
        Arc::new(agent),
    )))
}

inventory::submit!(FactoryRegistration {
    kind: NodeKind::DictDialogAgent,
    factory: build,
});
