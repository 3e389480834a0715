//! ReAct Agent
//!
//! Alternates between asking the model what to do and running the Service
//! nodes it asks for. Every model turn must be a JSON object:
//!
//! ```json
//! {"thought": "...", "speak": "...", "function": [{"name": "...", "arguments": {}}]}
//! ```
//!
//! Function results (errors included) go back into memory as system
//! messages. The loop ends on a turn with no function calls, or after
//! `max_iters` turns, when the model is asked for a direct answer.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use workflow_engine::{
    value::value_text, Agent, AgentOperator, BuildContext, ChatModel, FactoryRegistration,
    FlowValue, Memory, Msg, NodeCategory, NodeKind, NodeRequest, Operator, OperatorId, Role,
    Scope, WorkflowError,
};

use super::{incoming, parse_json_object, resolve_model};
use crate::services::{service_spec, ServiceSpec};

pub const DEFAULT_MAX_ITERS: u64 = 10;

const FORMAT_HINT: &str = "Respond with a JSON object containing \"thought\", \"speak\" and \
\"function\". \"function\" lists the calls to make as {\"name\": ..., \"arguments\": {...}}; \
leave it empty once the task is done.";

const SUMMARY_HINT: &str = "You have used up your iterations. Respond to the user directly, \
without calling any function.";

/// A service the agent may call
#[derive(Debug, Clone)]
pub struct Tool {
    pub spec: ServiceSpec,
    pub operator: OperatorId,
}

pub struct ReActAgent {
    name: String,
    sys_prompt: Msg,
    model: Arc<dyn ChatModel>,
    tools: Vec<Tool>,
    max_iters: u64,
    memory: Memory,
}

impl ReActAgent {
    pub fn new(
        name: impl Into<String>,
        sys_prompt: &str,
        model: Arc<dyn ChatModel>,
        tools: Vec<Tool>,
        max_iters: u64,
    ) -> Self {
        let name = name.into();
        let prompt = Self::instructions(sys_prompt, &tools);
        Self {
            sys_prompt: Msg::new(&name, prompt, Role::System),
            name,
            model,
            tools,
            max_iters,
            memory: Memory::new(),
        }
    }

    fn instructions(sys_prompt: &str, tools: &[Tool]) -> String {
        let mut text = String::new();
        if !sys_prompt.is_empty() {
            text.push_str(sys_prompt);
            text.push_str("\n\n");
        }
        text.push_str("## Tool Functions:\n");
        for (i, tool) in tools.iter().enumerate() {
            text.push_str(&format!(
                "{}. {}: {}\n    Arguments: {}\n",
                i + 1,
                tool.spec.name,
                tool.spec.description,
                tool.spec.parameters
            ));
        }
        text.push_str("\n## What You Should Do:\n");
        text.push_str(FORMAT_HINT);
        text
    }

    fn prompt(&self) -> Vec<Msg> {
        std::iter::once(self.sys_prompt.clone())
            .chain(self.memory.snapshot())
            .collect()
    }

    /// Run each requested function and record the results
    async fn execute(&self, calls: &[Value], scope: &Scope<'_>) {
        let mut report = String::from("Execution Results:\n");
        for (i, call) in calls.iter().enumerate() {
            let name = call.get("name").and_then(Value::as_str).unwrap_or_default();
            let arguments = call
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));

            let result = match self.tools.iter().find(|t| t.spec.name == name) {
                Some(tool) => scope
                    .call(tool.operator, FlowValue::from(arguments))
                    .await
                    .map(|value| value.text()),
                None => Err(WorkflowError::failed(format!("unknown function '{}'", name))),
            };
            let (status, output) = match result {
                Ok(text) => ("SUCCESS", text),
                Err(e) => {
                    log::warn!("{}: function '{}' failed: {}", self.name, name, e);
                    ("ERROR", e.to_string())
                }
            };
            report.push_str(&format!(
                "{}. {}:\n    [STATUS]: {}\n    [RESULT]: {}\n",
                i + 1,
                name,
                status,
                output
            ));
        }

        let msg = Msg::new("system", report, Role::System);
        scope.speak(&msg);
        self.memory.add(msg);
    }
}

#[async_trait]
impl Agent for ReActAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn reply(&self, input: FlowValue, scope: &Scope<'_>) -> workflow_engine::Result<Msg> {
        self.memory.extend(incoming(&input));

        for iteration in 0..self.max_iters {
            let response = self.model.chat(&self.prompt()).await?;
            let Some(turn) = parse_json_object(&response.text) else {
                log::warn!(
                    "{}: iteration {} response is not a JSON object",
                    self.name,
                    iteration + 1
                );
                self.memory
                    .add(Msg::new("system", FORMAT_HINT, Role::System));
                continue;
            };

            let speak = turn
                .get("speak")
                .map(value_text)
                .unwrap_or_default();
            let calls = match turn.get("function") {
                Some(Value::Array(calls)) => calls.clone(),
                _ => Vec::new(),
            };
            let msg = Msg::new(&self.name, speak, Role::Assistant)
                .with_metadata(Value::Object(turn));
            scope.speak(&msg);
            self.memory.add(msg.clone());

            if calls.is_empty() {
                return Ok(msg);
            }
            self.execute(&calls, scope).await;
        }

        log::debug!("{}: reached {} iterations, summarizing", self.name, self.max_iters);
        self.memory.add(Msg::new("system", SUMMARY_HINT, Role::System));
        let response = self.model.chat(&self.prompt()).await?;
        let text = parse_json_object(&response.text)
            .and_then(|turn| turn.get("speak").map(value_text))
            .unwrap_or(response.text);
        let msg = Msg::new(&self.name, text, Role::Assistant);
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
    if request.dependencies.is_empty() {
        return Err(WorkflowError::invalid_argument(
            request.node_id,
            "elements",
            "ReActAgent needs at least one Service node as a tool",
        ));
    }

    let mut tools = Vec::new();
    for &dependency in &request.dependencies {
        let resolved = ctx.operators().resolve(dependency);
        let operator = ctx.operator(resolved)?;
        let spec = (operator.category() == NodeCategory::Service)
            .then(|| service_spec(operator.kind()))
            .flatten()
            .ok_or_else(|| {
                WorkflowError::invalid_argument(
                    request.node_id,
                    "elements",
                    format!("'{}' is not a Service node", operator.node_id()),
                )
            })?;
        tools.push(Tool {
            spec,
            operator: dependency,
        });
    }

    let agent = ReActAgent::new(
        args.str("name")?,
        &args.str_or("sys_prompt", "")?,
        resolve_model(request, ctx)?,
        tools,
        args.opt_u64("max_iters")?.unwrap_or(DEFAULT_MAX_ITERS),
    );
    Ok(Arc::new(AgentOperator::new(
        request.node_id,
        NodeKind::ReActAgent,
        Arc::new(agent),
    )))
}

inventory::submit!(FactoryRegistration {
    kind: NodeKind::ReActAgent,
    factory: build,
});
