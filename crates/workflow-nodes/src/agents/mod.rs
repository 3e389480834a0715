//! Agent nodes
//!
//! Each agent implements the engine's [`Agent`](workflow_engine::Agent)
//! trait and is wrapped in an `AgentOperator` by its factory, which lets
//! broadcast scopes deliver messages to it.
//!
//! - `DialogAgent`: chat-model conversation with memory
//! - `DictDialogAgent`: like `DialogAgent`, answering with a JSON object
//! - `UserAgent`: reads a line from the user
//! - `ReActAgent`: reasoning/acting loop over Service nodes
//! - `BroadcastAgent`: speaks fixed content
//! - `TextToImageAgent`: draws the incoming text with an image model

mod broadcast;
mod dialog;
mod dict_dialog;
mod react;
mod text_to_image;
mod user;

pub use broadcast::BroadcastAgent;
pub use dialog::DialogAgent;
pub use dict_dialog::DictDialogAgent;
pub use react::{ReActAgent, Tool};
pub use text_to_image::TextToImageAgent;
pub use user::{shared_stdin, LineSource, ScriptedLines, StdinLines, UserAgent};

use std::sync::Arc;

use serde_json::{Map, Value};
use workflow_engine::{
    BuildContext, ChatModel, FlowValue, Msg, NodeRequest, Role, WorkflowError,
};

use crate::model::chat_model_for;

/// Messages an agent takes in from its input: the messages carried by
/// the value, or the value itself as a user message
pub(crate) fn incoming(input: &FlowValue) -> Vec<Msg> {
    let messages = input.messages();
    if !messages.is_empty() || input.is_null() {
        return messages;
    }
    vec![Msg::new("user", input.content(), Role::User)]
}

/// System message for `sys_prompt`, if any
pub(crate) fn system_message(name: &str, sys_prompt: Option<&str>) -> Option<Msg> {
    sys_prompt
        .filter(|p| !p.is_empty())
        .map(|p| Msg::new(name, p, Role::System))
}

/// Chat client for the node's `model_config_name`
pub(crate) fn resolve_model(
    request: &NodeRequest<'_>,
    ctx: &BuildContext<'_>,
) -> workflow_engine::Result<Arc<dyn ChatModel>> {
    let config_name = request.args().str("model_config_name")?;
    chat_model_for(ctx.models(), &config_name).map_err(|e| {
        WorkflowError::invalid_argument(request.node_id, "model_config_name", e.to_string())
    })
}

/// Extract a JSON object from model output that may wrap it in prose or
/// a fenced code block
pub(crate) fn parse_json_object(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
