//! Chat and image model clients
//!
//! Model nodes only register configurations; agents resolve a client for a
//! config name through [`chat_model_for`] or [`image_model_for`] when they
//! are constructed.

mod openai;
mod post_api;
mod text_to_image;

pub use openai::OpenAiChat;
pub use post_api::PostApiChat;
pub use text_to_image::{DashScopeImageSynthesis, ImageModel, PostApiDallE};

pub(crate) use post_api::header_map;

use std::sync::Arc;

use serde_json::{json, Value};
use workflow_engine::{value::value_text, ChatModel, ModelRegistry, Msg};

use crate::error::{NodeError, Result};

/// Resolve the chat client for `config_name`
///
/// Clients registered directly on the registry win over clients built from
/// the stored configuration.
pub fn chat_model_for(models: &ModelRegistry, config_name: &str) -> Result<Arc<dyn ChatModel>> {
    if let Some(client) = models.client(config_name) {
        return Ok(client);
    }
    let config = models
        .config(config_name)
        .ok_or_else(|| NodeError::MissingModel(config_name.to_string()))?;

    match config.model_type.as_str() {
        "openai_chat" | "dashscope_chat" => Ok(Arc::new(OpenAiChat::from_config(config)?)),
        "post_api_chat" => Ok(Arc::new(PostApiChat::from_config(config)?)),
        other => Err(NodeError::UnsupportedModel {
            usage: "chat",
            config_name: config_name.to_string(),
            model_type: other.to_string(),
        }),
    }
}

/// Resolve the image client for `config_name`
pub fn image_model_for(models: &ModelRegistry, config_name: &str) -> Result<Arc<dyn ImageModel>> {
    let config = models
        .config(config_name)
        .ok_or_else(|| NodeError::MissingModel(config_name.to_string()))?;

    match config.model_type.as_str() {
        "post_api_dall_e" => Ok(Arc::new(PostApiDallE::from_config(config)?)),
        "dashscope_image_synthesis" => Ok(Arc::new(DashScopeImageSynthesis::from_config(config)?)),
        other => Err(NodeError::UnsupportedModel {
            usage: "image generation",
            config_name: config_name.to_string(),
            model_type: other.to_string(),
        }),
    }
}

/// Messages in the `{role, name, content}` shape chat endpoints accept
pub(crate) fn message_payload(messages: &[Msg]) -> Value {
    Value::Array(
        messages
            .iter()
            .map(|m| {
                json!({
                    "role": m.role.as_str(),
                    "name": m.name,
                    "content": value_text(&m.content),
                })
            })
            .collect(),
    )
}

/// First string found at one of `pointers`
pub(crate) fn text_at(body: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .find_map(|p| body.pointer(p).and_then(Value::as_str))
        .map(str::to_string)
}
