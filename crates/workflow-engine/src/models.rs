//! Model configurations and chat model clients
//!
//! Model nodes register a [`ModelConfig`] under its `config_name` while the
//! graph is built; agents look the config up by name afterwards. The
//! registry is owned by the caller and threaded through builds, so a
//! long-lived process can keep one across runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::value::Msg;

/// A named model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub config_name: String,
    pub model_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Provider-specific settings (endpoints, generation args, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelConfig {
    pub fn new(config_name: impl Into<String>, model_type: impl Into<String>) -> Self {
        Self {
            config_name: config_name.into(),
            model_type: model_type.into(),
            model_name: None,
            api_key: None,
            extra: Map::new(),
        }
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

/// Text produced by a chat model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    /// Provider response body, when available
    pub raw: Option<Value>,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            raw: None,
        }
    }
}

/// A chat-completion backend
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, messages: &[Msg]) -> Result<ModelResponse>;
}

/// Model configurations (and optional client overrides) by config name
#[derive(Default, Clone)]
pub struct ModelRegistry {
    configs: HashMap<String, ModelConfig>,
    clients: HashMap<String, Arc<dyn ChatModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_config(&mut self, config: ModelConfig) {
        if self.configs.contains_key(&config.config_name) {
            log::warn!(
                "Model config '{}' registered again, replacing the previous entry",
                config.config_name
            );
        }
        log::debug!(
            "Registered model config '{}' ({})",
            config.config_name,
            config.model_type
        );
        self.configs.insert(config.config_name.clone(), config);
    }

    /// Bind a client to a config name, taking precedence over any client
    /// derived from the config itself
    pub fn register_client(&mut self, config_name: impl Into<String>, client: Arc<dyn ChatModel>) {
        self.clients.insert(config_name.into(), client);
    }

    pub fn config(&self, config_name: &str) -> Option<&ModelConfig> {
        self.configs.get(config_name)
    }

    pub fn client(&self, config_name: &str) -> Option<Arc<dyn ChatModel>> {
        self.clients.get(config_name).cloned()
    }

    pub fn contains(&self, config_name: &str) -> bool {
        self.configs.contains_key(config_name) || self.clients.contains_key(config_name)
    }

    pub fn config_names(&self) -> Vec<&str> {
        self.configs.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("configs", &self.configs.keys().collect::<Vec<_>>())
            .field("clients", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}
