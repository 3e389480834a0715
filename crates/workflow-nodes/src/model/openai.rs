//! OpenAI-compatible chat completions client
//!
//! Serves `openai_chat` and `dashscope_chat` (through DashScope's
//! compatible-mode endpoint).

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use workflow_engine::{ChatModel, ModelConfig, ModelResponse, Msg};

use super::{message_payload, text_at};
use crate::error::{NodeError, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// Client for a `/chat/completions` endpoint
#[derive(Clone)]
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    generate_args: Map<String, Value>,
}

impl OpenAiChat {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            generate_args: Map::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Build from a registered config
    ///
    /// `api_url` / `base_url` override the provider default. A missing
    /// `api_key` falls back to `OPENAI_API_KEY` or `DASHSCOPE_API_KEY`.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let (default_url, key_var) = match config.model_type.as_str() {
            "dashscope_chat" => (DASHSCOPE_BASE_URL, "DASHSCOPE_API_KEY"),
            _ => (OPENAI_BASE_URL, "OPENAI_API_KEY"),
        };
        let base_url = config
            .extra_str("api_url")
            .or_else(|| config.extra_str("base_url"))
            .unwrap_or(default_url);
        let model = config.model_name.clone().ok_or_else(|| {
            NodeError::BadResponse(format!(
                "model config '{}' has no model_name",
                config.config_name
            ))
        })?;

        let mut chat = Self::new(base_url.trim_end_matches('/'), model);
        chat.api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(key_var).ok());
        if let Some(Value::Object(args)) = config.extra.get("generate_args") {
            chat.generate_args = args.clone();
        }
        Ok(chat)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Msg]) -> Result<ModelResponse> {
        let mut body = json!({
            "model": self.model,
            "messages": message_payload(messages),
            "stream": false
        });
        if let Value::Object(fields) = &mut body {
            for (key, value) in &self.generate_args {
                fields.insert(key.clone(), value.clone());
            }
        }

        let url = format!("{}/chat/completions", self.base_url);
        log::debug!("OpenAiChat: sending {} messages to {}", messages.len(), url);

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NodeError::Api { status, body });
        }

        let json: Value = response.json().await?;
        let text = text_at(&json, &["/choices/0/message/content"]).ok_or_else(|| {
            NodeError::BadResponse(format!("no completion text in {}", json))
        })?;
        Ok(ModelResponse {
            text,
            raw: Some(json),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn chat(&self, messages: &[Msg]) -> workflow_engine::Result<ModelResponse> {
        Ok(self.complete(messages).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve_once;
    use workflow_engine::Role;

    #[test]
    fn test_from_config_defaults() {
        let mut config = ModelConfig::new("qwen", "dashscope_chat");
        config.model_name = Some("qwen-max".to_string());
        config.api_key = Some("sk-test".to_string());
        let chat = OpenAiChat::from_config(&config).unwrap();
        assert_eq!(chat.base_url, DASHSCOPE_BASE_URL);
        assert_eq!(chat.model(), "qwen-max");
        assert_eq!(chat.api_key.as_deref(), Some("sk-test"));

        let missing = ModelConfig::new("gpt", "openai_chat");
        assert!(OpenAiChat::from_config(&missing).is_err());
    }

    #[tokio::test]
    async fn test_chat_round_trip() {
        let (url, request) = serve_once(
            200,
            r#"{"choices": [{"message": {"role": "assistant", "content": "pong"}}]}"#,
        )
        .await;
        let mut chat = OpenAiChat::new(url, "local-model").with_api_key("secret");
        chat.generate_args.insert("temperature".to_string(), json!(0.2));

        let reply = chat
            .chat(&[Msg::new("user", "ping", Role::User)])
            .await
            .unwrap();
        assert_eq!(reply.text, "pong");

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /chat/completions"));
        assert!(request.to_lowercase().contains("authorization: bearer secret"));
        assert!(request.contains("\"temperature\":0.2"));
        assert!(request.contains("\"content\":\"ping\""));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let (url, _request) = serve_once(500, "overloaded").await;
        let chat = OpenAiChat::new(url, "m");
        let err = chat.complete(&[]).await.unwrap_err();
        assert!(matches!(err, NodeError::Api { status: 500, ref body } if body == "overloaded"));
    }
}
