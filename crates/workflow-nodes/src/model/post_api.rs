//! Generic JSON POST chat client (`post_api_chat`)

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use workflow_engine::{ChatModel, ModelConfig, ModelResponse, Msg};

use super::{message_payload, text_at};
use crate::error::{NodeError, Result};

/// Where completion text is looked for in the response body, in order
const TEXT_POINTERS: &[&str] = &[
    "/choices/0/message/content",
    "/data/response/choices/0/message/content",
    "/output/text",
    "/output/choices/0/message/content",
    "/text",
    "/response",
];

pub struct PostApiChat {
    client: reqwest::Client,
    api_url: String,
    headers: HeaderMap,
    json_args: Map<String, Value>,
    messages_key: String,
}

impl PostApiChat {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            headers: HeaderMap::new(),
            json_args: Map::new(),
            messages_key: "messages".to_string(),
        }
    }

    /// Build from a config with `api_url` and optional `headers`,
    /// `json_args` and `messages_key`
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_url = config.extra_str("api_url").ok_or_else(|| {
            NodeError::BadResponse(format!(
                "model config '{}' has no api_url",
                config.config_name
            ))
        })?;
        let mut chat = Self::new(api_url);

        if let Some(Value::Object(headers)) = config.extra.get("headers") {
            chat.headers = header_map(headers)?;
        }
        if let Some(Value::Object(args)) = config.extra.get("json_args") {
            chat.json_args = args.clone();
        }
        if let Some(name) = &config.model_name {
            chat.json_args
                .entry("model")
                .or_insert_with(|| Value::String(name.clone()));
        }
        if let Some(key) = config.extra_str("messages_key") {
            chat.messages_key = key.to_string();
        }
        Ok(chat)
    }

    async fn complete(&self, messages: &[Msg]) -> Result<ModelResponse> {
        let mut body = self.json_args.clone();
        body.insert(self.messages_key.clone(), message_payload(messages));

        log::debug!("PostApiChat: posting {} messages to {}", messages.len(), self.api_url);
        let response = self
            .client
            .post(&self.api_url)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NodeError::Api { status, body });
        }

        let json: Value = response.json().await?;
        let text = text_at(&json, TEXT_POINTERS)
            .ok_or_else(|| NodeError::BadResponse(format!("no completion text in {}", json)))?;
        Ok(ModelResponse {
            text,
            raw: Some(json),
        })
    }
}

#[async_trait]
impl ChatModel for PostApiChat {
    async fn chat(&self, messages: &[Msg]) -> workflow_engine::Result<ModelResponse> {
        Ok(self.complete(messages).await?)
    }
}

/// Convert a JSON object of string values into request headers
pub(crate) fn header_map(headers: &Map<String, Value>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| NodeError::BadResponse(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|e| NodeError::BadResponse(format!("invalid header value: {}", e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve_once;
    use serde_json::json;
    use workflow_engine::Role;

    #[tokio::test]
    async fn test_posts_json_args_with_messages() {
        let (url, request) = serve_once(200, r#"{"output": {"text": "hello there"}}"#).await;
        let config: ModelConfig = serde_json::from_value(json!({
            "config_name": "local",
            "model_type": "post_api_chat",
            "api_url": url,
            "headers": {"X-Token": "abc"},
            "json_args": {"max_tokens": 16},
            "messages_key": "input"
        }))
        .unwrap();
        let chat = PostApiChat::from_config(&config).unwrap();

        let reply = chat.chat(&[Msg::new("user", "hi", Role::User)]).await.unwrap();
        assert_eq!(reply.text, "hello there");

        let request = request.await.unwrap();
        assert!(request.to_lowercase().contains("x-token: abc"));
        assert!(request.contains("\"max_tokens\":16"));
        assert!(request.contains("\"input\":[{"));
    }

    #[test]
    fn test_requires_api_url() {
        let config = ModelConfig::new("local", "post_api_chat");
        assert!(PostApiChat::from_config(&config).is_err());
    }
}
