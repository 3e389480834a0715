//! Text-to-image model clients
//!
//! `post_api_dall_e` posts the prompt to a DALL-E style endpoint and reads
//! the image URLs from the answer. `dashscope_image_synthesis` submits an
//! asynchronous DashScope task and polls it until the images are ready.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{json, Map, Value};
use workflow_engine::ModelConfig;

use super::header_map;
use crate::error::{NodeError, Result};

const DASHSCOPE_API_URL: &str = "https://dashscope.aliyuncs.com/api/v1";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_POLLS: u32 = 300;

/// Where image lists are looked for in a DALL-E style response body
const IMAGE_LIST_POINTERS: &[&str] = &["/data/response/data", "/data", "/output/results"];

/// A model that turns a prompt into image URLs
#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Vec<String>>;
}

/// `url` of every entry in the first image list found in `body`
fn image_urls(body: &Value, pointers: &[&str]) -> Vec<String> {
    pointers
        .iter()
        .filter_map(|p| body.pointer(p).and_then(Value::as_array))
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("url").and_then(Value::as_str))
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .find(|urls| !urls.is_empty())
        .unwrap_or_default()
}

async fn check_status(response: reqwest::Response) -> Result<Value> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(NodeError::Api { status, body });
    }
    Ok(response.json().await?)
}

/// DALL-E style JSON POST endpoint
pub struct PostApiDallE {
    client: reqwest::Client,
    api_url: String,
    headers: HeaderMap,
    json_args: Map<String, Value>,
}

impl PostApiDallE {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            headers: HeaderMap::new(),
            json_args: Map::new(),
        }
    }

    /// Build from a config with `api_url` and optional `headers` and
    /// `json_args`
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_url = config.extra_str("api_url").ok_or_else(|| {
            NodeError::BadResponse(format!(
                "model config '{}' has no api_url",
                config.config_name
            ))
        })?;
        let mut model = Self::new(api_url);
        if let Some(Value::Object(headers)) = config.extra.get("headers") {
            model.headers = header_map(headers)?;
        }
        if let Some(Value::Object(args)) = config.extra.get("json_args") {
            model.json_args = args.clone();
        }
        if let Some(name) = &config.model_name {
            model
                .json_args
                .entry("model")
                .or_insert_with(|| Value::String(name.clone()));
        }
        Ok(model)
    }
}

#[async_trait]
impl ImageModel for PostApiDallE {
    async fn generate(&self, prompt: &str) -> Result<Vec<String>> {
        let mut body = self.json_args.clone();
        body.insert("prompt".to_string(), Value::String(prompt.to_string()));

        log::debug!("PostApiDallE: requesting images from {}", self.api_url);
        let response = self
            .client
            .post(&self.api_url)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await?;
        let json = check_status(response).await?;

        let urls = image_urls(&json, IMAGE_LIST_POINTERS);
        if urls.is_empty() {
            return Err(NodeError::BadResponse(format!("no image urls in {}", json)));
        }
        Ok(urls)
    }
}

/// DashScope asynchronous text-to-image synthesis
pub struct DashScopeImageSynthesis {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    parameters: Map<String, Value>,
    poll_interval: Duration,
    max_polls: u32,
}

impl DashScopeImageSynthesis {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            parameters: Map::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Build from a registered config
    ///
    /// `base_url` overrides the public endpoint and `generate_args` become
    /// the task parameters (`n`, `size`, ...). A missing `api_key` falls
    /// back to `DASHSCOPE_API_KEY`.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let model = config.model_name.clone().ok_or_else(|| {
            NodeError::BadResponse(format!(
                "model config '{}' has no model_name",
                config.config_name
            ))
        })?;
        let base_url = config.extra_str("base_url").unwrap_or(DASHSCOPE_API_URL);

        let mut synthesis = Self::new(base_url.trim_end_matches('/'), model);
        synthesis.api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("DASHSCOPE_API_KEY").ok());
        if let Some(Value::Object(args)) = config.extra.get("generate_args") {
            synthesis.parameters = args.clone();
        }
        if let Some(max_polls) = config.extra.get("max_polls").and_then(Value::as_u64) {
            synthesis.max_polls = u32::try_from(max_polls).unwrap_or(u32::MAX);
        }
        Ok(synthesis)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn submit(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "input": {"prompt": prompt},
            "parameters": self.parameters,
        });
        let url = format!("{}/services/aigc/text2image/image-synthesis", self.base_url);
        let response = self
            .authorized(self.client.post(&url))
            .header("X-DashScope-Async", "enable")
            .json(&body)
            .send()
            .await?;
        let json = check_status(response).await?;
        json.pointer("/output/task_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| NodeError::BadResponse(format!("no task_id in {}", json)))
    }
}

#[async_trait]
impl ImageModel for DashScopeImageSynthesis {
    async fn generate(&self, prompt: &str) -> Result<Vec<String>> {
        let task_id = self.submit(prompt).await?;
        log::debug!("DashScope image task {} submitted", task_id);

        let url = format!("{}/tasks/{}", self.base_url, task_id);
        for _ in 0..self.max_polls {
            let response = self.authorized(self.client.get(&url)).send().await?;
            let json = check_status(response).await?;
            let status = json
                .pointer("/output/task_status")
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN");
            match status {
                "SUCCEEDED" => {
                    let urls = image_urls(&json, &["/output/results"]);
                    if urls.is_empty() {
                        return Err(NodeError::BadResponse(format!(
                            "task {} succeeded without images",
                            task_id
                        )));
                    }
                    return Ok(urls);
                }
                "PENDING" | "RUNNING" => tokio::time::sleep(self.poll_interval).await,
                _ => {
                    let message = json
                        .pointer("/output/message")
                        .and_then(Value::as_str)
                        .unwrap_or(status);
                    return Err(NodeError::BadResponse(format!(
                        "image task {} ended with {}: {}",
                        task_id, status, message
                    )));
                }
            }
        }
        Err(NodeError::Timeout(
            self.poll_interval.as_secs() * u64::from(self.max_polls),
        ))
    }
}
