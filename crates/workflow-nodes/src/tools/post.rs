//! Post Tool
//!
//! Sends an HTTP POST built from the node's `url`, `data`, `headers` and
//! `kwargs`. When an image source is available it travels with the
//! request: a URL is added to `data` as `image_url`, a local file is
//! uploaded as the multipart field `image_file`.
//!
//! With `output_type` "image" the response bytes are saved to
//! `output_path` and the path is returned; with "text" the response body
//! is returned. A failed request is logged and yields `output_path`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use serde_json::{Map, Value};
use workflow_engine::{
    value::value_text, BuildContext, FactoryRegistration, FlowValue, Msg, NodeKind, NodeRequest,
    Operator, Outcome, Scope, WorkflowError,
};

use crate::error::Result;
use crate::model::header_map;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Image,
    Text,
}

impl OutputType {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(Self::Image),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Request options merged from `headers` and `kwargs`
#[derive(Debug, Default, Clone)]
struct RequestOptions {
    headers: HeaderMap,
    timeout: Option<Duration>,
    json: Option<Value>,
    params: Option<Map<String, Value>>,
}

impl RequestOptions {
    fn merge_kwargs(&mut self, node_id: &str, kwargs: &Map<String, Value>) -> Result<()> {
        for (key, value) in kwargs {
            match (key.as_str(), value) {
                ("headers", Value::Object(headers)) => self.headers.extend(header_map(headers)?),
                ("timeout", Value::Number(secs)) => {
                    self.timeout = secs
                        .as_f64()
                        .filter(|s| s.is_finite() && *s >= 0.0)
                        .map(Duration::from_secs_f64);
                }
                ("json", body) => self.json = Some(body.clone()),
                ("params", Value::Object(params)) => self.params = Some(params.clone()),
                _ => log::warn!("Post {}: ignoring request option '{}'", node_id, key),
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ImageSource {
    Url(String),
    File(PathBuf),
}

fn is_url(value: &str) -> bool {
    reqwest::Url::parse(value)
        .map(|url| url.has_host())
        .unwrap_or(false)
}

/// Image to send: the message URL, overridden by `image_path_or_url`
/// when that names a URL or an existing file
fn image_source(msg: Option<&Msg>, image_path_or_url: Option<&str>) -> Option<ImageSource> {
    let mut source = msg
        .and_then(|m| m.url.as_ref())
        .and_then(|urls| urls.first())
        .map(|url| ImageSource::Url(url.clone()));
    if let Some(candidate) = image_path_or_url.filter(|s| !s.is_empty()) {
        if is_url(candidate) {
            source = Some(ImageSource::Url(candidate.to_string()));
        } else if Path::new(candidate).is_file() {
            source = Some(ImageSource::File(PathBuf::from(candidate)));
        }
    }
    source
}

pub struct PostTool {
    node_id: String,
    client: reqwest::Client,
    url: String,
    data: Option<Value>,
    options: RequestOptions,
    output_type: OutputType,
    output_path: String,
    image_path_or_url: Option<String>,
}

impl PostTool {
    pub fn new(node_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            client: reqwest::Client::new(),
            url: url.into(),
            data: None,
            options: RequestOptions::default(),
            output_type: OutputType::Image,
            output_path: String::new(),
            image_path_or_url: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_output(mut self, output_type: OutputType, output_path: impl Into<String>) -> Self {
        self.output_type = output_type;
        self.output_path = output_path.into();
        self
    }

    pub fn with_image(mut self, image_path_or_url: impl Into<String>) -> Self {
        self.image_path_or_url = Some(image_path_or_url.into());
        self
    }

    pub fn with_kwargs(mut self, kwargs: &Map<String, Value>) -> Result<Self> {
        self.options.merge_kwargs(&self.node_id, kwargs)?;
        Ok(self)
    }

    async fn post(&self, msg: Option<&Msg>) -> Result<String> {
        let mut request = self
            .client
            .post(&self.url)
            .headers(self.options.headers.clone());
        if let Some(timeout) = self.options.timeout {
            request = request.timeout(timeout);
        }
        if let Some(params) = &self.options.params {
            request = request.query(params);
        }

        let mut data = self.data.clone();
        let mut multipart = false;
        match image_source(msg, self.image_path_or_url.as_deref()) {
            Some(ImageSource::Url(url)) => {
                if let Some(Value::Object(fields)) = data.as_mut() {
                    fields.insert("image_url".to_string(), Value::String(url));
                }
            }
            Some(ImageSource::File(path)) => {
                let bytes = tokio::fs::read(&path).await?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let mut form = Form::new();
                if let Some(Value::Object(fields)) = data.take() {
                    for (key, value) in fields {
                        form = form.text(key, value_text(&value));
                    }
                }
                form = form.part("image_file", Part::bytes(bytes).file_name(file_name));
                request = request.multipart(form);
                multipart = true;
            }
            None => {}
        }

        request = match data {
            Some(Value::Object(fields)) => request.form(&fields),
            Some(Value::String(body)) => request.body(body),
            Some(other) => request.body(other.to_string()),
            None => match &self.options.json {
                Some(json) if !multipart => request.json(json),
                _ => request,
            },
        };

        log::debug!("Post {}: sending request to {}", self.node_id, self.url);
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Post {}: error {} {}", self.node_id, status.as_u16(), body);
            return Ok(self.output_path.clone());
        }

        match self.output_type {
            OutputType::Text => Ok(response.text().await?),
            OutputType::Image => {
                let bytes = response.bytes().await?;
                if !self.output_path.is_empty() {
                    let path = Path::new(&self.output_path);
                    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::write(path, &bytes).await?;
                    log::debug!(
                        "Post {}: saved {} bytes to '{}'",
                        self.node_id,
                        bytes.len(),
                        self.output_path
                    );
                }
                Ok(self.output_path.clone())
            }
        }
    }
}

#[async_trait]
impl Operator for PostTool {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Post
    }

    async fn invoke(&self, input: FlowValue, _scope: &Scope<'_>) -> workflow_engine::Result<Outcome> {
        let msg = input.messages().into_iter().next();
        let result = self.post(msg.as_ref()).await?;
        Ok(FlowValue::from(result).into())
    }
}

fn build(
    request: &NodeRequest<'_>,
    _ctx: &mut BuildContext<'_>,
) -> workflow_engine::Result<Arc<dyn Operator>> {
    let args = request.args();
    let output_type = args.str_or("output_type", "image")?;
    let output_type = OutputType::parse(&output_type).ok_or_else(|| {
        WorkflowError::invalid_argument(
            request.node_id,
            "output_type",
            format!("'{}' is not one of image, text", output_type),
        )
    })?;

    let mut tool = PostTool::new(request.node_id, args.str("url")?)
        .with_output(output_type, args.str_or("output_path", "")?);

    // `data` may be a JSON object given as text; anything else is sent as is
    if let Some(data) = args.literal("data")? {
        let data = match data {
            Value::String(text) => match serde_json::from_str::<Value>(text.trim()) {
                Ok(Value::Object(fields)) => Value::Object(fields),
                _ => Value::String(text),
            },
            other => other,
        };
        if !data.is_null() {
            tool = tool.with_data(data);
        }
    }
    if let Some(image) = args.opt_str("image_path_or_url")? {
        tool = tool.with_image(image);
    }
    if let Some(headers) = args.opt_object("headers")? {
        tool.options.headers = header_map(&headers)?;
    }
    if let Some(kwargs) = args.opt_object("kwargs")? {
        tool = tool.with_kwargs(&kwargs)?;
    }
    Ok(Arc::new(tool))
}

inventory::submit!(FactoryRegistration {
    kind: NodeKind::Post,
    factory: build,
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve_once;
    use serde_json::json;
    use tempfile::TempDir;
    use workflow_engine::{NullEventSink, OperatorTable, Role};

    async fn invoke(tool: &PostTool, input: FlowValue) -> FlowValue {
        let table = OperatorTable::new();
        let scope = Scope::new(&table, &NullEventSink, "r");
        tool.invoke(input, &scope).await.unwrap().value
    }

    #[tokio::test]
    async fn test_text_output_returns_body() {
        let (url, server) = serve_once(200, r#"{"ok":true}"#).await;
        let tool = PostTool::new("p", url)
            .with_data(json!({"prompt": "cat"}))
            .with_output(OutputType::Text, "");

        let out = invoke(&tool, FlowValue::Null).await;
        assert_eq!(out, FlowValue::from(r#"{"ok":true}"#));
        let request = server.await.unwrap();
        assert!(request.starts_with("POST / HTTP/1.1"));
        assert!(request.ends_with("prompt=cat"));
    }

    #[tokio::test]
    async fn test_image_output_saved_to_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/image.png").to_string_lossy().to_string();
        let (url, server) = serve_once(200, "PNGBYTES").await;
        let tool = PostTool::new("p", url).with_output(OutputType::Image, path.clone());

        let out = invoke(&tool, FlowValue::Null).await;
        assert_eq!(out, FlowValue::from(path.clone()));
        assert_eq!(std::fs::read(&path).unwrap(), b"PNGBYTES");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_returns_output_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("never.png").to_string_lossy().to_string();
        let (url, server) = serve_once(500, "boom").await;
        let tool = PostTool::new("p", url).with_output(OutputType::Image, path.clone());

        let out = invoke(&tool, FlowValue::Null).await;
        assert_eq!(out, FlowValue::from(path.clone()));
        assert!(!Path::new(&path).exists());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_message_url_added_to_data() {
        let (url, server) = serve_once(200, "done").await;
        let tool = PostTool::new("p", url)
            .with_data(json!({"mode": "cut"}))
            .with_output(OutputType::Text, "");
        let msg = Msg::new("painter", "here", Role::Assistant)
            .with_url(vec!["http://img.example/a.png".to_string()]);

        invoke(&tool, msg.into()).await;
        let request = server.await.unwrap();
        assert!(request.contains("image_url=http%3A%2F%2Fimg.example%2Fa.png"));
    }

    #[tokio::test]
    async fn test_local_file_uploaded_as_multipart() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("cat.png");
        std::fs::write(&image, b"meow").unwrap();
        let (url, server) = serve_once(200, "done").await;
        let tool = PostTool::new("p", url)
            .with_data(json!({"mode": "cut"}))
            .with_image(image.to_string_lossy().to_string())
            .with_output(OutputType::Text, "");

        invoke(&tool, FlowValue::Null).await;
        let request = server.await.unwrap();
        assert!(request.contains("multipart/form-data"));
        assert!(request.contains(r#"name="image_file"; filename="cat.png""#));
        assert!(request.contains("meow"));
        assert!(request.contains(r#"name="mode""#));
    }

    #[tokio::test]
    async fn test_kwargs_headers_and_params() {
        let (url, server) = serve_once(200, "done").await;
        let kwargs = json!({"headers": {"X-Api-Key": "k1"}, "params": {"q": "1"}, "stream": true});
        let tool = PostTool::new("p", url)
            .with_output(OutputType::Text, "")
            .with_kwargs(kwargs.as_object().unwrap())
            .unwrap();

        invoke(&tool, FlowValue::Null).await;
        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("post /?q=1 http/1.1"));
        assert!(request.contains("x-api-key: k1"));
    }

    #[test]
    fn test_image_source_precedence() {
        let msg = Msg::new("a", "x", Role::User).with_url(vec!["http://h/1.png".to_string()]);
        assert_eq!(
            image_source(Some(&msg), None),
            Some(ImageSource::Url("http://h/1.png".to_string()))
        );
        assert_eq!(
            image_source(Some(&msg), Some("https://h/2.png")),
            Some(ImageSource::Url("https://h/2.png".to_string()))
        );
        assert_eq!(image_source(None, Some("/no/such/file.png")), None);
        assert!(!is_url("relative/path.png"));
    }
}
