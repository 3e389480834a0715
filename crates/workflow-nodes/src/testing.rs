//! Test doubles shared by node tests

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use workflow_engine::{ChatModel, ModelResponse, Msg, WorkflowError};

/// Accept one HTTP request on a local port and answer it with `status`
/// and `body`. Resolves to the raw request text.
pub async fn serve_once(status: u16, body: &str) -> (String, JoinHandle<String>) {
    let (url, handle) = serve_sequence(&[(status, body)]).await;
    let first = tokio::spawn(async move { handle.await.unwrap().remove(0) });
    (url, first)
}

/// Answer consecutive requests, one connection each, with `responses` in
/// order. Resolves to the raw request texts.
pub async fn serve_sequence(responses: &[(u16, &str)]) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let responses: Vec<(u16, String)> = responses
        .iter()
        .map(|(status, body)| (*status, body.to_string()))
        .collect();

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            requests.push(String::from_utf8_lossy(&request).to_string());
        }
        requests
    });
    (url, handle)
}

fn request_complete(request: &[u8]) -> bool {
    let text = String::from_utf8_lossy(request);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..header_end]
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    request.len() >= header_end + 4 + content_length
}

/// Chat model answering from a script and recording every prompt
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<Vec<String>>,
    pub prompts: Mutex<Vec<Vec<Msg>>>,
}

impl ScriptedModel {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, messages: &[Msg]) -> workflow_engine::Result<ModelResponse> {
        self.prompts.lock().push(messages.to_vec());
        self.replies
            .lock()
            .pop()
            .map(ModelResponse::text)
            .ok_or_else(|| WorkflowError::collaborator("script exhausted"))
    }
}
