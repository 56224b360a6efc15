use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::ChatMessage;

/// 一次上游调用使用的地址与凭据
#[derive(Clone)]
pub struct Endpoint {
    pub api_url: String,
    pub api_key: String,
}

impl Endpoint {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_url.trim_end_matches('/'))
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("api_url", &self.api_url)
            .field("api_key", &"***")
            .finish()
    }
}

#[derive(Serialize, Debug)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Error, Debug)]
pub enum UpstreamError {
    /// 上游返回非 2xx，原样保留状态码与响应体
    #[error("upstream responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
    #[error("{kind}: {message}")]
    Transport { kind: &'static str, message: String },
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_connect() {
            "ConnectError"
        } else if e.is_decode() {
            "DecodeError"
        } else if e.is_body() {
            "BodyError"
        } else if e.is_timeout() {
            "TimeoutError"
        } else {
            "RequestError"
        };
        UpstreamError::Transport {
            kind,
            message: e.to_string(),
        }
    }
}

/// 成功的上游响应
#[derive(Debug)]
pub struct Completion {
    pub body: Value,
    pub elapsed: Duration,
}

/// OpenAI 兼容 `/chat/completions` 客户端
///
/// 每次调用只发一次请求，不重试。超时通过丢弃请求 future 实现，
/// 连接随之关闭，不会留下悬挂的上游请求。
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
}

impl LlmClient {
    pub fn new() -> anyhow::Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http })
    }

    pub async fn chat_completions(
        &self,
        endpoint: &Endpoint,
        request: &ChatCompletionRequest<'_>,
        deadline: Duration,
    ) -> Result<Completion, UpstreamError> {
        let started = Instant::now();
        let url = endpoint.completions_url();
        debug!(url = %url, model = request.model, "发送上游请求");

        let call = async {
            let res = self
                .http
                .post(&url)
                .bearer_auth(&endpoint.api_key)
                .json(request)
                .send()
                .await?;

            let status = res.status();
            if !status.is_success() {
                let body = res.text().await.unwrap_or_default();
                return Err(UpstreamError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            Ok(res.json::<Value>().await?)
        };

        match tokio::time::timeout(deadline, call).await {
            Ok(result) => result.map(|body| Completion {
                body,
                elapsed: started.elapsed(),
            }),
            Err(_) => Err(UpstreamError::Timeout(deadline)),
        }
    }
}
