use anyhow::Result;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

const FALLBACK_MESSAGE: &str = "An error occurred";

#[derive(Error, Debug)]
pub enum FetchError {
    /// 非 2xx 响应，保留能解析出的 JSON 错误体
    #[error("HTTP error! status: {status}")]
    Status { status: u16, body: Option<Value> },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 展示给用户的错误文本，从不直接显示原始错误对象
    pub fn user_facing_message(&self) -> String {
        match self {
            Self::Status { body: Some(body), .. } => {
                user_facing_message(body).unwrap_or_else(|| self.to_string())
            }
            _ => self.to_string(),
        }
    }
}

fn message_field(body: &Value) -> Option<String> {
    ["message", "error", "details"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()))
        .map(str::to_string)
}

/// 任意 JSON 值的用户可见文本：依次取 `message`、`error`、`details`
pub fn user_facing_message(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(message_field(other).unwrap_or_else(|| FALLBACK_MESSAGE.to_string())),
    }
}

/// 访问 texchat 服务的 JSON 客户端，按配置的请求头携带用户身份
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    user_header: String,
    user: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, user_header: &str, user: Option<String>) -> Result<Self> {
        Ok(Self {
            http: Client::builder().build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_header: user_header.to_string(),
            user,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_user(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.user {
            Some(user) => builder.header(self.user_header.as_str(), user),
            None => builder,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        debug!(path, "GET");
        let res = self.with_user(self.http.get(self.url(path))).send().await?;
        Self::decode(res).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(path, "POST");
        let res = self
            .with_user(self.http.post(self.url(path)))
            .json(body)
            .send()
            .await?;
        Self::decode(res).await
    }

    async fn decode<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, FetchError> {
        let status = res.status();
        if !status.is_success() {
            // 错误体无法解析时只保留状态码
            let body = res.json::<Value>().await.ok();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(res.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_user_facing_message_priority() {
        assert_eq!(user_facing_message(&Value::Null), None);
        assert_eq!(user_facing_message(&json!("plain")).as_deref(), Some("plain"));
        assert_eq!(
            user_facing_message(&json!({"message": "m", "error": "e", "details": "d"})).as_deref(),
            Some("m")
        );
        assert_eq!(
            user_facing_message(&json!({"error": "e", "details": "d"})).as_deref(),
            Some("e")
        );
        assert_eq!(user_facing_message(&json!({"details": "d"})).as_deref(), Some("d"));
        assert_eq!(
            user_facing_message(&json!({"success": false})).as_deref(),
            Some("An error occurred")
        );
    }

    #[test]
    fn test_fetch_error_message() {
        let err = FetchError::Status {
            status: 400,
            body: Some(json!({"success": false, "error": "LLM connection failed", "details": "bad key"})),
        };
        assert_eq!(err.user_facing_message(), "LLM connection failed");
        assert_eq!(err.status(), Some(400));

        let err = FetchError::Status { status: 502, body: None };
        assert_eq!(err.user_facing_message(), "HTTP error! status: 502");

        let err = FetchError::Status {
            status: 500,
            body: Some(json!({"success": false})),
        };
        assert_eq!(err.user_facing_message(), "An error occurred");
    }

    #[test]
    fn test_empty_fields_fall_through() {
        assert_eq!(
            user_facing_message(&json!({"message": "", "error": "LLM connection failed"})).as_deref(),
            Some("LLM connection failed")
        );
        assert_eq!(
            user_facing_message(&json!({"message": "", "error": "", "details": "d"})).as_deref(),
            Some("d")
        );
        assert_eq!(user_facing_message(&json!("")), None);

        let err = FetchError::Status {
            status: 400,
            body: Some(json!({"message": "", "error": "LLM connection failed"})),
        };
        assert_eq!(err.user_facing_message(), "LLM connection failed");
    }
}
