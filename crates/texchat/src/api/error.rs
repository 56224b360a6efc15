use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

use crate::llm::client::UpstreamError;
use crate::llm::proxy::ProxyError;

#[derive(Error, Debug)]
pub enum InnerApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Authentication required")]
    Unauthorized,
    #[error("{0}")]
    NotConfigured(String),
    #[error("LLM API error")]
    Upstream { status: u16, body: String },
    #[error("LLM service timeout")]
    Timeout(Duration),
    #[error("{context}")]
    Internal {
        context: String,
        kind: String,
        message: String,
    },
}

impl InnerApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            // 上游状态码原样透传
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON 错误信封 `{error, details?, status?, type?}`
    pub fn body(&self) -> Value {
        match self {
            Self::BadRequest(_) | Self::Unauthorized | Self::NotConfigured(_) => json!({ "error": self.to_string() }),
            Self::Upstream { status, body } => json!({
                "error": self.to_string(),
                "details": body,
                "status": status,
            }),
            Self::Timeout(deadline) => json!({
                "error": self.to_string(),
                "details": format!("The LLM API did not respond within {} seconds", deadline.as_secs()),
            }),
            Self::Internal { kind, message, .. } => json!({
                "error": self.to_string(),
                "details": message,
                "type": kind,
            }),
        }
    }
}

impl From<ProxyError> for InnerApiError {
    fn from(e: ProxyError) -> Self {
        match e {
            ProxyError::InvalidMessages | ProxyError::PersonalSettingsIncomplete => Self::BadRequest(e.to_string()),
            ProxyError::NotConfigured => Self::NotConfigured(e.to_string()),
            ProxyError::SettingsLookup(inner) => Self::Internal {
                context: "Failed to retrieve user LLM settings".to_string(),
                kind: "DatabaseError".to_string(),
                message: format!("{:#}", inner),
            },
            ProxyError::Upstream(UpstreamError::Status { status, body }) => Self::Upstream { status, body },
            ProxyError::Upstream(UpstreamError::Timeout(deadline)) => Self::Timeout(deadline),
            ProxyError::Upstream(UpstreamError::Transport { kind, message }) => Self::Internal {
                context: "Failed to communicate with LLM service".to_string(),
                kind: kind.to_string(),
                message,
            },
        }
    }
}
