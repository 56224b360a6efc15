use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::llm::models::Model;

#[derive(Serialize, Deserialize, ToSchema, Debug, Default)]
pub struct ModelsResponse {
    pub models: Vec<Model>,
}

/// 设置类接口的通用结果：成功时带 `message`，失败时带 `error`
#[derive(Serialize, Deserialize, ToSchema, Debug, Default, Clone, PartialEq, Eq)]
pub struct SettingsResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SettingsResponse {
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
            error: None,
        }
    }

    pub fn success_with(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckConnectionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// 形如 `"123ms"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}
