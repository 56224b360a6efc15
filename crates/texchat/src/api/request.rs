use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::llm::ChatMessage;
use crate::user::llm_settings::{ConnectionProbe, SaveLlmSettings};
use crate::user::store::AccountUpdate;

/// 聊天请求，`messages` 先按原始 JSON 接收再校验，以便返回统一的格式错误
#[derive(Serialize, Deserialize, ToSchema, Debug, Default)]
pub struct ChatRequest {
    #[serde(default)]
    #[schema(value_type = Vec<ChatMessage>)]
    pub messages: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Default, Clone)]
pub struct SaveLlmSettingsRequest {
    #[serde(rename = "useOwnLLMSettings", default)]
    pub use_own_llm_settings: bool,
    #[serde(rename = "llmApiKey", default, skip_serializing_if = "Option::is_none")]
    pub llm_api_key: Option<String>,
    #[serde(rename = "llmModelName", default)]
    pub llm_model_name: Option<String>,
    #[serde(rename = "llmApiUrl", default)]
    pub llm_api_url: Option<String>,
}

impl From<SaveLlmSettingsRequest> for SaveLlmSettings {
    fn from(req: SaveLlmSettingsRequest) -> Self {
        Self {
            use_own_settings: req.use_own_llm_settings,
            api_url: req.llm_api_url,
            api_key: req.llm_api_key,
            model_name: req.llm_model_name,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CheckConnectionRequest {
    #[serde(default)]
    pub api_url: Option<String>,
    /// 省略时使用已保存的密钥
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
}

impl From<CheckConnectionRequest> for ConnectionProbe {
    fn from(req: CheckConnectionRequest) -> Self {
        Self {
            api_url: req.api_url,
            api_key: req.api_key,
            model_name: req.model_name,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Default, Clone)]
pub struct UpdateUserSettingsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl From<UpdateUserSettingsRequest> for AccountUpdate {
    fn from(req: UpdateUserSettingsRequest) -> Self {
        Self {
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
        }
    }
}
