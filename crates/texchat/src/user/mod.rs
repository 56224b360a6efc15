pub mod account;
pub mod llm_settings;
pub mod store;

use serde::Serialize;
use utoipa::ToSchema;

/// 用户保存的个人 LLM 设置（服务端视图，包含密钥）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserLlmSettings {
    pub use_own_settings: bool,
    pub model_name: String,
    pub api_url: String,
    pub api_key: Option<String>,
}

impl UserLlmSettings {
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.trim().is_empty())
    }

    /// 已启用且 URL、密钥齐全，可以代替全局凭据发起请求
    pub fn has_credentials(&self) -> bool {
        self.use_own_settings && !self.api_url.trim().is_empty() && self.has_api_key()
    }

    /// 在 [`Self::has_credentials`] 基础上还需要模型名，才会出现在模型列表里
    pub fn is_complete(&self) -> bool {
        self.has_credentials() && !self.model_name.trim().is_empty()
    }

    pub fn public_view(&self) -> LlmSettingsView {
        LlmSettingsView {
            use_own_settings: self.use_own_settings,
            model_name: self.model_name.clone(),
            api_url: self.api_url.clone(),
            has_api_key: self.has_api_key(),
        }
    }
}

/// 返回给客户端的设置视图，不含密钥
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, serde::Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LlmSettingsView {
    pub use_own_settings: bool,
    pub model_name: String,
    pub api_url: String,
    pub has_api_key: bool,
}

/// 账户基本信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, serde::Deserialize, ToSchema)]
pub struct AccountInfo {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}
