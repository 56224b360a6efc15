//! 账户设置表单与个人 LLM 设置表单的状态逻辑
//!
//! 权限相关的开关由外部会话层下发，这里只当作不透明的布尔值使用。

use tracing::{info, warn};

use super::fetch::{ApiClient, FetchError};
use crate::api::request::{CheckConnectionRequest, SaveLlmSettingsRequest, UpdateUserSettingsRequest};
use crate::api::response::{CheckConnectionResponse, SettingsResponse};
use crate::user::account::looks_like_email;
use crate::user::{AccountInfo, LlmSettingsView};

#[derive(Debug, Clone, Copy, Default)]
pub struct SettingsMeta {
    pub has_affiliations_feature: bool,
    pub is_external_authentication_system_used: bool,
    pub should_allow_editing_details: bool,
}

impl SettingsMeta {
    /// 启用机构关联时邮箱字段不显示
    pub fn shows_email_field(&self) -> bool {
        !self.has_affiliations_feature
    }

    pub fn can_update_email(&self) -> bool {
        !self.has_affiliations_feature && !self.is_external_authentication_system_used
    }

    pub fn can_update_names(&self) -> bool {
        self.should_allow_editing_details
    }
}

#[derive(Debug, Clone)]
pub struct AccountForm {
    meta: SettingsMeta,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    email_valid: bool,
}

impl AccountForm {
    pub fn new(meta: SettingsMeta, initial: AccountInfo) -> Self {
        Self {
            meta,
            email: initial.email,
            first_name: initial.first_name,
            last_name: initial.last_name,
            email_valid: true,
        }
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        self.email = email.into();
        self.email_valid = looks_like_email(&self.email);
    }

    pub fn can_submit(&self) -> bool {
        self.email_valid
    }

    /// 只包含当前权限允许修改的字段
    pub fn to_request(&self) -> Option<UpdateUserSettingsRequest> {
        if !self.can_submit() {
            return None;
        }
        let names = self.meta.can_update_names();
        Some(UpdateUserSettingsRequest {
            email: self.meta.can_update_email().then(|| self.email.clone()),
            first_name: names.then(|| self.first_name.clone()),
            last_name: names.then(|| self.last_name.clone()),
        })
    }

    /// 表单无效时不发请求，返回 `Ok(false)`
    pub async fn submit(&self, api: &ApiClient) -> Result<bool, FetchError> {
        let Some(request) = self.to_request() else {
            return Ok(false);
        };
        let _: SettingsResponse = api.post_json("/user/settings", &request).await?;
        Ok(true)
    }
}

/// 连接测试在表单上展示的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionResult {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct LlmSettingsForm {
    pub use_own_settings: bool,
    /// 密钥输入框，保存成功后清空，服务端不回显原密钥
    pub api_key: String,
    pub model_name: String,
    pub api_url: String,
    pub has_api_key: bool,
    pub connection_result: Option<ConnectionResult>,
}

impl LlmSettingsForm {
    pub fn from_view(view: LlmSettingsView) -> Self {
        Self {
            use_own_settings: view.use_own_settings,
            api_key: String::new(),
            model_name: view.model_name,
            api_url: view.api_url,
            has_api_key: view.has_api_key,
            connection_result: None,
        }
    }

    fn entered_key(&self) -> Option<String> {
        Some(self.api_key.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    }

    pub fn api_key_placeholder(&self) -> &'static str {
        if self.has_api_key {
            "***"
        } else {
            "Enter API Key"
        }
    }

    pub fn can_check_connection(&self) -> bool {
        !self.api_url.is_empty()
            && !self.model_name.is_empty()
            && (self.entered_key().is_some() || self.has_api_key)
    }

    pub fn can_save(&self) -> bool {
        !self.api_url.is_empty() && !self.model_name.is_empty()
    }

    pub fn save_request(&self) -> SaveLlmSettingsRequest {
        SaveLlmSettingsRequest {
            use_own_llm_settings: self.use_own_settings,
            llm_api_key: self.entered_key(),
            llm_model_name: Some(self.model_name.clone()),
            llm_api_url: Some(self.api_url.clone()),
        }
    }

    pub fn check_request(&self) -> CheckConnectionRequest {
        CheckConnectionRequest {
            api_url: Some(self.api_url.clone()),
            api_key: self.entered_key(),
            model_name: Some(self.model_name.clone()),
        }
    }

    /// 切换开关；关闭时清空全部字段并返回需要立即保存的请求
    pub fn toggle(&mut self, checked: bool) -> Option<SaveLlmSettingsRequest> {
        self.use_own_settings = checked;
        if checked {
            return None;
        }
        self.api_key.clear();
        self.model_name.clear();
        self.api_url.clear();
        self.connection_result = None;
        Some(SaveLlmSettingsRequest {
            use_own_llm_settings: false,
            llm_api_key: None,
            llm_model_name: Some(String::new()),
            llm_api_url: Some(String::new()),
        })
    }

    /// 保存成功后：若本次填写了密钥，则标记已有密钥并清空输入框
    pub fn on_saved(&mut self) {
        if self.entered_key().is_some() {
            self.has_api_key = true;
            self.api_key.clear();
        }
    }

    pub async fn save(&mut self, api: &ApiClient) -> Result<SettingsResponse, FetchError> {
        let response: SettingsResponse = api.post_json("/user/llm-settings", &self.save_request()).await?;
        self.on_saved();
        info!(has_api_key = self.has_api_key, "LLM 设置已保存");
        Ok(response)
    }

    pub async fn set_use_own_settings(&mut self, checked: bool, api: &ApiClient) -> Result<(), FetchError> {
        if let Some(request) = self.toggle(checked) {
            let _: SettingsResponse = api.post_json("/user/llm-settings", &request).await?;
        }
        Ok(())
    }

    pub async fn check_connection(&mut self, api: &ApiClient) -> ConnectionResult {
        self.connection_result = None;
        let result = match api
            .post_json::<_, CheckConnectionResponse>("/user/llm-settings/check", &self.check_request())
            .await
        {
            Ok(response) => ConnectionResult {
                success: true,
                message: response
                    .message
                    .unwrap_or_else(|| "Connection successful".to_string()),
            },
            Err(e) => {
                warn!(error = %e, "连接测试失败");
                ConnectionResult {
                    success: false,
                    message: e.user_facing_message(),
                }
            }
        };
        self.connection_result = Some(result.clone());
        result
    }
}
