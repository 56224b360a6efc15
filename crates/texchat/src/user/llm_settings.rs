use std::time::Duration;

use thiserror::Error;
use tracing::{error, info};

use super::store::{LlmSettingsUpdate, UserStore};
use crate::llm::client::{ChatCompletionRequest, Endpoint, LlmClient, UpstreamError};
use crate::llm::{ChatMessage, CHAT_TEMPERATURE};

/// 保存请求（字段名沿用前端表单）
#[derive(Debug, Clone, Default)]
pub struct SaveLlmSettings {
    pub use_own_settings: bool,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model_name: Option<String>,
}

#[derive(Error, Debug)]
pub enum SaveSettingsError {
    #[error("API URL and Model Name are required when enabling custom LLM settings")]
    MissingFields,
    #[error("API Key is required when enabling custom LLM settings")]
    MissingApiKey,
    #[error("Failed to save LLM settings: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// 连接测试参数
#[derive(Debug, Clone, Default)]
pub struct ConnectionProbe {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model_name: Option<String>,
}

/// 连接测试结果，任何失败都以结构化结果返回
#[derive(Debug)]
pub enum ConnectionCheck {
    Success { duration: Duration },
    MissingParameters,
    Rejected { status: u16, details: String },
    Timeout { deadline: Duration },
    Failed { kind: String, message: String },
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// 用户个人 LLM 设置：保存与连接测试
#[derive(Clone)]
pub struct LlmSettingsService {
    users: UserStore,
    client: LlmClient,
    check_timeout: Duration,
}

impl LlmSettingsService {
    pub fn new(users: UserStore, client: LlmClient, check_timeout: Duration) -> Self {
        Self {
            users,
            client,
            check_timeout,
        }
    }

    #[cfg(test)]
    pub fn users(&self) -> &UserStore {
        &self.users
    }

    /// 启用时要求 URL 与模型名；没有已存密钥时还要求本次提供密钥
    pub async fn save(&self, user_id: &str, request: SaveLlmSettings) -> Result<(), SaveSettingsError> {
        let api_url = non_blank(request.api_url.as_deref());
        let model_name = non_blank(request.model_name.as_deref());
        let api_key = non_blank(request.api_key.as_deref());

        info!(
            user_id,
            use_own_settings = request.use_own_settings,
            has_api_key = api_key.is_some(),
            model_name = model_name.unwrap_or(""),
            api_url = api_url.unwrap_or(""),
            "保存用户 LLM 设置"
        );

        if request.use_own_settings {
            if api_url.is_none() || model_name.is_none() {
                error!(
                    user_id,
                    has_api_url = api_url.is_some(),
                    has_model_name = model_name.is_some(),
                    "缺少必填字段"
                );
                return Err(SaveSettingsError::MissingFields);
            }

            if api_key.is_none() {
                let has_existing = self
                    .users
                    .find_llm_settings(user_id)
                    .await?
                    .is_some_and(|s| s.has_api_key());
                if !has_existing {
                    error!(user_id, "新配置缺少 API Key");
                    return Err(SaveSettingsError::MissingApiKey);
                }
            }
        }

        self.users
            .save_llm_settings(
                user_id,
                LlmSettingsUpdate {
                    use_own_settings: request.use_own_settings,
                    model_name: model_name.unwrap_or_default().to_string(),
                    api_url: api_url.unwrap_or_default().to_string(),
                    api_key: api_key.map(str::to_string),
                },
            )
            .await?;

        info!(user_id, "用户 LLM 设置保存成功");
        Ok(())
    }

    /// 发起一次极小的上游调用验证可达性与凭据，不写入任何数据
    ///
    /// 未提供密钥时使用当前用户已保存的密钥（表单不会回显原密钥）。
    pub async fn check_connection(&self, user_id: Option<&str>, probe: ConnectionProbe) -> ConnectionCheck {
        let api_url = non_blank(probe.api_url.as_deref());
        let model_name = non_blank(probe.model_name.as_deref());
        let mut api_key = non_blank(probe.api_key.as_deref()).map(str::to_string);

        if api_key.is_none() {
            if let Some(user_id) = user_id {
                match self.users.find_llm_settings(user_id).await {
                    Ok(settings) => api_key = settings.and_then(|s| s.api_key),
                    Err(e) => error!(user_id, error = %format!("{:#}", e), "读取已保存的 API Key 失败"),
                }
            }
        }

        let (Some(api_url), Some(model_name), Some(api_key)) = (api_url, model_name, api_key) else {
            error!("连接测试缺少必要参数");
            return ConnectionCheck::MissingParameters;
        };

        info!(api_url, model_name, "测试 LLM 连接");

        let messages = [ChatMessage::user("Test connection")];
        let request = ChatCompletionRequest {
            model: model_name,
            messages: &messages,
            max_tokens: 10,
            temperature: CHAT_TEMPERATURE,
        };

        match self
            .client
            .chat_completions(&Endpoint::new(api_url, api_key), &request, self.check_timeout)
            .await
        {
            Ok(completion) => {
                info!(
                    duration_ms = completion.elapsed.as_millis() as u64,
                    has_choices = completion.body.get("choices").is_some(),
                    "连接测试成功"
                );
                ConnectionCheck::Success {
                    duration: completion.elapsed,
                }
            }
            Err(UpstreamError::Status { status, body }) => {
                error!(status, error = %body, "连接测试失败");
                ConnectionCheck::Rejected { status, details: body }
            }
            Err(UpstreamError::Timeout(deadline)) => {
                error!(deadline_ms = deadline.as_millis() as u64, "连接测试超时");
                ConnectionCheck::Timeout { deadline }
            }
            Err(UpstreamError::Transport { kind, message }) => {
                error!(kind, message = %message, "连接测试出错");
                ConnectionCheck::Failed {
                    kind: kind.to_string(),
                    message,
                }
            }
        }
    }
}
