use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

use super::client::{ChatCompletionRequest, Endpoint, LlmClient, UpstreamError};
use super::think::strip_think_tags;
use super::{ChatMessage, CHAT_MAX_TOKENS, CHAT_TEMPERATURE, FALLBACK_MODEL_ID, PERSONAL_MODEL_PREFIX};
use crate::config::LlmConfig;
use crate::user::store::UserStore;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Invalid messages format")]
    InvalidMessages,
    #[error(
        "Your LLM settings are incomplete. Please configure API URL, API Key, and Model Name in your account settings."
    )]
    PersonalSettingsIncomplete,
    #[error("Failed to retrieve user LLM settings: {0:#}")]
    SettingsLookup(anyhow::Error),
    #[error(
        "LLM service is not configured. Please contact your administrator or configure your own LLM settings in your account settings."
    )]
    NotConfigured,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// 一次聊天请求的调用方上下文，只用于日志
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub project_id: &'a str,
    pub user_id: Option<&'a str>,
    pub request_id: &'a str,
}

/// 解析后的上游目标
#[derive(Debug)]
pub struct Target {
    pub endpoint: Endpoint,
    /// 去掉个人前缀后的真实模型名
    pub model: String,
    pub personal: bool,
}

/// 聊天代理：选择凭据、转发请求、清洗响应。无状态，每次调用相互独立。
#[derive(Clone)]
pub struct ChatProxy {
    config: Arc<LlmConfig>,
    users: UserStore,
    client: LlmClient,
}

impl ChatProxy {
    pub fn new(config: Arc<LlmConfig>, users: UserStore, client: LlmClient) -> Self {
        Self { config, users, client }
    }

    /// 校验消息历史：必须是非空数组且每项都是合法消息
    pub fn parse_messages(raw: &Value) -> Result<Vec<ChatMessage>, ProxyError> {
        match raw.as_array() {
            Some(items) if !items.is_empty() => {
                serde_json::from_value(raw.clone()).map_err(|_| ProxyError::InvalidMessages)
            }
            _ => Err(ProxyError::InvalidMessages),
        }
    }

    /// 决定使用个人凭据还是全局凭据；个人设置不完整时直接失败，不回退
    pub async fn resolve_target(&self, model: Option<&str>, user_id: Option<&str>) -> Result<Target, ProxyError> {
        let model = model.map(str::trim).filter(|m| !m.is_empty());

        if let Some(personal_name) = model.and_then(|m| m.strip_prefix(PERSONAL_MODEL_PREFIX)) {
            let user_id = user_id.ok_or(ProxyError::PersonalSettingsIncomplete)?;
            let settings = self
                .users
                .find_llm_settings(user_id)
                .await
                .map_err(ProxyError::SettingsLookup)?
                .unwrap_or_default();
            if !settings.has_credentials() {
                error!(
                    user_id,
                    use_own_settings = settings.use_own_settings,
                    has_api_url = !settings.api_url.is_empty(),
                    has_api_key = settings.has_api_key(),
                    "用户个人 LLM 设置不完整"
                );
                return Err(ProxyError::PersonalSettingsIncomplete);
            }
            let api_key = settings.api_key.unwrap_or_default();
            return Ok(Target {
                endpoint: Endpoint::new(settings.api_url, api_key),
                model: personal_name.to_string(),
                personal: true,
            });
        }

        let (api_url, api_key) = self.config.server_credentials().ok_or_else(|| {
            error!(
                has_api_url = self.config.api_url.is_some(),
                has_api_key = self.config.api_key.is_some(),
                "LLM 服务未配置"
            );
            ProxyError::NotConfigured
        })?;
        Ok(Target {
            endpoint: Endpoint::new(api_url, api_key),
            model: model.unwrap_or(FALLBACK_MODEL_ID).to_string(),
            personal: false,
        })
    }

    /// 转发一次聊天请求，返回上游 JSON（仅清洗第一条回复的内容）
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
        ctx: CallContext<'_>,
    ) -> Result<Value, ProxyError> {
        if messages.is_empty() {
            return Err(ProxyError::InvalidMessages);
        }

        let target = self.resolve_target(model, ctx.user_id).await?;
        info!(
            request_id = ctx.request_id,
            project_id = ctx.project_id,
            user_id = ctx.user_id.unwrap_or("-"),
            model_received = model.unwrap_or("default"),
            model = %target.model,
            personal = target.personal,
            message_count = messages.len(),
            "发送请求到 LLM API"
        );

        let request = ChatCompletionRequest {
            model: &target.model,
            messages,
            max_tokens: CHAT_MAX_TOKENS,
            temperature: CHAT_TEMPERATURE,
        };

        let completion = match self
            .client
            .chat_completions(&target.endpoint, &request, self.config.chat_timeout)
            .await
        {
            Ok(completion) => completion,
            Err(e) => {
                error!(
                    request_id = ctx.request_id,
                    project_id = ctx.project_id,
                    user_id = ctx.user_id.unwrap_or("-"),
                    model = %target.model,
                    error = %e,
                    "LLM API 调用失败"
                );
                return Err(e.into());
            }
        };

        let mut body = completion.body;
        if let Some((original, cleaned)) = clean_first_choice(&mut body) {
            debug!(
                request_id = ctx.request_id,
                original_length = original,
                cleaned_length = cleaned,
                "已去除 think 标签"
            );
        }

        info!(
            request_id = ctx.request_id,
            project_id = ctx.project_id,
            user_id = ctx.user_id.unwrap_or("-"),
            model = %target.model,
            choice_count = body["choices"].as_array().map_or(0, Vec::len),
            duration_ms = completion.elapsed.as_millis() as u64,
            "LLM 响应解析成功"
        );
        Ok(body)
    }
}

/// 清洗 `choices[0].message.content`，返回清洗前后的长度
fn clean_first_choice(body: &mut Value) -> Option<(usize, usize)> {
    let content = body.pointer_mut("/choices/0/message/content")?;
    let original = content.as_str()?;
    let cleaned = strip_think_tags(original);
    let lengths = (original.len(), cleaned.len());
    *content = Value::String(cleaned);
    Some(lengths)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::database::{setup_broken_database, setup_memory_database};
    use crate::llm::client::test_upstream::{spawn, Behavior};
    use crate::user::store::LlmSettingsUpdate;

    const CTX: CallContext<'static> = CallContext {
        project_id: "p1",
        user_id: Some("u1"),
        request_id: "r1",
    };

    fn history() -> Vec<ChatMessage> {
        vec![ChatMessage::system("sys"), ChatMessage::user("why does it fail?")]
    }

    async fn proxy(config: LlmConfig) -> ChatProxy {
        let users = UserStore::new(setup_memory_database().await);
        ChatProxy::new(Arc::new(config), users, LlmClient::new().unwrap())
    }

    fn server_config(url: String) -> LlmConfig {
        LlmConfig {
            api_url: Some(url),
            api_key: Some("sk-server".to_string()),
            model_ids: vec!["srv-model".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_messages() {
        assert_matches!(ChatProxy::parse_messages(&Value::Null), Err(ProxyError::InvalidMessages));
        assert_matches!(ChatProxy::parse_messages(&json!([])), Err(ProxyError::InvalidMessages));
        assert_matches!(ChatProxy::parse_messages(&json!("hi")), Err(ProxyError::InvalidMessages));
        assert_matches!(
            ChatProxy::parse_messages(&json!([{"role": "robot", "content": "x"}])),
            Err(ProxyError::InvalidMessages)
        );
        let parsed = ChatProxy::parse_messages(&json!([{"role": "user", "content": "x"}])).unwrap();
        assert_eq!(parsed, vec![ChatMessage::user("x")]);
    }

    #[test]
    fn test_clean_first_choice_only_touches_content() {
        let mut body = json!({
            "id": "x",
            "choices": [
                {"message": {"role": "assistant", "content": "<think>plan</think>\nAnswer"}},
                {"message": {"content": "<think>keep</think>second"}}
            ]
        });
        assert!(clean_first_choice(&mut body).is_some());
        assert_eq!(body["choices"][0]["message"]["content"], "Answer");
        assert_eq!(body["choices"][1]["message"]["content"], "<think>keep</think>second");
        assert_eq!(body["id"], "x");

        let mut empty = json!({"choices": []});
        assert!(clean_first_choice(&mut empty).is_none());
    }

    #[tokio::test]
    async fn test_not_configured_without_server_credentials() {
        let proxy = proxy(LlmConfig::default()).await;
        let err = proxy.chat(&history(), None, CTX).await.unwrap_err();
        assert_matches!(err, ProxyError::NotConfigured);
    }

    #[tokio::test]
    async fn test_server_model_forwarded_and_stripped() {
        let upstream = spawn(Behavior::Reply("<think>hmm</think>Use \\usepackage{amsmath}.".to_string())).await;
        let proxy = proxy(server_config(upstream.base_url())).await;

        let body = proxy.chat(&history(), Some("srv-model"), CTX).await.unwrap();
        assert_eq!(body["choices"][0]["message"]["content"], "Use \\usepackage{amsmath}.");
        assert_eq!(body["usage"]["total_tokens"], 42);

        let rec = upstream.recorded.lock();
        assert_eq!(rec.bodies.len(), 1);
        assert_eq!(rec.bodies[0]["model"], "srv-model");
        assert_eq!(rec.bodies[0]["max_tokens"], 8192);
        assert_eq!(rec.authorizations[0], "Bearer sk-server");
    }

    #[tokio::test]
    async fn test_missing_model_uses_fallback_id() {
        let upstream = spawn(Behavior::Reply("ok".to_string())).await;
        let proxy = proxy(server_config(upstream.base_url())).await;
        proxy.chat(&history(), None, CTX).await.unwrap();
        assert_eq!(upstream.recorded.lock().bodies[0]["model"], FALLBACK_MODEL_ID);
    }

    #[tokio::test]
    async fn test_personal_model_uses_user_credentials() {
        let upstream = spawn(Behavior::Reply("personal".to_string())).await;
        let proxy = proxy(LlmConfig::default()).await;
        proxy
            .users
            .save_llm_settings(
                "u1",
                LlmSettingsUpdate {
                    use_own_settings: true,
                    model_name: "gpt-4o".to_string(),
                    api_url: upstream.base_url(),
                    api_key: Some("sk-user".to_string()),
                },
            )
            .await
            .unwrap();

        let body = proxy.chat(&history(), Some("personal-gpt-4o"), CTX).await.unwrap();
        assert_eq!(body["choices"][0]["message"]["content"], "personal");
        let rec = upstream.recorded.lock();
        assert_eq!(rec.bodies[0]["model"], "gpt-4o");
        assert_eq!(rec.authorizations[0], "Bearer sk-user");
    }

    #[tokio::test]
    async fn test_personal_model_incomplete_does_not_fall_back() {
        let upstream = spawn(Behavior::Reply("server".to_string())).await;
        let proxy = proxy(server_config(upstream.base_url())).await;
        proxy
            .users
            .save_llm_settings(
                "u1",
                LlmSettingsUpdate {
                    use_own_settings: true,
                    model_name: "gpt-4o".to_string(),
                    api_url: "https://api.openai.com/v1".to_string(),
                    api_key: None,
                },
            )
            .await
            .unwrap();

        let err = proxy.chat(&history(), Some("personal-gpt-4o"), CTX).await.unwrap_err();
        assert_matches!(err, ProxyError::PersonalSettingsIncomplete);

        let anonymous = CallContext { user_id: None, ..CTX };
        let err = proxy.chat(&history(), Some("personal-gpt-4o"), anonymous).await.unwrap_err();
        assert_matches!(err, ProxyError::PersonalSettingsIncomplete);
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn test_personal_lookup_failure() {
        let users = UserStore::new(setup_broken_database().await);
        let proxy = ChatProxy::new(Arc::new(LlmConfig::default()), users, LlmClient::new().unwrap());
        let err = proxy.chat(&history(), Some("personal-x"), CTX).await.unwrap_err();
        assert_matches!(err, ProxyError::SettingsLookup(_));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_upstream_timeout() {
        let upstream = spawn(Behavior::Hang(Duration::from_secs(30))).await;
        let mut config = server_config(upstream.base_url());
        config.chat_timeout = Duration::from_millis(150);
        let proxy = proxy(config).await;
        let err = proxy.chat(&history(), None, CTX).await.unwrap_err();
        assert_matches!(err, ProxyError::Upstream(UpstreamError::Timeout(_)));
    }
}
