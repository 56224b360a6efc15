use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use super::PERSONAL_MODEL_PREFIX;
use crate::config::LlmConfig;
use crate::user::store::UserStore;
use crate::user::UserLlmSettings;

/// 暴露给客户端的模型选项，每次请求重新计算
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    /// 展示名
    pub name: String,
    pub is_default: bool,
    #[serde(default)]
    pub is_personal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// 展示名：连字符换成空格并转大写
pub fn display_name(id: &str) -> String {
    id.replace('-', " ").to_uppercase()
}

/// 全局模型，保持配置顺序，第一个为默认
pub fn server_models(config: &LlmConfig) -> Vec<Model> {
    config
        .model_ids
        .iter()
        .enumerate()
        .map(|(index, id)| Model {
            id: id.clone(),
            name: display_name(id),
            is_default: index == 0,
            is_personal: false,
            label: None,
        })
        .collect()
}

/// 设置完整时生成个人模型，永远不是默认模型
pub fn personal_model(settings: &UserLlmSettings) -> Option<Model> {
    if !settings.is_complete() {
        return None;
    }
    let model_name = settings.model_name.trim();
    Some(Model {
        id: format!("{}{}", PERSONAL_MODEL_PREFIX, model_name),
        name: format!("{} (🔒 Personal)", model_name),
        is_default: false,
        is_personal: true,
        label: Some("Private".to_string()),
    })
}

/// 模型解析器：合并全局模型与当前用户的个人模型
#[derive(Clone)]
pub struct ModelResolver {
    config: Arc<LlmConfig>,
    users: UserStore,
}

impl ModelResolver {
    pub fn new(config: Arc<LlmConfig>, users: UserStore) -> Self {
        Self { config, users }
    }

    /// 返回空列表表示功能不可用；读取用户失败只记录日志，不向外抛出
    pub async fn list_models(&self, user_id: Option<&str>) -> Vec<Model> {
        let mut models = server_models(&self.config);
        let server_count = models.len();

        if let Some(user_id) = user_id {
            match self.users.find_llm_settings(user_id).await {
                Ok(Some(settings)) => {
                    if let Some(model) = personal_model(&settings) {
                        info!(user_id, model = %settings.model_name, "已加入用户个人模型");
                        models.push(model);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(user_id, error = %format!("{:#}", e), "读取用户 LLM 设置失败，忽略个人模型"),
            }
        }

        if models.is_empty() {
            warn!(user_id = user_id.unwrap_or("-"), "没有可用的 LLM 模型");
        }
        info!(
            server_models = server_count,
            total = models.len(),
            "返回可用模型列表"
        );
        models
    }
}
