use anyhow::{Context, Result};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, Set};
use tracing::debug;

use super::{AccountInfo, UserLlmSettings};
use crate::utils::time_format::now_standard_string;
use texchat_entity::user;

/// 设置保存请求合并后的写入内容
#[derive(Debug, Clone, Default)]
pub struct LlmSettingsUpdate {
    pub use_own_settings: bool,
    pub model_name: String,
    pub api_url: String,
    /// 为 `None` 时保留已有密钥
    pub api_key: Option<String>,
}

/// 账户字段的部分更新，`None` 表示不修改
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// 用户文档的唯一读写入口
#[derive(Clone)]
pub struct UserStore {
    db: DatabaseConnection,
}

impl UserStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_llm_settings(&self, user_id: &str) -> Result<Option<UserLlmSettings>> {
        let model = user::Entity::find_by_id(user_id.to_string())
            .one(&self.db)
            .await
            .with_context(|| format!("读取用户 {} 失败", user_id))?;

        Ok(model.map(|m| UserLlmSettings {
            use_own_settings: m.use_own_llm_settings,
            model_name: m.llm_model_name,
            api_url: m.llm_api_url,
            api_key: m.llm_api_key.filter(|key| !key.trim().is_empty()),
        }))
    }

    pub async fn find_account(&self, user_id: &str) -> Result<Option<AccountInfo>> {
        let model = user::Entity::find_by_id(user_id.to_string())
            .one(&self.db)
            .await
            .with_context(|| format!("读取用户 {} 失败", user_id))?;

        Ok(model.map(|m| AccountInfo {
            email: m.email,
            first_name: m.first_name,
            last_name: m.last_name,
        }))
    }

    /// 合并写入 LLM 设置：布尔值和字符串总是覆盖，密钥仅在提供时覆盖
    pub async fn save_llm_settings(&self, user_id: &str, update: LlmSettingsUpdate) -> Result<()> {
        let (mut active, exists) = self.load_or_new(user_id).await?;
        active.use_own_llm_settings = Set(update.use_own_settings);
        active.llm_model_name = Set(update.model_name);
        active.llm_api_url = Set(update.api_url);
        let key_updated = update.api_key.is_some();
        if let Some(key) = update.api_key {
            active.llm_api_key = Set(Some(key));
        }
        active.updated_at = Set(now_standard_string());
        self.persist(active, exists).await?;

        debug!(user_id, key_updated, "用户 LLM 设置已写入");
        Ok(())
    }

    pub async fn update_account(&self, user_id: &str, update: AccountUpdate) -> Result<()> {
        let (mut active, exists) = self.load_or_new(user_id).await?;
        if let Some(email) = update.email {
            active.email = Set(email);
        }
        if let Some(first_name) = update.first_name {
            active.first_name = Set(first_name);
        }
        if let Some(last_name) = update.last_name {
            active.last_name = Set(last_name);
        }
        active.updated_at = Set(now_standard_string());
        self.persist(active, exists).await?;

        debug!(user_id, "账户信息已写入");
        Ok(())
    }

    /// 已有文档转为 ActiveModel；认证层已确认身份但尚无文档时创建新行
    async fn load_or_new(&self, user_id: &str) -> Result<(user::ActiveModel, bool)> {
        let existing = user::Entity::find_by_id(user_id.to_string())
            .one(&self.db)
            .await
            .with_context(|| format!("读取用户 {} 失败", user_id))?;

        Ok(match existing {
            Some(model) => (model.into_active_model(), true),
            None => (
                user::ActiveModel {
                    id: Set(user_id.to_string()),
                    email: Set(String::new()),
                    first_name: Set(String::new()),
                    last_name: Set(String::new()),
                    use_own_llm_settings: Set(false),
                    llm_model_name: Set(String::new()),
                    llm_api_url: Set(String::new()),
                    llm_api_key: Set(None),
                    updated_at: Set(now_standard_string()),
                },
                false,
            ),
        })
    }

    async fn persist(&self, active: user::ActiveModel, exists: bool) -> Result<()> {
        if exists {
            active.update(&self.db).await.context("更新用户文档失败")?;
        } else {
            active.insert(&self.db).await.context("创建用户文档失败")?;
        }
        Ok(())
    }
}
