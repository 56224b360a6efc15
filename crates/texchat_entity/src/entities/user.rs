use sea_orm::entity::prelude::*;

/// 用户文档实体
///
/// 主键由上游认证层分配，这里只保存账户字段与个人 LLM 凭据。
/// `llm_api_key` 只在服务端读取，任何响应都不会回传原始密钥。
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub use_own_llm_settings: bool,
    pub llm_model_name: String,
    pub llm_api_url: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub llm_api_key: Option<String>,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
