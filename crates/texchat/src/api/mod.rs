pub mod auth;
pub mod error;
pub mod handler;
pub mod request;
pub mod response;
pub mod wrapper;

use std::sync::Arc;

use anyhow::Result;
use axum::routing::{get, post};
use axum::{Extension, Router};
use sea_orm::DatabaseConnection;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::LlmConfig;
use crate::llm::client::LlmClient;
use crate::llm::models::ModelResolver;
use crate::llm::proxy::ChatProxy;
use crate::user::llm_settings::LlmSettingsService;
use crate::user::store::UserStore;

/// 所有处理器共享的请求上下文，进程启动时构建一次
pub struct AppContext {
    pub users: UserStore,
    pub models: ModelResolver,
    pub proxy: ChatProxy,
    pub settings: LlmSettingsService,
    /// 认证层写入用户 ID 的请求头名
    pub user_header: String,
}

impl AppContext {
    pub fn new(db: DatabaseConnection, config: LlmConfig, user_header: impl Into<String>) -> Result<Self> {
        let config = Arc::new(config);
        let users = UserStore::new(db);
        let client = LlmClient::new()?;
        Ok(Self {
            models: ModelResolver::new(config.clone(), users.clone()),
            proxy: ChatProxy::new(config.clone(), users.clone(), client.clone()),
            settings: LlmSettingsService::new(users.clone(), client, config.check_timeout),
            users,
            user_header: user_header.into().to_ascii_lowercase(),
        })
    }
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/project/{id}/llm/models", get(handler::get_models))
        .route("/project/{id}/llm/chat", post(handler::chat))
        .route(
            "/user/llm-settings",
            get(handler::get_llm_settings).post(handler::save_llm_settings),
        )
        .route("/user/llm-settings/check", post(handler::check_llm_connection))
        .route(
            "/user/settings",
            get(handler::get_user_settings).post(handler::update_user_settings),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", handler::ApiDoc::openapi()))
        .layer(Extension(ctx))
        .layer(CorsLayer::permissive())
}
