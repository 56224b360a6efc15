use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use serde_json::Value;
use tracing::{error, info};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::api::auth::{CurrentUser, OpenAPIAuth};
use crate::api::error::InnerApiError;
use crate::api::request::{CheckConnectionRequest, ChatRequest, SaveLlmSettingsRequest, UpdateUserSettingsRequest};
use crate::api::response::{CheckConnectionResponse, ModelsResponse, SettingsResponse};
use crate::api::wrapper::{ApiError, ApiJson, ApiResponse};
use crate::api::AppContext;
use crate::llm::proxy::{CallContext, ChatProxy};
use crate::user::account::{self, AccountError};
use crate::user::llm_settings::{ConnectionCheck, SaveSettingsError};
use crate::user::{AccountInfo, LlmSettingsView};

#[derive(OpenApi)]
#[openapi(
    paths(get_models, chat, get_llm_settings, save_llm_settings, check_llm_connection, get_user_settings, update_user_settings),
    modifiers(&OpenAPIAuth),
    security(
        ("UserId" = []),
    )
)]
pub struct ApiDoc;

/// 获取当前项目可用的模型列表，登录用户会额外得到个人模型
#[utoipa::path(
    get,
    path = "/project/{id}/llm/models",
    params(("id" = String, Path, description = "项目 ID")),
    responses(
        (status = 200, body = ModelsResponse),
    )
)]
pub async fn get_models(
    Extension(ctx): Extension<Arc<AppContext>>,
    Path(project_id): Path<String>,
    user: Option<CurrentUser>,
) -> Result<ApiResponse<ModelsResponse>, ApiError> {
    let user_id = user.as_ref().map(CurrentUser::id);
    let models = ctx.models.list_models(user_id).await;
    info!(
        project_id = %project_id,
        user_id = user_id.unwrap_or("-"),
        count = models.len(),
        "获取模型列表"
    );
    Ok(ApiResponse::ok(ModelsResponse { models }))
}

/// 转发聊天请求到上游 LLM
#[utoipa::path(
    post,
    path = "/project/{id}/llm/chat",
    params(("id" = String, Path, description = "项目 ID")),
    request_body = ChatRequest,
    responses(
        (status = 200, description = "上游 chat/completions 响应，第一条回复已去除 think 标签"),
        (status = 400, description = "消息格式错误或个人设置不完整"),
        (status = 503, description = "LLM 服务未配置"),
        (status = 504, description = "上游超时"),
    )
)]
pub async fn chat(
    Extension(ctx): Extension<Arc<AppContext>>,
    Path(project_id): Path<String>,
    user: Option<CurrentUser>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> Result<ApiResponse<Value>, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    let messages = ChatProxy::parse_messages(&request.messages).map_err(InnerApiError::from)?;
    let call = CallContext {
        project_id: &project_id,
        user_id: user.as_ref().map(CurrentUser::id),
        request_id: &request_id,
    };
    let body = ctx
        .proxy
        .chat(&messages, request.model.as_deref(), call)
        .await
        .map_err(InnerApiError::from)?;
    Ok(ApiResponse::ok(body))
}

/// 读取当前用户的 LLM 设置（不含密钥）
#[utoipa::path(
    get,
    path = "/user/llm-settings",
    responses(
        (status = 200, body = LlmSettingsView),
        (status = 401, description = "未登录"),
    )
)]
pub async fn get_llm_settings(
    Extension(ctx): Extension<Arc<AppContext>>,
    user: CurrentUser,
) -> Result<ApiResponse<LlmSettingsView>, ApiError> {
    let settings = ctx.users.find_llm_settings(user.id()).await?.unwrap_or_default();
    Ok(ApiResponse::ok(settings.public_view()))
}

/// 保存当前用户的 LLM 设置，未提供密钥时保留已有密钥
#[utoipa::path(
    post,
    path = "/user/llm-settings",
    request_body = SaveLlmSettingsRequest,
    responses(
        (status = 200, body = SettingsResponse),
        (status = 400, body = SettingsResponse),
        (status = 401, description = "未登录"),
    )
)]
pub async fn save_llm_settings(
    Extension(ctx): Extension<Arc<AppContext>>,
    user: CurrentUser,
    ApiJson(request): ApiJson<SaveLlmSettingsRequest>,
) -> Result<ApiResponse<SettingsResponse>, ApiError> {
    match ctx.settings.save(user.id(), request.into()).await {
        Ok(()) => Ok(ApiResponse::ok(SettingsResponse::success_with(
            "LLM settings saved successfully",
        ))),
        Err(e @ (SaveSettingsError::MissingFields | SaveSettingsError::MissingApiKey)) => {
            Ok(ApiResponse::bad_request(SettingsResponse::failure(e.to_string())))
        }
        Err(SaveSettingsError::Store(e)) => {
            error!(user_id = user.id(), error = %format!("{:#}", e), "保存 LLM 设置失败");
            Ok(ApiResponse::with_status(
                StatusCode::INTERNAL_SERVER_ERROR,
                SettingsResponse::failure("Failed to save LLM settings"),
            ))
        }
    }
}

/// 测试 LLM 连接，所有失败都以结构化结果返回
#[utoipa::path(
    post,
    path = "/user/llm-settings/check",
    request_body = CheckConnectionRequest,
    responses(
        (status = 200, body = CheckConnectionResponse),
        (status = 400, body = CheckConnectionResponse),
        (status = 504, body = CheckConnectionResponse),
        (status = 500, body = CheckConnectionResponse),
    )
)]
pub async fn check_llm_connection(
    Extension(ctx): Extension<Arc<AppContext>>,
    user: Option<CurrentUser>,
    ApiJson(request): ApiJson<CheckConnectionRequest>,
) -> Result<ApiResponse<CheckConnectionResponse>, ApiError> {
    let outcome = ctx
        .settings
        .check_connection(user.as_ref().map(CurrentUser::id), request.into())
        .await;

    let response = match outcome {
        ConnectionCheck::Success { duration } => ApiResponse::ok(CheckConnectionResponse {
            success: true,
            message: Some("LLM connection successful".to_string()),
            duration: Some(format!("{}ms", duration.as_millis())),
            ..Default::default()
        }),
        ConnectionCheck::MissingParameters => ApiResponse::bad_request(CheckConnectionResponse {
            error: Some("Missing required parameters".to_string()),
            ..Default::default()
        }),
        ConnectionCheck::Rejected { status, details } => ApiResponse::bad_request(CheckConnectionResponse {
            error: Some("LLM connection failed".to_string()),
            details: Some(details),
            status: Some(status),
            ..Default::default()
        }),
        ConnectionCheck::Timeout { deadline } => ApiResponse::with_status(
            StatusCode::GATEWAY_TIMEOUT,
            CheckConnectionResponse {
                error: Some("Connection timeout".to_string()),
                details: Some(format!(
                    "The LLM API did not respond within {} seconds",
                    deadline.as_secs()
                )),
                ..Default::default()
            },
        ),
        ConnectionCheck::Failed { kind, message } => ApiResponse::with_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            CheckConnectionResponse {
                error: Some("Failed to test LLM connection".to_string()),
                details: Some(message),
                kind: Some(kind),
                ..Default::default()
            },
        ),
    };
    Ok(response)
}

/// 读取账户信息，作为账户表单的初始值
#[utoipa::path(
    get,
    path = "/user/settings",
    responses(
        (status = 200, body = AccountInfo),
        (status = 401, description = "未登录"),
    )
)]
pub async fn get_user_settings(
    Extension(ctx): Extension<Arc<AppContext>>,
    user: CurrentUser,
) -> Result<ApiResponse<AccountInfo>, ApiError> {
    let account = ctx.users.find_account(user.id()).await?.unwrap_or_default();
    Ok(ApiResponse::ok(account))
}

/// 更新账户信息，缺省字段保持不变
#[utoipa::path(
    post,
    path = "/user/settings",
    request_body = UpdateUserSettingsRequest,
    responses(
        (status = 200, body = SettingsResponse),
        (status = 400, body = SettingsResponse),
        (status = 401, description = "未登录"),
    )
)]
pub async fn update_user_settings(
    Extension(ctx): Extension<Arc<AppContext>>,
    user: CurrentUser,
    ApiJson(request): ApiJson<UpdateUserSettingsRequest>,
) -> Result<ApiResponse<SettingsResponse>, ApiError> {
    match account::update_account(&ctx.users, user.id(), request.into()).await {
        Ok(()) => Ok(ApiResponse::ok(SettingsResponse::success())),
        Err(AccountError::Store(e)) => Err(e.into()),
        Err(e) => Ok(ApiResponse::bad_request(SettingsResponse::failure(e.to_string()))),
    }
}
