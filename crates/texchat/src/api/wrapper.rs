use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use crate::api::error::InnerApiError;

/// 带状态码的 JSON 响应
pub struct ApiResponse<T: Serialize> {
    status_code: StatusCode,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status_code: StatusCode::OK,
            data,
        }
    }

    pub fn bad_request(data: T) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, data)
    }

    pub fn with_status(status_code: StatusCode, data: T) -> Self {
        Self { status_code, data }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status_code, Json(self.data)).into_response()
    }
}

/// 处理器统一错误类型，任何错误都会转换成 JSON 信封而不会让请求崩溃
pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(value: E) -> Self {
        Self(value.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Some(inner) = self.0.downcast_ref::<InnerApiError>() {
            let status = inner.status_code();
            if status.is_server_error() {
                error!(status = status.as_u16(), error = %inner, "请求处理失败");
            } else {
                warn!(status = status.as_u16(), error = %inner, "请求被拒绝");
            }
            return (status, Json(inner.body())).into_response();
        }
        error!(error = %format!("{:#}", self.0), "请求处理出现未预期错误");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Internal server error", "details": format!("{:#}", self.0) })),
        )
            .into_response()
    }
}

/// JSON 请求体提取器，解析失败时同样返回 JSON 错误信封
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(InnerApiError::BadRequest(rejection.body_text()).into()),
        }
    }
}
