use std::sync::Arc;

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::Modify;

use crate::api::error::InnerApiError;
use crate::api::wrapper::ApiError;
use crate::api::AppContext;
use crate::config::DEFAULT_USER_HEADER;

/// 认证层确认过的用户 ID，由前置会话层通过请求头传入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.0
    }
}

fn user_from_parts(parts: &Parts) -> Option<CurrentUser> {
    let header = parts
        .extensions
        .get::<Arc<AppContext>>()
        .map(|ctx| ctx.user_header.as_str())
        .unwrap_or(DEFAULT_USER_HEADER);
    parts
        .headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| CurrentUser(value.to_string()))
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_from_parts(parts).ok_or_else(|| InnerApiError::Unauthorized.into())
    }
}

impl<S> OptionalFromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Option<Self>, Self::Rejection> {
        Ok(user_from_parts(parts))
    }
}

pub struct OpenAPIAuth;

impl Modify for OpenAPIAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(schema) = openapi.components.as_mut() {
            schema.add_security_scheme(
                "UserId",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    DEFAULT_USER_HEADER,
                    "认证层写入的用户 ID",
                ))),
            );
        }
    }
}
