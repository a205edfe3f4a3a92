use std::sync::Arc;

use axum::{Json, extract::Extension, http::HeaderMap};

use rolegate_infra::{AccessError, AccessService, IssuedToken, LogoutResult};

use crate::app::dto::WhoAmIResponse;
use crate::app::errors::ApiError;
use crate::context::PrincipalContext;
use crate::middleware::extract_bearer;

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse::from(principal.principal()))
}

/// POST /session/logout - revoke every session of the caller
pub async fn logout(
    Extension(service): Extension<Arc<AccessService>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<LogoutResult>, ApiError> {
    Ok(Json(service.logout(principal.principal()).await?))
}

/// POST /session/refresh - exchange the bearer token for one with current claims
pub async fn refresh(
    Extension(service): Extension<Arc<AccessService>>,
    headers: HeaderMap,
) -> Result<Json<IssuedToken>, ApiError> {
    let token = extract_bearer(&headers)?.ok_or(AccessError::Unauthenticated)?;
    Ok(Json(service.refresh(&token).await?))
}
