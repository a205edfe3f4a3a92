use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use rolegate_infra::{AccessError, AccessService};

use crate::app::errors::ApiError;
use crate::context::{CallerContext, PrincipalContext};

#[derive(Clone)]
pub struct AuthState {
    pub service: Arc<AccessService>,
}

/// Require a valid bearer token.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer(req.headers()) {
        Ok(Some(token)) => token,
        Ok(None) | Err(_) => return ApiError(AccessError::Unauthenticated).into_response(),
    };

    match state.service.authenticate(&token).await {
        Ok(principal) => {
            req.extensions_mut().insert(PrincipalContext::new(principal));
            next.run(req).await
        }
        Err(e) => ApiError(e).into_response(),
    }
}

/// Accept anonymous callers; a token, when present, must be valid.
pub async fn optional_auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let caller = match extract_bearer(req.headers()) {
        Ok(None) => CallerContext::anonymous(),
        Ok(Some(token)) => match state.service.authenticate(&token).await {
            Ok(principal) => CallerContext::authenticated(principal),
            Err(e) => return ApiError(e).into_response(),
        },
        Err(e) => return ApiError(e).into_response(),
    };
    req.extensions_mut().insert(caller);
    next.run(req).await
}

/// `Ok(None)` when there is no `Authorization` header at all.
pub fn extract_bearer(headers: &HeaderMap) -> Result<Option<String>, AccessError> {
    let Some(header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let header = header.to_str().map_err(|_| AccessError::Unauthenticated)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AccessError::Unauthenticated)?
        .trim();
    if token.is_empty() {
        return Err(AccessError::Unauthenticated);
    }

    Ok(Some(token.to_string()))
}
