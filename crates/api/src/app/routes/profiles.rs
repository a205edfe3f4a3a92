use std::sync::Arc;

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Extension, Path, Query},
};

use rolegate_auth::{ProfilePatch, PublicProfile};
use rolegate_infra::AccessService;

use crate::app::dto::{PreconditionQuery, parse_identity_id};
use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

/// GET /profile - the caller's own profile
pub async fn get_own(
    Extension(service): Extension<Arc<AccessService>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<PublicProfile>, ApiError> {
    Ok(Json(service.get_profile(principal.principal()).await?))
}

/// PATCH /profile - update the caller's own profile
pub async fn update_own(
    Extension(service): Extension<Arc<AccessService>>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<PreconditionQuery>, QueryRejection>,
    body: Result<Json<ProfilePatch>, JsonRejection>,
) -> Result<Json<PublicProfile>, ApiError> {
    let Query(precondition) = query?;
    let Json(patch) = body?;
    let profile = service
        .update_profile(
            principal.principal(),
            principal.identity_id(),
            &patch,
            precondition.expected_updated_at,
        )
        .await?;
    Ok(Json(profile))
}

/// GET /profiles/:id
pub async fn get(
    Extension(service): Extension<Arc<AccessService>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<PublicProfile>, ApiError> {
    let id = parse_identity_id(id)?;
    Ok(Json(service.profile_of(principal.principal(), &id).await?))
}

/// PATCH /profiles/:id
pub async fn update(
    Extension(service): Extension<Arc<AccessService>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    query: Result<Query<PreconditionQuery>, QueryRejection>,
    body: Result<Json<ProfilePatch>, JsonRejection>,
) -> Result<Json<PublicProfile>, ApiError> {
    let id = parse_identity_id(id)?;
    let Query(precondition) = query?;
    let Json(patch) = body?;
    let profile = service
        .update_profile(principal.principal(), &id, &patch, precondition.expected_updated_at)
        .await?;
    Ok(Json(profile))
}

/// POST /profiles/:id/deactivate - elevated only; revokes the target's sessions
pub async fn deactivate(
    Extension(service): Extension<Arc<AccessService>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<PublicProfile>, ApiError> {
    let id = parse_identity_id(id)?;
    Ok(Json(service.deactivate(principal.principal(), &id).await?))
}

/// POST /profiles/:id/reactivate - elevated only
pub async fn reactivate(
    Extension(service): Extension<Arc<AccessService>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<PublicProfile>, ApiError> {
    let id = parse_identity_id(id)?;
    Ok(Json(service.reactivate(principal.principal(), &id).await?))
}
