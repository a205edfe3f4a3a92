use std::sync::Arc;

use axum::{Json, extract::Extension, extract::rejection::JsonRejection};

use rolegate_infra::{AccessService, RoleGrant};

use crate::app::dto::{GrantRoleRequest, parse_identity_id};
use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

/// POST /roles/grant - set a target identity's role (elevated callers only)
pub async fn grant_role(
    Extension(service): Extension<Arc<AccessService>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<GrantRoleRequest>, JsonRejection>,
) -> Result<Json<RoleGrant>, ApiError> {
    let Json(req) = body?;
    let target_id = parse_identity_id(req.target_id)?;
    let grant = service
        .grant_role(principal.principal(), &req.role, &target_id)
        .await?;
    Ok(Json(grant))
}
