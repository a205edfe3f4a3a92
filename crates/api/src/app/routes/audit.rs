use std::sync::Arc;

use axum::{
    Json,
    extract::rejection::QueryRejection,
    extract::{Extension, Query},
};

use rolegate_infra::AccessService;

use crate::app::dto::{AuditListQuery, AuditListResponse};
use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

/// GET /audit - newest first; `targetId`, `changeType` and `limit` filter
pub async fn list(
    Extension(service): Extension<Arc<AccessService>>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<AuditListQuery>, QueryRejection>,
) -> Result<Json<AuditListResponse>, ApiError> {
    let Query(query) = query?;
    let records = service
        .list_audit(principal.principal(), &query.into_query()?)
        .await?;
    Ok(Json(AuditListResponse { records }))
}
