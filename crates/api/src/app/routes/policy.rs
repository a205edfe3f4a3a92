use std::sync::Arc;

use axum::{
    Json,
    extract::rejection::QueryRejection,
    extract::{Extension, Query},
};

use rolegate_auth::policy::Explanation;
use rolegate_infra::AccessService;

use crate::app::dto::ExplainQuery;
use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

/// GET /policy/explain - why the caller would be allowed or denied
pub async fn explain(
    Extension(service): Extension<Arc<AccessService>>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<ExplainQuery>, QueryRejection>,
) -> Result<Json<Explanation>, ApiError> {
    let Query(query) = query?;
    let explanation = service
        .explain(
            principal.principal(),
            query.operation()?,
            &query.collection,
            query.resource_id.as_deref(),
        )
        .await?;
    Ok(Json(explanation))
}
