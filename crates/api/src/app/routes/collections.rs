use std::sync::Arc;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    extract::{Extension, Path},
    http::StatusCode,
};
use serde_json::{Map, Value};
use uuid::Uuid;

use rolegate_infra::gateway::Document;
use rolegate_infra::{AccessError, AccessService};

use crate::app::errors::ApiError;
use crate::context::CallerContext;

type Body = Result<Json<Map<String, Value>>, JsonRejection>;

/// GET /collections/:collection - documents the caller may read
pub async fn list(
    Extension(service): Extension<Arc<AccessService>>,
    Extension(caller): Extension<CallerContext>,
    Path(collection): Path<String>,
) -> Result<Json<Vec<Document>>, ApiError> {
    Ok(Json(service.list_documents(caller.principal(), &collection).await?))
}

/// POST /collections/:collection
pub async fn create(
    Extension(service): Extension<Arc<AccessService>>,
    Extension(caller): Extension<CallerContext>,
    Path(collection): Path<String>,
    body: Body,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let Json(fields) = body?;
    let doc = service
        .create_document(caller.principal(), &collection, fields)
        .await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

/// GET /collections/:collection/:id
pub async fn read(
    Extension(service): Extension<Arc<AccessService>>,
    Extension(caller): Extension<CallerContext>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Document>, ApiError> {
    let id = parse_document_id(&id)?;
    Ok(Json(service.read_document(caller.principal(), &collection, id).await?))
}

/// PATCH /collections/:collection/:id - shallow merge
pub async fn update(
    Extension(service): Extension<Arc<AccessService>>,
    Extension(caller): Extension<CallerContext>,
    Path((collection, id)): Path<(String, String)>,
    body: Body,
) -> Result<Json<Document>, ApiError> {
    let id = parse_document_id(&id)?;
    let Json(fields) = body?;
    Ok(Json(
        service
            .update_document(caller.principal(), &collection, id, fields)
            .await?,
    ))
}

/// DELETE /collections/:collection/:id
pub async fn delete(
    Extension(service): Extension<Arc<AccessService>>,
    Extension(caller): Extension<CallerContext>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let id = parse_document_id(&id)?;
    service
        .delete_document(caller.principal(), &collection, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_document_id(raw: &str) -> Result<Uuid, AccessError> {
    Uuid::parse_str(raw).map_err(|_| AccessError::InvalidArgument("malformed document id".to_string()))
}
