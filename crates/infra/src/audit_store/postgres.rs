//! Postgres-backed audit log.
//!
//! `sequence` comes from a `BIGSERIAL`, `recorded_at` from `clock_timestamp()`;
//! a trigger rejects any `UPDATE`/`DELETE` on the table.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use rolegate_auth::{AuditEntry, AuditRecord, ChangeType};
use rolegate_core::{AuditRecordId, IdentityId};

use super::{AuditQuery, AuditStore};
use crate::db::map_sqlx_error;
use crate::profile_store::StoreError;

#[derive(Debug, Clone)]
pub struct PostgresAuditStore {
    pool: Arc<PgPool>,
}

impl PostgresAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl AuditStore for PostgresAuditStore {
    #[instrument(
        skip(self, entry),
        fields(target_id = %entry.target_id, change_type = %entry.change_type),
        err
    )]
    async fn append(&self, entry: AuditEntry) -> Result<AuditRecord, StoreError> {
        let id = AuditRecordId::new();
        let row = sqlx::query(
            r#"
            INSERT INTO audit_records (id, actor_id, target_id, change_type, old_value, new_value, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING sequence, recorded_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(entry.actor_id.as_str())
        .bind(entry.target_id.as_str())
        .bind(entry.change_type.as_str())
        .bind(&entry.old_value)
        .bind(&entry.new_value)
        .bind(&entry.metadata)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("append_audit", e))?;

        let sequence: i64 = row
            .try_get("sequence")
            .map_err(|e| StoreError::Backend(format!("failed to decode sequence: {e}")))?;
        let recorded_at: DateTime<Utc> = row
            .try_get("recorded_at")
            .map_err(|e| StoreError::Backend(format!("failed to decode recorded_at: {e}")))?;

        Ok(AuditRecord {
            id,
            sequence: sequence as u64,
            actor_id: entry.actor_id,
            target_id: entry.target_id,
            change_type: entry.change_type,
            old_value: entry.old_value,
            new_value: entry.new_value,
            timestamp: recorded_at,
            metadata: entry.metadata,
        })
    }

    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, sequence, actor_id, target_id, change_type,
                   old_value, new_value, metadata, recorded_at
            FROM audit_records
            WHERE ($1::text IS NULL OR target_id = $1)
              AND ($2::text IS NULL OR change_type = $2)
            ORDER BY sequence DESC
            LIMIT $3
            "#,
        )
        .bind(query.target_id.as_ref().map(|t| t.as_str()))
        .bind(query.change_type.map(|c| c.as_str()))
        .bind(query.effective_limit() as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_audit", e))?;

        rows.iter()
            .map(|r| {
                AuditRow::from_row(r)
                    .map_err(|e| StoreError::Backend(format!("failed to decode audit row: {e}")))?
                    .try_into()
            })
            .collect()
    }
}

// SQLx row types

#[derive(Debug)]
struct AuditRow {
    id: uuid::Uuid,
    sequence: i64,
    actor_id: String,
    target_id: String,
    change_type: String,
    old_value: JsonValue,
    new_value: JsonValue,
    metadata: JsonValue,
    recorded_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for AuditRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(AuditRow {
            id: row.try_get("id")?,
            sequence: row.try_get("sequence")?,
            actor_id: row.try_get("actor_id")?,
            target_id: row.try_get("target_id")?,
            change_type: row.try_get("change_type")?,
            old_value: row.try_get("old_value")?,
            new_value: row.try_get("new_value")?,
            metadata: row.try_get("metadata")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

impl TryFrom<AuditRow> for AuditRecord {
    type Error = StoreError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let id = |s: String| {
            IdentityId::new(s).map_err(|e| StoreError::Backend(format!("corrupt identity id: {e}")))
        };
        Ok(AuditRecord {
            id: AuditRecordId::from_uuid(row.id),
            sequence: row.sequence as u64,
            actor_id: id(row.actor_id)?,
            target_id: id(row.target_id)?,
            change_type: ChangeType::from_str(&row.change_type)
                .map_err(|e| StoreError::Backend(format!("corrupt change type: {e}")))?,
            old_value: row.old_value,
            new_value: row.new_value,
            timestamp: row.recorded_at,
            metadata: row.metadata,
        })
    }
}
