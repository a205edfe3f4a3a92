//! Postgres-backed profile store.
//!
//! Every method is a single statement, so each write is atomic per profile:
//! - conditional create is `INSERT ... ON CONFLICT DO NOTHING`
//! - role compare-and-set is `UPDATE ... WHERE role = $expected`
//! - patch preconditions compare the stored `updated_at`

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use rolegate_auth::{Profile, ProfilePatch, Role};
use rolegate_core::IdentityId;

use super::{CreateOutcome, ProfileStore, StoreError};
use crate::db::map_sqlx_error;

const COLUMNS: &str = "identity_id, email, display_name, role, is_active, preferences, \
                       created_at, updated_at, created_by, updated_by, last_logout_at";

#[derive(Debug, Copy, Clone)]
enum FieldChange {
    Role(Role),
    Active(bool),
}

#[derive(Debug, Clone)]
pub struct PostgresProfileStore {
    pool: Arc<PgPool>,
}

impl PostgresProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Shared by the "returns the prior profile" updates: lock the row, keep
    /// a copy, update, return the copy.
    async fn update_returning_prior(
        &self,
        identity_id: &IdentityId,
        change: FieldChange,
        actor: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<Profile, StoreError> {
        let (operation, set_clause) = match change {
            FieldChange::Role(_) => ("set_role", "role = $4"),
            FieldChange::Active(_) => ("set_active", "is_active = $4"),
        };
        let sql = format!(
            r#"
            WITH prior AS (
                SELECT {COLUMNS} FROM profiles WHERE identity_id = $1 FOR UPDATE
            )
            UPDATE profiles p
            SET {set_clause}, updated_at = $2, updated_by = $3
            FROM prior
            WHERE p.identity_id = prior.identity_id
            RETURNING prior.*
            "#
        );
        let query = sqlx::query(&sql)
            .bind(identity_id.as_str())
            .bind(at)
            .bind(actor.as_str());
        let query = match change {
            FieldChange::Role(role) => query.bind(role.as_str()),
            FieldChange::Active(active) => query.bind(active),
        };
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?
            .ok_or(StoreError::NotFound)?;
        ProfileRow::from_row(&row)
            .map_err(|e| StoreError::Backend(format!("failed to decode profile row: {e}")))?
            .try_into()
    }

    async fn exists(&self, identity_id: &IdentityId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 AS one FROM profiles WHERE identity_id = $1")
            .bind(identity_id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("exists", e))?;
        Ok(row.is_some())
    }
}

#[async_trait::async_trait]
impl ProfileStore for PostgresProfileStore {
    #[instrument(skip(self, profile), fields(identity_id = %profile.identity_id), err)]
    async fn create_if_absent(&self, profile: &Profile) -> Result<CreateOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO profiles (
                identity_id, email, display_name, role, is_active, preferences,
                created_at, updated_at, created_by, updated_by, last_logout_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (identity_id) DO NOTHING
            "#,
        )
        .bind(profile.identity_id.as_str())
        .bind(&profile.email)
        .bind(&profile.display_name)
        .bind(profile.role.as_str())
        .bind(profile.is_active)
        .bind(&profile.preferences)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .bind(profile.created_by.as_str())
        .bind(profile.updated_by.as_str())
        .bind(profile.last_logout_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_if_absent", e))?;

        Ok(if result.rows_affected() == 1 {
            CreateOutcome::Created
        } else {
            CreateOutcome::AlreadyExists
        })
    }

    async fn get(&self, identity_id: &IdentityId) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM profiles WHERE identity_id = $1"
        ))
        .bind(identity_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", e))?;

        row.map(|r| {
            ProfileRow::from_row(&r)
                .map_err(|e| StoreError::Backend(format!("failed to decode profile row: {e}")))?
                .try_into()
        })
        .transpose()
    }

    #[instrument(skip(self), err)]
    async fn set_role(
        &self,
        identity_id: &IdentityId,
        role: Role,
        actor: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<Profile, StoreError> {
        self.update_returning_prior(identity_id, FieldChange::Role(role), actor, at)
            .await
    }

    #[instrument(skip(self), err)]
    async fn compare_and_set_role(
        &self,
        identity_id: &IdentityId,
        expected: Role,
        role: Role,
        actor: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET role = $3, updated_at = $4, updated_by = $5
            WHERE identity_id = $1 AND role = $2
            "#,
        )
        .bind(identity_id.as_str())
        .bind(expected.as_str())
        .bind(role.as_str())
        .bind(at)
        .bind(actor.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("compare_and_set_role", e))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if self.exists(identity_id).await? {
            Ok(false)
        } else {
            Err(StoreError::NotFound)
        }
    }

    #[instrument(skip(self, patch), err)]
    async fn apply_patch(
        &self,
        identity_id: &IdentityId,
        patch: &ProfilePatch,
        expected_updated_at: Option<DateTime<Utc>>,
        actor: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<Profile, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE profiles
            SET display_name = COALESCE($2, display_name),
                preferences  = COALESCE($3, preferences),
                role         = COALESCE($4, role),
                is_active    = COALESCE($5, is_active),
                updated_at   = $6,
                updated_by   = $7
            WHERE identity_id = $1
              AND ($8::timestamptz IS NULL OR updated_at = $8)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(identity_id.as_str())
        .bind(patch.display_name.as_deref().map(str::trim))
        .bind(patch.preferences.as_ref())
        .bind(patch.role.map(|r| r.as_str()))
        .bind(patch.is_active)
        .bind(at)
        .bind(actor.as_str())
        .bind(expected_updated_at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("apply_patch", e))?;

        match row {
            Some(r) => ProfileRow::from_row(&r)
                .map_err(|e| StoreError::Backend(format!("failed to decode profile row: {e}")))?
                .try_into(),
            None if self.exists(identity_id).await? => Err(StoreError::Conflict(
                "profile changed since it was read".to_string(),
            )),
            None => Err(StoreError::NotFound),
        }
    }

    #[instrument(skip(self), err)]
    async fn set_active(
        &self,
        identity_id: &IdentityId,
        active: bool,
        actor: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<Profile, StoreError> {
        self.update_returning_prior(identity_id, FieldChange::Active(active), actor, at)
            .await
    }

    async fn record_logout(
        &self,
        identity_id: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE profiles SET last_logout_at = $2 WHERE identity_id = $1")
            .bind(identity_id.as_str())
            .bind(at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("record_logout", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, identity_id: &IdentityId) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query(&format!(
            "DELETE FROM profiles WHERE identity_id = $1 RETURNING {COLUMNS}"
        ))
        .bind(identity_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete", e))?;

        row.map(|r| {
            ProfileRow::from_row(&r)
                .map_err(|e| StoreError::Backend(format!("failed to decode profile row: {e}")))?
                .try_into()
        })
        .transpose()
    }

    async fn count_with_role(&self, role: Role, active_only: bool) -> Result<u64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM profiles WHERE role = $1 AND ($2 = FALSE OR is_active)",
        )
        .bind(role.as_str())
        .bind(active_only)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_with_role", e))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| StoreError::Backend(format!("failed to decode count: {e}")))?;
        Ok(n.max(0) as u64)
    }
}

// SQLx row types

#[derive(Debug)]
struct ProfileRow {
    identity_id: String,
    email: String,
    display_name: String,
    role: String,
    is_active: bool,
    preferences: JsonValue,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    created_by: String,
    updated_by: String,
    last_logout_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ProfileRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProfileRow {
            identity_id: row.try_get("identity_id")?,
            email: row.try_get("email")?,
            display_name: row.try_get("display_name")?,
            role: row.try_get("role")?,
            is_active: row.try_get("is_active")?,
            preferences: row.try_get("preferences")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            created_by: row.try_get("created_by")?,
            updated_by: row.try_get("updated_by")?,
            last_logout_at: row.try_get("last_logout_at")?,
        })
    }
}

impl TryFrom<ProfileRow> for Profile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let id = |s: String| {
            IdentityId::new(s).map_err(|e| StoreError::Backend(format!("corrupt identity id: {e}")))
        };
        Ok(Profile {
            identity_id: id(row.identity_id)?,
            email: row.email,
            display_name: row.display_name,
            role: Role::from_str(&row.role)
                .map_err(|e| StoreError::Backend(format!("corrupt role: {e}")))?,
            is_active: row.is_active,
            preferences: row.preferences,
            created_at: row.created_at,
            updated_at: row.updated_at,
            created_by: id(row.created_by)?,
            updated_by: id(row.updated_by)?,
            last_logout_at: row.last_logout_at,
        })
    }
}
