//! Postgres wiring shared by the profile and audit adapters.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any other | `Backend` |
//! | PoolTimedOut / PoolClosed / Io / Tls | N/A | `Unavailable` (retryable) |
//! | RowNotFound | N/A | `NotFound` |
//! | Other | N/A | `Backend` |

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::profile_store::StoreError;

const SCHEMA: &str = include_str!("../migrations/0001_rolegate.sql");

/// Open a connection pool. `acquire_timeout` bounds how long a call may wait
/// for a connection before it is reported as unavailable.
pub async fn connect(url: &str, acquire_timeout: Duration) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(16)
        .acquire_timeout(acquire_timeout)
        .connect(url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

/// Apply the schema. Every statement is idempotent.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("migrate", e))?;
    info!("database schema up to date");
    Ok(())
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Unavailable(format!("{operation}: {err}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
