//! Profile Store Adapter.
//!
//! The only writer of profile records. Every mutation is a single
//! per-document conditional write; there are no multi-document transactions.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryProfileStore;
pub use postgres::PostgresProfileStore;

use chrono::{DateTime, Utc};
use thiserror::Error;

use rolegate_auth::{Profile, ProfilePatch, Role};
use rolegate_core::IdentityId;

use crate::retry::Retryable;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out: {0}")]
    Timeout(String),

    #[error("record not found")]
    NotFound,

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }

    fn timed_out(operation: &'static str) -> Self {
        StoreError::Timeout(operation.to_string())
    }
}

/// Result of a conditional create.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert `profile` unless one already exists for its identity.
    ///
    /// Single conditional write: two concurrent calls for the same identity
    /// produce exactly one `Created`.
    async fn create_if_absent(&self, profile: &Profile) -> Result<CreateOutcome, StoreError>;

    async fn get(&self, identity_id: &IdentityId) -> Result<Option<Profile>, StoreError>;

    /// Unconditionally set the role. Returns the profile as it was before.
    async fn set_role(
        &self,
        identity_id: &IdentityId,
        role: Role,
        actor: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<Profile, StoreError>;

    /// Set the role only if it is currently `expected`. Returns whether the
    /// write happened.
    async fn compare_and_set_role(
        &self,
        identity_id: &IdentityId,
        expected: Role,
        role: Role,
        actor: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Apply a partial update. When `expected_updated_at` is given the write
    /// only happens if the stored `updated_at` still matches (`Conflict`
    /// otherwise). Returns the updated profile.
    async fn apply_patch(
        &self,
        identity_id: &IdentityId,
        patch: &ProfilePatch,
        expected_updated_at: Option<DateTime<Utc>>,
        actor: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<Profile, StoreError>;

    /// Set `is_active`. Returns the profile as it was before.
    async fn set_active(
        &self,
        identity_id: &IdentityId,
        active: bool,
        actor: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<Profile, StoreError>;

    async fn record_logout(&self, identity_id: &IdentityId, at: DateTime<Utc>)
    -> Result<(), StoreError>;

    /// Delete the profile. Returns what was deleted, `None` if nothing was there.
    async fn delete(&self, identity_id: &IdentityId) -> Result<Option<Profile>, StoreError>;

    async fn count_with_role(&self, role: Role, active_only: bool) -> Result<u64, StoreError>;
}
