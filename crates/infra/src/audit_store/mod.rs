//! Append-only audit storage.
//!
//! The store assigns the sequence number and timestamp on append; callers
//! never choose them. Nothing here updates or deletes a record.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryAuditStore;
pub use postgres::PostgresAuditStore;

use rolegate_auth::{AuditEntry, AuditRecord, ChangeType};
use rolegate_core::IdentityId;

use crate::profile_store::StoreError;

/// Default number of records returned by a listing.
pub const DEFAULT_AUDIT_LIMIT: usize = 100;
/// Hard cap on a single listing.
pub const MAX_AUDIT_LIMIT: usize = 500;

/// Filter for [`AuditStore::list`]. Results are newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditQuery {
    pub target_id: Option<IdentityId>,
    pub change_type: Option<ChangeType>,
    pub limit: usize,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            target_id: None,
            change_type: None,
            limit: DEFAULT_AUDIT_LIMIT,
        }
    }
}

impl AuditQuery {
    pub fn for_target(target_id: IdentityId) -> Self {
        Self {
            target_id: Some(target_id),
            ..Default::default()
        }
    }

    pub fn with_change_type(mut self, change_type: ChangeType) -> Self {
        self.change_type = Some(change_type);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Limit clamped to `1..=MAX_AUDIT_LIMIT`.
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, MAX_AUDIT_LIMIT)
    }

    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.target_id.as_ref().is_none_or(|t| &record.target_id == t)
            && self.change_type.is_none_or(|c| record.change_type == c)
    }
}

#[async_trait::async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<AuditRecord, StoreError>;

    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError>;
}
