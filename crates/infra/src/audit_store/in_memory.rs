use std::sync::RwLock;

use chrono::{DateTime, Utc};

use rolegate_auth::{AuditEntry, AuditRecord};

use super::{AuditQuery, AuditStore};
use crate::profile_store::StoreError;

/// In-memory append-only audit log.
///
/// Timestamps are server-assigned and never go backwards, even if the wall
/// clock does.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record, oldest first.
    pub fn all(&self) -> Vec<AuditRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: AuditEntry) -> Result<AuditRecord, StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        let last: Option<DateTime<Utc>> = records.last().map(|r| r.timestamp);
        let now = Utc::now();
        let timestamp = match last {
            Some(prev) if now <= prev => prev + chrono::Duration::microseconds(1),
            _ => now,
        };
        let sequence = records.len() as u64 + 1;

        let record = AuditRecord::from_entry(entry, sequence, timestamp);
        records.push(record.clone());
        Ok(record)
    }

    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(records
            .iter()
            .rev()
            .filter(|r| query.matches(r))
            .take(query.effective_limit())
            .cloned()
            .collect())
    }
}
