//! Audit Recorder.
//!
//! `record` never fails the caller. One attempt, bounded by a timeout; on
//! failure the entry is reported on the operational channel and dropped.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use rolegate_auth::{AuditEntry, AuditRecord};

use crate::alerts::{AlertKind, AlertSink, OperationalAlert};
use crate::audit_store::AuditStore;

#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    alerts: Arc<dyn AlertSink>,
    timeout: Duration,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>, alerts: Arc<dyn AlertSink>, timeout: Duration) -> Self {
        Self {
            store,
            alerts,
            timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Append `entry`. Returns the stored record, or `None` if the write failed.
    pub async fn record(&self, entry: AuditEntry) -> Option<AuditRecord> {
        let target = entry.target_id.clone();
        let change_type = entry.change_type;

        let failure = match tokio::time::timeout(self.timeout, self.store.append(entry)).await {
            Ok(Ok(record)) => {
                debug!(
                    target_id = %record.target_id,
                    change_type = %record.change_type,
                    sequence = record.sequence,
                    "audit record appended"
                );
                return Some(record);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {} ms", self.timeout.as_millis()),
        };

        self.alerts.raise(OperationalAlert::new(
            AlertKind::AuditWriteFailed,
            Some(target),
            format!("{change_type} audit record dropped: {failure}"),
        ));
        None
    }
}
