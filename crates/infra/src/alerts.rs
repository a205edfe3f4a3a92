//! Operational alert channel.
//!
//! Failures that must not fail the caller's primary operation, but need a
//! human to look at them, are raised here: audit writes that were dropped,
//! deletions abandoned after bounded retries, compensations that could not be
//! applied, background revocations that gave up.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use rolegate_core::IdentityId;

/// Log target for operational alerts.
pub const OPS_TARGET: &str = "rolegate::ops";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    AuditWriteFailed,
    DeletionAbandoned,
    ProvisioningAbandoned,
    RollbackFailed,
    RevocationAbandoned,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::AuditWriteFailed => "audit_write_failed",
            AlertKind::DeletionAbandoned => "deletion_abandoned",
            AlertKind::ProvisioningAbandoned => "provisioning_abandoned",
            AlertKind::RollbackFailed => "rollback_failed",
            AlertKind::RevocationAbandoned => "revocation_abandoned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationalAlert {
    pub kind: AlertKind,
    pub identity_id: Option<IdentityId>,
    pub detail: String,
    pub raised_at: DateTime<Utc>,
}

impl OperationalAlert {
    pub fn new(kind: AlertKind, identity_id: Option<IdentityId>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            identity_id,
            detail: detail.into(),
            raised_at: Utc::now(),
        }
    }
}

/// Destination for operational alerts. Must never block or fail.
pub trait AlertSink: Send + Sync {
    fn raise(&self, alert: OperationalAlert);
}

fn log_alert(alert: &OperationalAlert) {
    error!(
        target: OPS_TARGET,
        alert = alert.kind.as_str(),
        identity_id = alert.identity_id.as_ref().map(|id| id.as_str()).unwrap_or("-"),
        detail = %alert.detail,
        "operational alert"
    );
}

/// Default sink: structured `error` log on the ops target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAlertSink;

impl AlertSink for LoggingAlertSink {
    fn raise(&self, alert: OperationalAlert) {
        log_alert(&alert);
    }
}

/// Logs like [`LoggingAlertSink`] and keeps every alert for inspection.
#[derive(Debug, Default)]
pub struct InMemoryAlertSink {
    alerts: Mutex<Vec<OperationalAlert>>,
}

impl InMemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<OperationalAlert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn count(&self, kind: AlertKind) -> usize {
        self.alerts
            .lock()
            .map(|a| a.iter().filter(|x| x.kind == kind).count())
            .unwrap_or(0)
    }
}

impl AlertSink for InMemoryAlertSink {
    fn raise(&self, alert: OperationalAlert) {
        log_alert(&alert);
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_keeps_alerts() {
        let sink = InMemoryAlertSink::new();
        sink.raise(OperationalAlert::new(AlertKind::RollbackFailed, None, "boom"));
        sink.raise(OperationalAlert::new(
            AlertKind::AuditWriteFailed,
            Some(IdentityId::new("user-1").unwrap()),
            "store down",
        ));
        assert_eq!(sink.alerts().len(), 2);
        assert_eq!(sink.count(AlertKind::AuditWriteFailed), 1);
        assert_eq!(sink.count(AlertKind::DeletionAbandoned), 0);
    }
}
