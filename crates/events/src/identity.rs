use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rolegate_core::IdentityId;

use crate::Event;

/// How the identity authenticates with the provider.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    Password,
    Social,
}

impl core::fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AuthProvider::Password => f.write_str("password"),
            AuthProvider::Social => f.write_str("social"),
        }
    }
}

/// Emitted once per new identity (possibly delivered more than once).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCreated {
    pub identity_id: IdentityId,
    pub email: String,
    pub display_name: Option<String>,
    pub provider: AuthProvider,
    pub occurred_at: DateTime<Utc>,
}

/// Emitted when an identity is removed from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDeleted {
    pub identity_id: IdentityId,
    pub occurred_at: DateTime<Utc>,
}

/// All identity lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdentityEvent {
    Created(IdentityCreated),
    Deleted(IdentityDeleted),
}

impl IdentityEvent {
    pub fn identity_id(&self) -> &IdentityId {
        match self {
            IdentityEvent::Created(e) => &e.identity_id,
            IdentityEvent::Deleted(e) => &e.identity_id,
        }
    }
}

impl Event for IdentityEvent {
    fn event_type(&self) -> &'static str {
        match self {
            IdentityEvent::Created(_) => "identity.created",
            IdentityEvent::Deleted(_) => "identity.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            IdentityEvent::Created(e) => e.occurred_at,
            IdentityEvent::Deleted(e) => e.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_wire_format() {
        let ev = IdentityEvent::Deleted(IdentityDeleted {
            identity_id: IdentityId::new("user-1").unwrap(),
            occurred_at: Utc::now(),
        });
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "deleted");
        assert_eq!(v["identity_id"], "user-1");
        assert_eq!(ev.event_type(), "identity.deleted");
    }
}
