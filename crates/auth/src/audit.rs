//! Audit record model (append-only).

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rolegate_core::{AuditRecordId, DomainError, IdentityId};

use crate::Role;

/// Kind of privilege-affecting change being recorded.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    RoleGrant,
    RoleRevoke,
    Logout,
    ProfileCreate,
    ProfileDelete,
    Deactivate,
    Reactivate,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::RoleGrant => "role_grant",
            ChangeType::RoleRevoke => "role_revoke",
            ChangeType::Logout => "logout",
            ChangeType::ProfileCreate => "profile_create",
            ChangeType::ProfileDelete => "profile_delete",
            ChangeType::Deactivate => "deactivate",
            ChangeType::Reactivate => "reactivate",
        }
    }

    /// Change type for a role write: granting `elevated` or revoking it.
    pub fn for_role(new_role: Role) -> Self {
        match new_role {
            Role::Elevated => ChangeType::RoleGrant,
            Role::Standard => ChangeType::RoleRevoke,
        }
    }
}

impl FromStr for ChangeType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "role_grant" => Ok(ChangeType::RoleGrant),
            "role_revoke" => Ok(ChangeType::RoleRevoke),
            "logout" => Ok(ChangeType::Logout),
            "profile_create" => Ok(ChangeType::ProfileCreate),
            "profile_delete" => Ok(ChangeType::ProfileDelete),
            "deactivate" => Ok(ChangeType::Deactivate),
            "reactivate" => Ok(ChangeType::Reactivate),
            other => Err(DomainError::validation(format!("unknown change type '{other}'"))),
        }
    }
}

impl core::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An audit entry ready to be appended (not yet assigned id / timestamp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub actor_id: IdentityId,
    pub target_id: IdentityId,
    pub change_type: ChangeType,
    pub old_value: Value,
    pub new_value: Value,
    pub metadata: Value,
}

impl AuditEntry {
    pub fn new(actor_id: IdentityId, target_id: IdentityId, change_type: ChangeType) -> Self {
        Self {
            actor_id,
            target_id,
            change_type,
            old_value: Value::Null,
            new_value: Value::Null,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn role_change(actor_id: IdentityId, target_id: IdentityId, old: Role, new: Role) -> Self {
        Self::new(actor_id, target_id, ChangeType::for_role(new))
            .with_values(Value::from(old.as_str()), Value::from(new.as_str()))
    }

    pub fn with_values(mut self, old_value: Value, new_value: Value) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A stored, immutable audit record.
///
/// `sequence` and `timestamp` are assigned by the store at append time and are
/// monotonically increasing across the whole audit collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: AuditRecordId,
    pub sequence: u64,
    pub actor_id: IdentityId,
    pub target_id: IdentityId,
    pub change_type: ChangeType,
    pub old_value: Value,
    pub new_value: Value,
    pub timestamp: DateTime<Utc>,
    pub metadata: Value,
}

impl AuditRecord {
    pub fn from_entry(entry: AuditEntry, sequence: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: AuditRecordId::new(),
            sequence,
            actor_id: entry.actor_id,
            target_id: entry.target_id,
            change_type: entry.change_type,
            old_value: entry.old_value,
            new_value: entry.new_value,
            timestamp,
            metadata: entry.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_change_picks_grant_or_revoke() {
        let a = IdentityId::new("admin-1").unwrap();
        let t = IdentityId::new("user-1").unwrap();

        let grant = AuditEntry::role_change(a.clone(), t.clone(), Role::Standard, Role::Elevated);
        assert_eq!(grant.change_type, ChangeType::RoleGrant);
        assert_eq!(grant.old_value, "standard");
        assert_eq!(grant.new_value, "elevated");

        let revoke = AuditEntry::role_change(a, t, Role::Elevated, Role::Standard);
        assert_eq!(revoke.change_type, ChangeType::RoleRevoke);
    }

    #[test]
    fn change_type_parses_its_own_names() {
        for ct in [
            ChangeType::RoleGrant,
            ChangeType::RoleRevoke,
            ChangeType::Logout,
            ChangeType::ProfileCreate,
            ChangeType::ProfileDelete,
            ChangeType::Deactivate,
            ChangeType::Reactivate,
        ] {
            assert_eq!(ct.as_str().parse::<ChangeType>().unwrap(), ct);
        }
        assert!("promote".parse::<ChangeType>().is_err());
    }

    #[test]
    fn change_type_wire_names() {
        assert_eq!(
            serde_json::to_value(ChangeType::ProfileCreate).unwrap(),
            serde_json::json!("profile_create")
        );
        assert_eq!(ChangeType::Logout.to_string(), "logout");
    }
}
