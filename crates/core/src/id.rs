//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Maximum accepted length of an identity identifier.
pub const MAX_IDENTITY_ID_LEN: usize = 128;

/// Actor id used for system-initiated writes.
pub const SYSTEM_ACTOR: &str = "system";

/// Opaque, stable identifier of an identity issued by the identity provider.
///
/// The provider owns the format; we only require it to be non-empty, bounded
/// and free of whitespace/control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(DomainError::invalid_id("IdentityId: empty"));
        }
        if raw.len() > MAX_IDENTITY_ID_LEN {
            return Err(DomainError::invalid_id(format!(
                "IdentityId: longer than {MAX_IDENTITY_ID_LEN} bytes"
            )));
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(DomainError::invalid_id(
                "IdentityId: contains whitespace or control characters",
            ));
        }
        Ok(Self(raw))
    }

    /// Actor recorded for writes not performed by an authenticated identity
    /// (lifecycle triggers, bootstrap).
    pub fn system() -> Self {
        Self(SYSTEM_ACTOR.to_string())
    }

    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_ACTOR
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for IdentityId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for IdentityId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<IdentityId> for String {
    fn from(value: IdentityId) -> Self {
        value.0
    }
}

/// Identifier of an appended audit record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditRecordId(Uuid);

/// Identifier of an issued session token (`jti`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(AuditRecordId, "AuditRecordId");
impl_uuid_newtype!(TokenId, "TokenId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_id_accepts_provider_ids() {
        let id: IdentityId = "user-1".parse().unwrap();
        assert_eq!(id.as_str(), "user-1");
        assert!(IdentityId::new("Xk29fQ0aZbT7").is_ok());
    }

    #[test]
    fn identity_id_rejects_malformed() {
        assert!(IdentityId::new("").is_err());
        assert!(IdentityId::new("has space").is_err());
        assert!(IdentityId::new("a".repeat(MAX_IDENTITY_ID_LEN + 1)).is_err());
    }

    #[test]
    fn identity_id_deserialization_validates() {
        let ok: IdentityId = serde_json::from_str("\"admin-1\"").unwrap();
        assert_eq!(ok.to_string(), "admin-1");
        assert!(serde_json::from_str::<IdentityId>("\"\"").is_err());
    }

    #[test]
    fn uuid_ids_round_trip_through_display() {
        let id = AuditRecordId::new();
        let parsed: AuditRecordId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("nope".parse::<TokenId>().is_err());
    }
}
