//! Profile record: the authoritative, application-owned view of an identity.
//!
//! One profile exists per identity. Only the profile store adapter writes it;
//! everything else goes through the adapter's API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use rolegate_core::{DomainError, IdentityId};

use crate::Role;

/// Maximum display name length (characters).
pub const MAX_DISPLAY_NAME_LEN: usize = 100;

/// Maximum serialized size of the preferences blob (bytes).
pub const MAX_PREFERENCES_BYTES: usize = 16 * 1024;

/// Profile record.
///
/// # Invariants
/// - `identity_id` never changes after creation.
/// - `role` converges with the identity's role claim within the propagation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub identity_id: IdentityId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub is_active: bool,
    pub preferences: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: IdentityId,
    pub updated_by: IdentityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_logout_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Build the initial profile for a freshly created identity.
    ///
    /// New profiles are always `standard` and active.
    pub fn provision(
        identity_id: IdentityId,
        email: &str,
        display_name: Option<&str>,
        created_by: IdentityId,
        now: DateTime<Utc>,
    ) -> Self {
        let email = email.trim().to_lowercase();
        let display_name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| truncate_chars(n, MAX_DISPLAY_NAME_LEN))
            .unwrap_or_else(|| default_display_name(&email));

        Self {
            identity_id,
            email,
            display_name,
            role: Role::Standard,
            is_active: true,
            preferences: default_preferences(),
            created_at: now,
            updated_at: now,
            updated_by: created_by.clone(),
            created_by,
            last_logout_at: None,
        }
    }

    /// Caller-facing view without the internal audit fields.
    pub fn to_public(&self) -> PublicProfile {
        PublicProfile {
            identity_id: self.identity_id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            role: self.role,
            is_active: self.is_active,
            preferences: self.preferences.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_logout_at: self.last_logout_at,
        }
    }

    /// Field map as seen by the policy evaluator.
    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Profile as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub identity_id: IdentityId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub is_active: bool,
    pub preferences: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_logout_at: Option<DateTime<Utc>>,
}

/// Partial update requested through the generic profile-update path.
///
/// Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.preferences.is_none()
            && self.role.is_none()
            && self.is_active.is_none()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.is_empty() {
            return Err(DomainError::validation("empty profile update"));
        }
        if let Some(name) = &self.display_name {
            let name = name.trim();
            if name.is_empty() {
                return Err(DomainError::validation("display name cannot be empty"));
            }
            if name.chars().count() > MAX_DISPLAY_NAME_LEN {
                return Err(DomainError::validation(format!(
                    "display name longer than {MAX_DISPLAY_NAME_LEN} characters"
                )));
            }
        }
        if let Some(prefs) = &self.preferences {
            if !prefs.is_object() {
                return Err(DomainError::validation("preferences must be an object"));
            }
            let size = serde_json::to_vec(prefs).map(|b| b.len()).unwrap_or(usize::MAX);
            if size > MAX_PREFERENCES_BYTES {
                return Err(DomainError::validation("preferences too large"));
            }
        }
        Ok(())
    }

    /// Request field map as seen by the policy evaluator.
    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Apply to a profile, stamping `updated_at`/`updated_by`.
    pub fn apply_to(&self, profile: &mut Profile, actor: &IdentityId, now: DateTime<Utc>) {
        if let Some(name) = &self.display_name {
            profile.display_name = name.trim().to_string();
        }
        if let Some(prefs) = &self.preferences {
            profile.preferences = prefs.clone();
        }
        if let Some(role) = self.role {
            profile.role = role;
        }
        if let Some(active) = self.is_active {
            profile.is_active = active;
        }
        profile.updated_at = now;
        profile.updated_by = actor.clone();
    }
}

pub fn default_preferences() -> Value {
    serde_json::json!({
        "theme": "system",
        "emailNotifications": true,
    })
}

fn default_display_name(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    if local.is_empty() {
        "user".to_string()
    } else {
        truncate_chars(local, MAX_DISPLAY_NAME_LEN)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
