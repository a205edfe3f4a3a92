use core::str::FromStr;

use serde::{Deserialize, Serialize};

use rolegate_core::DomainError;

/// Authorization role carried in session claims and on the profile.
///
/// Exactly two roles exist; there is no hierarchy beyond "elevated may do
/// everything standard may".
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Elevated,
    #[default]
    Standard,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Elevated, Role::Standard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Elevated => "elevated",
            Role::Standard => "standard",
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Elevated)
    }

    /// Role to act with when a session carries no role claim yet.
    ///
    /// A missing claim never confers privilege.
    pub fn from_claim(claim: Option<Role>) -> Role {
        claim.unwrap_or(Role::Standard)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "elevated" => Ok(Role::Elevated),
            "standard" => Ok(Role::Standard),
            other => Err(DomainError::validation(format!(
                "invalid role '{other}' (expected 'elevated' or 'standard')"
            ))),
        }
    }
}
