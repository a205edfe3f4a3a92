use chrono::{DateTime, Utc};
use serde::Serialize;

use rolegate_core::{IdentityId, TokenId};

use crate::{Role, SessionClaims};

/// A fully resolved principal for authorization decisions.
///
/// Built only from a verified session token; the role comes from the signed
/// claim, never from request input or a database lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub identity_id: IdentityId,
    pub role: Role,
    pub token_id: TokenId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Principal {
    pub fn from_claims(claims: &SessionClaims) -> Self {
        Self {
            identity_id: claims.sub.clone(),
            role: Role::from_claim(claims.role),
            token_id: claims.jti,
            issued_at: claims.issued_at,
            expires_at: claims.expires_at,
        }
    }

    pub fn is_elevated(&self) -> bool {
        self.role.is_elevated()
    }

    pub fn is(&self, identity_id: &IdentityId) -> bool {
        &self.identity_id == identity_id
    }
}
