use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rolegate_core::{IdentityId, TokenId};

use crate::Role;

/// Authorization claim attached to an identity's session tokens.
///
/// This is the only custom claim this subsystem sets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthClaims {
    pub role: Role,
}

impl AuthClaims {
    pub fn new(role: Role) -> Self {
        Self { role }
    }
}

/// Session token claims model (transport-agnostic).
///
/// The minimal set of claims expected once a token has been decoded and its
/// signature verified by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject / identity identifier.
    pub sub: IdentityId,

    /// Authorization role at issue time. Absent until the lifecycle seeds it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Token identifier.
    pub jti: TokenId,

    /// Issuer tag.
    pub iss: String,

    /// Issued-at timestamp.
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    pub fn auth_claims(&self) -> Option<AuthClaims> {
        self.role.map(AuthClaims::new)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("token was revoked")]
    Revoked,
}

/// Deterministically validate session claims.
///
/// Note: this validates the *claims* only. Signature verification / decoding is
/// intentionally outside this crate.
pub fn validate_claims(
    claims: &SessionClaims,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

/// Check a token's issue time against the identity's revocation watermark.
///
/// Tokens issued at or before the watermark are rejected.
pub fn check_not_revoked(
    claims: &SessionClaims,
    revoked_before: Option<DateTime<Utc>>,
) -> Result<(), TokenValidationError> {
    match revoked_before {
        Some(watermark) if claims.issued_at <= watermark => Err(TokenValidationError::Revoked),
        _ => Ok(()),
    }
}
