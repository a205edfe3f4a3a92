//! Identity provider port.
//!
//! The identity provider owns identities and session tokens. This subsystem
//! only verifies tokens, sets the authorization claim, and moves the
//! revocation watermark; everything else about identities is the provider's.

mod in_memory;
mod token;

pub use in_memory::InMemoryIdentityProvider;
pub use token::{IssuedToken, TokenSigner};

use chrono::{DateTime, Utc};
use thiserror::Error;

use rolegate_auth::{AuthClaims, SessionClaims};
use rolegate_core::IdentityId;
use rolegate_events::{EventEnvelope, IdentityEvent};

use crate::retry::Retryable;

/// What the lifecycle worker consumes.
pub type IdentityEventEnvelope = EventEnvelope<IdentityEvent>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityProviderError {
    #[error("token expired")]
    TokenExpired,

    #[error("token invalid: {0}")]
    TokenInvalid(String),

    #[error("identity not found")]
    NotFound,

    #[error("identity already exists")]
    AlreadyExists,

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("identity provider call timed out: {0}")]
    Timeout(String),
}

impl Retryable for IdentityProviderError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            IdentityProviderError::Unavailable(_) | IdentityProviderError::Timeout(_)
        )
    }

    fn timed_out(operation: &'static str) -> Self {
        IdentityProviderError::Timeout(operation.to_string())
    }
}

#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify signature, time window and revocation. Returns the decoded claims.
    async fn verify_token(&self, token: &str) -> Result<SessionClaims, IdentityProviderError>;

    /// Replace the custom claims carried by tokens issued from now on.
    async fn set_claims(
        &self,
        identity_id: &IdentityId,
        claims: AuthClaims,
    ) -> Result<(), IdentityProviderError>;

    /// Set claims only when the identity carries none yet. Returns whether
    /// the claims were written.
    async fn set_claims_if_absent(
        &self,
        identity_id: &IdentityId,
        claims: AuthClaims,
    ) -> Result<bool, IdentityProviderError>;

    /// Reject every token for `identity_id` issued at or before `at`.
    ///
    /// The watermark only moves forward; returns the effective watermark.
    async fn revoke_tokens_issued_before(
        &self,
        identity_id: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, IdentityProviderError>;

    /// Exchange a still-valid token for a fresh one carrying the identity's
    /// current claims.
    async fn refresh_token(&self, token: &str) -> Result<IssuedToken, IdentityProviderError>;
}
