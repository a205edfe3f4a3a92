use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use rolegate_auth::{
    AuthClaims, SessionClaims, TokenValidationError, check_not_revoked, validate_claims,
};
use rolegate_core::{IdentityId, TokenId};
use rolegate_events::{
    AuthProvider, EventBus, EventEnvelope, IdentityCreated, IdentityDeleted, IdentityEvent,
    InMemoryEventBus,
};

use super::{IdentityEventEnvelope, IdentityProvider, IdentityProviderError, IssuedToken, TokenSigner};

#[derive(Debug, Clone)]
struct IdentityRecord {
    claims: Option<AuthClaims>,
    revoked_before: Option<DateTime<Utc>>,
}

/// Self-contained identity provider for dev and tests.
///
/// - Issues HS256 tokens carrying the identity's current claims
/// - Keeps a per-identity revocation watermark
/// - Publishes `identity.created` / `identity.deleted` on its event bus
#[derive(Debug)]
pub struct InMemoryIdentityProvider {
    signer: TokenSigner,
    ttl: Duration,
    identities: RwLock<HashMap<IdentityId, IdentityRecord>>,
    events: Arc<InMemoryEventBus<IdentityEventEnvelope>>,
}

impl InMemoryIdentityProvider {
    pub fn new(
        signer: TokenSigner,
        ttl: Duration,
        events: Arc<InMemoryEventBus<IdentityEventEnvelope>>,
    ) -> Self {
        Self {
            signer,
            ttl,
            identities: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn events(&self) -> &Arc<InMemoryEventBus<IdentityEventEnvelope>> {
        &self.events
    }

    /// Register a new identity with a generated id and announce it.
    pub fn create_identity(
        &self,
        email: &str,
        display_name: Option<&str>,
        provider: AuthProvider,
    ) -> Result<IdentityId, IdentityProviderError> {
        let raw = Uuid::now_v7().simple().to_string();
        let id = IdentityId::new(raw)
            .map_err(|e| IdentityProviderError::Unavailable(format!("id generation failed: {e}")))?;
        self.create_identity_with_id(id.clone(), email, display_name, provider)?;
        Ok(id)
    }

    pub fn create_identity_with_id(
        &self,
        identity_id: IdentityId,
        email: &str,
        display_name: Option<&str>,
        provider: AuthProvider,
    ) -> Result<(), IdentityProviderError> {
        {
            let mut identities = self.write()?;
            if identities.contains_key(&identity_id) {
                return Err(IdentityProviderError::AlreadyExists);
            }
            identities.insert(
                identity_id.clone(),
                IdentityRecord {
                    claims: None,
                    revoked_before: None,
                },
            );
        }

        self.publish(IdentityEvent::Created(IdentityCreated {
            identity_id,
            email: email.to_string(),
            display_name: display_name.map(str::to_string),
            provider,
            occurred_at: Utc::now(),
        }));
        Ok(())
    }

    pub fn delete_identity(&self, identity_id: &IdentityId) -> Result<(), IdentityProviderError> {
        self.write()?
            .remove(identity_id)
            .ok_or(IdentityProviderError::NotFound)?;
        self.publish(IdentityEvent::Deleted(IdentityDeleted {
            identity_id: identity_id.clone(),
            occurred_at: Utc::now(),
        }));
        Ok(())
    }

    /// Issue a session token for an existing identity.
    pub fn sign_in(&self, identity_id: &IdentityId) -> Result<IssuedToken, IdentityProviderError> {
        let record = self
            .read()?
            .get(identity_id)
            .cloned()
            .ok_or(IdentityProviderError::NotFound)?;
        self.issue(identity_id.clone(), &record)
    }

    pub fn current_claims(&self, identity_id: &IdentityId) -> Option<AuthClaims> {
        self.read().ok()?.get(identity_id)?.claims
    }

    pub fn revocation_watermark(&self, identity_id: &IdentityId) -> Option<DateTime<Utc>> {
        self.read().ok()?.get(identity_id)?.revoked_before
    }

    fn issue(
        &self,
        identity_id: IdentityId,
        record: &IdentityRecord,
    ) -> Result<IssuedToken, IdentityProviderError> {
        // A token must come out strictly after the watermark, or a sign-in
        // right after logout would be born revoked.
        let now = Utc::now();
        let issued_at = match record.revoked_before {
            Some(w) if now <= w => w + Duration::microseconds(1),
            _ => now,
        };
        self.signer.sign(SessionClaims {
            sub: identity_id,
            role: record.claims.map(|c| c.role),
            jti: TokenId::new(),
            iss: self.signer.issuer().to_string(),
            issued_at,
            expires_at: issued_at + self.ttl,
        })
    }

    fn publish(&self, event: IdentityEvent) {
        let identity_id = event.identity_id().clone();
        if let Err(e) = self.events.publish(EventEnvelope::new(event)) {
            warn!(identity_id = %identity_id, error = ?e, "failed to publish identity event");
        }
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<IdentityId, IdentityRecord>>, IdentityProviderError>
    {
        self.identities
            .read()
            .map_err(|_| IdentityProviderError::Unavailable("lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<IdentityId, IdentityRecord>>, IdentityProviderError>
    {
        self.identities
            .write()
            .map_err(|_| IdentityProviderError::Unavailable("lock poisoned".to_string()))
    }
}

fn map_validation(e: TokenValidationError) -> IdentityProviderError {
    match e {
        TokenValidationError::Expired => IdentityProviderError::TokenExpired,
        other => IdentityProviderError::TokenInvalid(other.to_string()),
    }
}

#[async_trait::async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn verify_token(&self, token: &str) -> Result<SessionClaims, IdentityProviderError> {
        let claims = self.signer.decode(token)?;
        validate_claims(&claims, Utc::now()).map_err(map_validation)?;

        let watermark = self
            .read()?
            .get(&claims.sub)
            .map(|r| r.revoked_before)
            .ok_or_else(|| IdentityProviderError::TokenInvalid("unknown identity".to_string()))?;
        check_not_revoked(&claims, watermark).map_err(map_validation)?;
        Ok(claims)
    }

    async fn set_claims(
        &self,
        identity_id: &IdentityId,
        claims: AuthClaims,
    ) -> Result<(), IdentityProviderError> {
        let mut identities = self.write()?;
        let record = identities
            .get_mut(identity_id)
            .ok_or(IdentityProviderError::NotFound)?;
        record.claims = Some(claims);
        debug!(identity_id = %identity_id, role = %claims.role, "claims set");
        Ok(())
    }

    async fn set_claims_if_absent(
        &self,
        identity_id: &IdentityId,
        claims: AuthClaims,
    ) -> Result<bool, IdentityProviderError> {
        let mut identities = self.write()?;
        let record = identities
            .get_mut(identity_id)
            .ok_or(IdentityProviderError::NotFound)?;
        if record.claims.is_some() {
            debug!(identity_id = %identity_id, "claims already present, seeding skipped");
            return Ok(false);
        }
        record.claims = Some(claims);
        debug!(identity_id = %identity_id, role = %claims.role, "claims seeded");
        Ok(true)
    }

    async fn revoke_tokens_issued_before(
        &self,
        identity_id: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, IdentityProviderError> {
        let mut identities = self.write()?;
        let record = identities
            .get_mut(identity_id)
            .ok_or(IdentityProviderError::NotFound)?;
        let effective = record.revoked_before.map_or(at, |w| w.max(at));
        record.revoked_before = Some(effective);
        Ok(effective)
    }

    async fn refresh_token(&self, token: &str) -> Result<IssuedToken, IdentityProviderError> {
        let claims = self.verify_token(token).await?;
        let record = self
            .read()?
            .get(&claims.sub)
            .cloned()
            .ok_or_else(|| IdentityProviderError::TokenInvalid("unknown identity".to_string()))?;
        self.issue(claims.sub, &record)
    }
}
