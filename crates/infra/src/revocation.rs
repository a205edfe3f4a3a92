//! Session Revocation Manager.
//!
//! Revoking moves the identity's watermark to "now": every token issued at or
//! before it is rejected on the next verification. Repeated calls are safe;
//! the provider keeps the maximum.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use rolegate_core::IdentityId;

use crate::alerts::{AlertKind, AlertSink, OperationalAlert};
use crate::identity::{IdentityProvider, IdentityProviderError};
use crate::retry::{RetryPolicy, call_with_retry};

#[derive(Clone)]
pub struct SessionRevocationManager {
    identity: Arc<dyn IdentityProvider>,
    alerts: Arc<dyn AlertSink>,
    retry: RetryPolicy,
    background_retry: RetryPolicy,
}

impl SessionRevocationManager {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        alerts: Arc<dyn AlertSink>,
        retry: RetryPolicy,
        background_retry: RetryPolicy,
    ) -> Self {
        Self {
            identity,
            alerts,
            retry,
            background_retry,
        }
    }

    /// Invalidate every session of `identity_id` issued up to now, with
    /// bounded retries. Returns the effective watermark.
    pub async fn revoke_all(
        &self,
        identity_id: &IdentityId,
    ) -> Result<DateTime<Utc>, IdentityProviderError> {
        self.revoke_with(&self.retry, identity_id, Utc::now()).await
    }

    /// Single timeout-bounded attempt, for callers that fall back to
    /// [`revoke_all_in_background`](Self::revoke_all_in_background).
    pub async fn try_revoke_all(
        &self,
        identity_id: &IdentityId,
    ) -> Result<DateTime<Utc>, IdentityProviderError> {
        let once = RetryPolicy::no_retry(self.retry.attempt_timeout);
        self.revoke_with(&once, identity_id, Utc::now()).await
    }

    /// Keep trying off the request path. The watermark is fixed at call
    /// time, so a late success never revokes tokens issued after this call.
    pub fn revoke_all_in_background(&self, identity_id: IdentityId) -> JoinHandle<()> {
        let this = self.clone();
        let at = Utc::now();
        tokio::spawn(async move {
            match this.revoke_with(&this.background_retry, &identity_id, at).await {
                Ok(_) => info!(identity_id = %identity_id, "background revocation completed"),
                Err(IdentityProviderError::NotFound) => {
                    info!(identity_id = %identity_id, "identity gone, nothing to revoke")
                }
                Err(e) => this.alerts.raise(OperationalAlert::new(
                    AlertKind::RevocationAbandoned,
                    Some(identity_id),
                    format!("sessions not revoked after bounded retries: {e}"),
                )),
            }
        })
    }

    async fn revoke_with(
        &self,
        policy: &RetryPolicy,
        identity_id: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, IdentityProviderError> {
        let identity = &self.identity;
        let result = call_with_retry(policy, "revoke_tokens_issued_before", || {
            identity.revoke_tokens_issued_before(identity_id, at)
        })
        .await;
        match &result {
            Ok(watermark) => info!(identity_id = %identity_id, watermark = %watermark, "sessions revoked"),
            Err(e) => warn!(identity_id = %identity_id, error = %e, "session revocation failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rolegate_events::{AuthProvider, InMemoryEventBus};

    use crate::alerts::InMemoryAlertSink;
    use crate::identity::{InMemoryIdentityProvider, TokenSigner};
    use crate::test_support::FlakyIdentityProvider;

    fn fast() -> RetryPolicy {
        RetryPolicy::fixed(3, Duration::from_millis(1), Duration::from_millis(200))
    }

    fn setup() -> (Arc<FlakyIdentityProvider>, Arc<InMemoryAlertSink>, SessionRevocationManager, IdentityId) {
        let idp = Arc::new(InMemoryIdentityProvider::new(
            TokenSigner::new(b"secret", "rolegate"),
            chrono::Duration::minutes(5),
            Arc::new(InMemoryEventBus::new()),
        ));
        let user = IdentityId::new("u1").unwrap();
        idp.create_identity_with_id(user.clone(), "u1@example.com", None, AuthProvider::Password)
            .unwrap();
        let flaky = Arc::new(FlakyIdentityProvider::new(idp));
        let alerts = Arc::new(InMemoryAlertSink::new());
        let mgr = SessionRevocationManager::new(flaky.clone(), alerts.clone(), fast(), fast());
        (flaky, alerts, mgr, user)
    }

    #[tokio::test]
    async fn revoke_all_invalidates_existing_sessions() {
        let (idp, _, mgr, user) = setup();
        let token = idp.inner.sign_in(&user).unwrap();
        mgr.revoke_all(&user).await.unwrap();
        assert!(idp.verify_token(&token.token).await.is_err());
    }

    #[tokio::test]
    async fn revoke_all_twice_is_safe() {
        let (idp, _, mgr, user) = setup();
        let first = mgr.revoke_all(&user).await.unwrap();
        let second = mgr.revoke_all(&user).await.unwrap();
        assert!(second >= first);
        assert_eq!(idp.inner.revocation_watermark(&user), Some(second));
    }

    #[tokio::test]
    async fn transient_provider_failures_are_retried() {
        let (idp, _, mgr, user) = setup();
        idp.faults.fail("revoke", 2);
        mgr.revoke_all(&user).await.unwrap();
        assert_eq!(idp.faults.calls("revoke"), 3);
    }

    #[tokio::test]
    async fn try_revoke_all_makes_one_attempt() {
        let (idp, _, mgr, user) = setup();
        idp.faults.fail("revoke", 1);
        assert!(mgr.try_revoke_all(&user).await.is_err());
        assert_eq!(idp.faults.calls("revoke"), 1);
    }

    #[tokio::test]
    async fn exhausted_background_revocation_raises_alert() {
        let (idp, alerts, mgr, user) = setup();
        idp.faults.fail_always("revoke");
        mgr.revoke_all_in_background(user).await.unwrap();
        assert_eq!(alerts.count(AlertKind::RevocationAbandoned), 1);
    }

    #[tokio::test]
    async fn background_revocation_succeeds_after_recovery() {
        let (idp, alerts, mgr, user) = setup();
        let token = idp.inner.sign_in(&user).unwrap();
        idp.faults.fail("revoke", 2);
        mgr.revoke_all_in_background(user).await.unwrap();
        assert!(alerts.alerts().is_empty());
        assert!(idp.verify_token(&token.token).await.is_err());
    }
}
