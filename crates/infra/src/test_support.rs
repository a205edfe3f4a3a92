//! Fault-injecting wrappers around the in-memory adapters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use rolegate_auth::{
    AuditEntry, AuditRecord, AuthClaims, Principal, Profile, ProfilePatch, Role, SessionClaims,
};
use rolegate_core::IdentityId;
use rolegate_events::{AuthProvider, InMemoryEventBus};

use crate::alerts::InMemoryAlertSink;
use crate::audit_recorder::AuditRecorder;
use crate::audit_store::{AuditQuery, AuditStore, InMemoryAuditStore};
use crate::claims_issuer::ClaimsIssuer;
use crate::identity::{
    IdentityProvider, IdentityProviderError, InMemoryIdentityProvider, IssuedToken, TokenSigner,
};
use crate::profile_store::{CreateOutcome, InMemoryProfileStore, ProfileStore, StoreError};
use crate::retry::RetryPolicy;
use crate::revocation::SessionRevocationManager;

/// Per-operation failure schedule plus call counters.
#[derive(Debug, Default)]
pub struct Faults {
    remaining: Mutex<HashMap<&'static str, u32>>,
    calls: Mutex<HashMap<&'static str, u32>>,
    slow: Mutex<HashMap<&'static str, (u32, Duration)>>,
}

impl Faults {
    /// Fail the next `times` calls of `op`.
    pub fn fail(&self, op: &'static str, times: u32) {
        self.remaining.lock().unwrap().insert(op, times);
    }

    pub fn fail_always(&self, op: &'static str) {
        self.fail(op, u32::MAX);
    }

    /// Let the next `times` calls of `op` take effect, then hold the reply
    /// back for `delay`.
    pub fn slow_ack(&self, op: &'static str, times: u32, delay: Duration) {
        self.slow.lock().unwrap().insert(op, (times, delay));
    }

    pub fn heal(&self, op: &'static str) {
        self.remaining.lock().unwrap().remove(op);
    }

    pub fn calls(&self, op: &'static str) -> u32 {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// Sleep if a slow reply is scheduled for `op`.
    async fn ack(&self, op: &'static str) {
        let delay = {
            let mut slow = self.slow.lock().unwrap();
            match slow.get_mut(op) {
                Some((n, delay)) if *n > 0 => {
                    *n -= 1;
                    Some(*delay)
                }
                _ => None,
            }
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Count the call; `true` if it should fail.
    fn trip(&self, op: &'static str) -> bool {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
        let mut remaining = self.remaining.lock().unwrap();
        match remaining.get_mut(op) {
            Some(0) | None => false,
            Some(n) => {
                if *n != u32::MAX {
                    *n -= 1;
                }
                true
            }
        }
    }
}

pub struct FlakyProfileStore {
    pub inner: InMemoryProfileStore,
    pub faults: Faults,
}

impl FlakyProfileStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryProfileStore::new(),
            faults: Faults::default(),
        }
    }

    fn check(&self, op: &'static str) -> Result<(), StoreError> {
        if self.faults.trip(op) {
            Err(StoreError::Unavailable(format!("injected {op} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl ProfileStore for FlakyProfileStore {
    async fn create_if_absent(&self, profile: &Profile) -> Result<CreateOutcome, StoreError> {
        self.check("create_if_absent")?;
        let outcome = self.inner.create_if_absent(profile).await;
        self.faults.ack("create_if_absent").await;
        outcome
    }

    async fn get(&self, identity_id: &IdentityId) -> Result<Option<Profile>, StoreError> {
        self.check("get")?;
        self.inner.get(identity_id).await
    }

    async fn set_role(
        &self,
        identity_id: &IdentityId,
        role: Role,
        actor: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<Profile, StoreError> {
        self.check("set_role")?;
        self.inner.set_role(identity_id, role, actor, at).await
    }

    async fn compare_and_set_role(
        &self,
        identity_id: &IdentityId,
        expected: Role,
        role: Role,
        actor: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.check("compare_and_set_role")?;
        self.inner
            .compare_and_set_role(identity_id, expected, role, actor, at)
            .await
    }

    async fn apply_patch(
        &self,
        identity_id: &IdentityId,
        patch: &ProfilePatch,
        expected_updated_at: Option<DateTime<Utc>>,
        actor: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<Profile, StoreError> {
        self.check("apply_patch")?;
        self.inner
            .apply_patch(identity_id, patch, expected_updated_at, actor, at)
            .await
    }

    async fn set_active(
        &self,
        identity_id: &IdentityId,
        active: bool,
        actor: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<Profile, StoreError> {
        self.check("set_active")?;
        self.inner.set_active(identity_id, active, actor, at).await
    }

    async fn record_logout(
        &self,
        identity_id: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check("record_logout")?;
        self.inner.record_logout(identity_id, at).await
    }

    async fn delete(&self, identity_id: &IdentityId) -> Result<Option<Profile>, StoreError> {
        self.check("delete")?;
        self.inner.delete(identity_id).await
    }

    async fn count_with_role(&self, role: Role, active_only: bool) -> Result<u64, StoreError> {
        self.check("count_with_role")?;
        self.inner.count_with_role(role, active_only).await
    }
}

pub struct FlakyIdentityProvider {
    pub inner: Arc<InMemoryIdentityProvider>,
    pub faults: Faults,
}

impl FlakyIdentityProvider {
    pub fn new(inner: Arc<InMemoryIdentityProvider>) -> Self {
        Self {
            inner,
            faults: Faults::default(),
        }
    }

    fn check(&self, op: &'static str) -> Result<(), IdentityProviderError> {
        if self.faults.trip(op) {
            Err(IdentityProviderError::Unavailable(format!("injected {op} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for FlakyIdentityProvider {
    async fn verify_token(&self, token: &str) -> Result<SessionClaims, IdentityProviderError> {
        self.check("verify_token")?;
        self.inner.verify_token(token).await
    }

    async fn set_claims(
        &self,
        identity_id: &IdentityId,
        claims: AuthClaims,
    ) -> Result<(), IdentityProviderError> {
        self.check("set_claims")?;
        let result = self.inner.set_claims(identity_id, claims).await;
        self.faults.ack("set_claims").await;
        result
    }

    async fn set_claims_if_absent(
        &self,
        identity_id: &IdentityId,
        claims: AuthClaims,
    ) -> Result<bool, IdentityProviderError> {
        self.check("set_claims_if_absent")?;
        self.inner.set_claims_if_absent(identity_id, claims).await
    }

    async fn revoke_tokens_issued_before(
        &self,
        identity_id: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, IdentityProviderError> {
        self.check("revoke")?;
        self.inner.revoke_tokens_issued_before(identity_id, at).await
    }

    async fn refresh_token(&self, token: &str) -> Result<IssuedToken, IdentityProviderError> {
        self.check("refresh_token")?;
        self.inner.refresh_token(token).await
    }
}

/// Audit store that is always down.
#[derive(Default)]
pub struct FailingAuditStore {
    attempts: AtomicU32,
}

impl FailingAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AuditStore for FailingAuditStore {
    async fn append(&self, _entry: AuditEntry) -> Result<AuditRecord, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("audit store down".to_string()))
    }

    async fn list(&self, _query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError> {
        Err(StoreError::Unavailable("audit store down".to_string()))
    }
}

/// Audit store that answers after `delay`.
pub struct SlowAuditStore {
    inner: InMemoryAuditStore,
    delay: Duration,
}

impl SlowAuditStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryAuditStore::new(),
            delay,
        }
    }
}

#[async_trait::async_trait]
impl AuditStore for SlowAuditStore {
    async fn append(&self, entry: AuditEntry) -> Result<AuditRecord, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.append(entry).await
    }

    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError> {
        self.inner.list(query).await
    }
}

/// Audit store whose appends wait until [`release`](Self::release) is called.
pub struct GatedAuditStore {
    pub inner: InMemoryAuditStore,
    open: tokio::sync::watch::Sender<bool>,
    pub waiting: tokio::sync::Notify,
}

impl GatedAuditStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryAuditStore::new(),
            open: tokio::sync::watch::channel(false).0,
            waiting: tokio::sync::Notify::new(),
        }
    }

    pub fn release(&self) {
        self.open.send_replace(true);
    }
}

#[async_trait::async_trait]
impl AuditStore for GatedAuditStore {
    async fn append(&self, entry: AuditEntry) -> Result<AuditRecord, StoreError> {
        self.waiting.notify_one();
        let mut open = self.open.subscribe();
        let _ = open.wait_for(|open| *open).await;
        self.inner.append(entry).await
    }

    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError> {
        self.inner.list(query).await
    }
}

/// Every component wired over in-memory adapters, with fault injection on the
/// profile store and identity provider.
pub struct Fixture {
    pub profiles: Arc<FlakyProfileStore>,
    pub idp: Arc<FlakyIdentityProvider>,
    pub audit: Arc<InMemoryAuditStore>,
    pub alerts: Arc<InMemoryAlertSink>,
    pub recorder: AuditRecorder,
    pub revocation: SessionRevocationManager,
    pub claims: ClaimsIssuer,
    pub retry: RetryPolicy,
}

impl Fixture {
    pub fn new() -> Self {
        let retry = RetryPolicy::fixed(3, Duration::from_millis(1), Duration::from_millis(200));
        let inner = Arc::new(InMemoryIdentityProvider::new(
            TokenSigner::new(b"fixture-secret", "rolegate"),
            chrono::Duration::minutes(5),
            Arc::new(InMemoryEventBus::new()),
        ));
        let profiles = Arc::new(FlakyProfileStore::new());
        let idp = Arc::new(FlakyIdentityProvider::new(inner));
        let audit = Arc::new(InMemoryAuditStore::new());
        let alerts = Arc::new(InMemoryAlertSink::new());
        let recorder = AuditRecorder::new(audit.clone(), alerts.clone(), Duration::from_millis(200));
        let revocation =
            SessionRevocationManager::new(idp.clone(), alerts.clone(), retry.clone(), retry.clone());
        let claims = ClaimsIssuer::new(
            profiles.clone(),
            idp.clone(),
            revocation.clone(),
            recorder.clone(),
            alerts.clone(),
            retry.clone(),
        );
        Self {
            profiles,
            idp,
            audit,
            alerts,
            recorder,
            revocation,
            claims,
            retry,
        }
    }

    /// Identity with a profile and a matching claim, signed in once.
    pub async fn identity(&self, name: &str, role: Role) -> (Principal, IssuedToken) {
        let identity_id = id(name);
        let email = format!("{name}@example.com");
        self.idp
            .inner
            .create_identity_with_id(identity_id.clone(), &email, None, AuthProvider::Password)
            .unwrap();
        self.idp.inner.set_claims(&identity_id, AuthClaims::new(role)).await.unwrap();
        let mut profile = Profile::provision(identity_id.clone(), &email, None, IdentityId::system(), Utc::now());
        profile.role = role;
        self.profiles.inner.create_if_absent(&profile).await.unwrap();

        let token = self.idp.inner.sign_in(&identity_id).unwrap();
        let claims = self.idp.inner.verify_token(&token.token).await.unwrap();
        (Principal::from_claims(&claims), token)
    }

    pub async fn profile(&self, name: &str) -> Option<Profile> {
        self.profiles.inner.get(&id(name)).await.unwrap()
    }
}

pub fn id(s: &str) -> IdentityId {
    IdentityId::new(s).unwrap()
}
