//! Access service: the API surface of the subsystem.
//!
//! Authenticates bearer tokens into [`Principal`]s and exposes `grantRole`,
//! `logout`, `getProfile` and the supporting operations. Data access goes
//! through the [`DataGateway`]; role changes through the [`ClaimsIssuer`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use rolegate_auth::policy::Explanation;
use rolegate_auth::{
    AuditEntry, AuditRecord, ChangeType, Operation, Principal, Profile, ProfilePatch,
    PublicProfile, Role, require_role,
};
use rolegate_core::IdentityId;

use crate::alerts::{AlertSink, LoggingAlertSink};
use crate::audit_recorder::AuditRecorder;
use crate::audit_store::{AuditQuery, AuditStore, InMemoryAuditStore, PostgresAuditStore};
use crate::claims_issuer::{ClaimsIssuer, RoleGrant};
use crate::db;
use crate::error::{AccessError, AccessResult};
use crate::gateway::{DataGateway, Document, DocumentStore, InMemoryDocumentStore};
use crate::identity::{IdentityProvider, IdentityProviderError, IssuedToken};
use crate::lifecycle::LifecycleOrchestrator;
use crate::profile_store::{InMemoryProfileStore, PostgresProfileStore, ProfileStore, StoreError};
use crate::retry::{RetryPolicy, call_with_retry};
use crate::revocation::SessionRevocationManager;

/// Result of `logout`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct LogoutResult {
    pub success: bool,
}

#[derive(Clone)]
pub struct AccessService {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    claims: ClaimsIssuer,
    revocation: SessionRevocationManager,
    gateway: DataGateway,
    audit: AuditRecorder,
    retry: RetryPolicy,
}

impl AccessService {
    /// Resolve a bearer token into the caller. Every token problem,
    /// including an identity that no longer exists, is `Unauthenticated`.
    pub async fn authenticate(&self, token: &str) -> AccessResult<Principal> {
        let identity = &self.identity;
        match call_with_retry(&self.retry, "verify_token", || identity.verify_token(token)).await {
            Ok(claims) => Ok(Principal::from_claims(&claims)),
            Err(IdentityProviderError::Unavailable(_) | IdentityProviderError::Timeout(_)) => {
                Err(AccessError::Unavailable)
            }
            Err(e) => {
                info!(error = %e, "token rejected");
                Err(AccessError::Unauthenticated)
            }
        }
    }

    pub async fn grant_role(
        &self,
        caller: &Principal,
        role: &str,
        target_id: &IdentityId,
    ) -> AccessResult<RoleGrant> {
        self.claims.grant_role(caller, role, target_id).await
    }

    /// Revoke every session of the caller. Succeeds for any authenticated
    /// caller: the `lastLogoutAt` stamp is best-effort and a failed inline
    /// revocation continues in the background.
    pub async fn logout(&self, caller: &Principal) -> AccessResult<LogoutResult> {
        let identity_id = &caller.identity_id;
        let now = Utc::now();
        if let Err(e) = self.gateway.record_logout(caller, now).await {
            warn!(identity_id = %identity_id, error = %e, "could not stamp lastLogoutAt");
        }

        if let Err(e) = self.revocation.revoke_all(identity_id).await {
            warn!(identity_id = %identity_id, error = %e, "logout revocation failed, retrying in background");
            self.revocation.revoke_all_in_background(identity_id.clone());
        }

        self.audit
            .record(
                AuditEntry::new(identity_id.clone(), identity_id.clone(), ChangeType::Logout)
                    .with_metadata(json!({ "tokenId": caller.token_id })),
            )
            .await;
        info!(identity_id = %identity_id, "logged out");
        Ok(LogoutResult { success: true })
    }

    /// The caller's own profile, without internal audit fields.
    pub async fn get_profile(&self, caller: &Principal) -> AccessResult<PublicProfile> {
        let profile = self.gateway.read_profile(caller, &caller.identity_id).await?;
        Ok(profile.to_public())
    }

    pub async fn profile_of(
        &self,
        caller: &Principal,
        identity_id: &IdentityId,
    ) -> AccessResult<PublicProfile> {
        let profile = self.gateway.read_profile(caller, identity_id).await?;
        Ok(profile.to_public())
    }

    pub async fn update_profile(
        &self,
        caller: &Principal,
        identity_id: &IdentityId,
        patch: &ProfilePatch,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> AccessResult<PublicProfile> {
        let profile = self
            .gateway
            .update_profile(caller, identity_id, patch, expected_updated_at)
            .await?;
        Ok(profile.to_public())
    }

    pub async fn deactivate(
        &self,
        caller: &Principal,
        identity_id: &IdentityId,
    ) -> AccessResult<PublicProfile> {
        self.set_active(caller, identity_id, false).await
    }

    pub async fn reactivate(
        &self,
        caller: &Principal,
        identity_id: &IdentityId,
    ) -> AccessResult<PublicProfile> {
        self.set_active(caller, identity_id, true).await
    }

    async fn set_active(
        &self,
        caller: &Principal,
        identity_id: &IdentityId,
        active: bool,
    ) -> AccessResult<PublicProfile> {
        require_role(caller, Role::Elevated)?;
        let profile = self.gateway.set_active(caller, identity_id, active).await?;
        Ok(profile.to_public())
    }

    /// Exchange a valid token for one carrying the identity's current role.
    pub async fn refresh(&self, token: &str) -> AccessResult<IssuedToken> {
        let identity = &self.identity;
        match call_with_retry(&self.retry, "refresh_token", || identity.refresh_token(token)).await {
            Ok(issued) => Ok(issued),
            Err(IdentityProviderError::Unavailable(_) | IdentityProviderError::Timeout(_)) => {
                Err(AccessError::Unavailable)
            }
            Err(_) => Err(AccessError::Unauthenticated),
        }
    }

    pub async fn list_audit(
        &self,
        caller: &Principal,
        query: &AuditQuery,
    ) -> AccessResult<Vec<AuditRecord>> {
        self.gateway.list_audit(caller, query).await
    }

    pub async fn create_document(
        &self,
        caller: Option<&Principal>,
        collection: &str,
        fields: Map<String, Value>,
    ) -> AccessResult<Document> {
        self.gateway.create_document(caller, collection, fields).await
    }

    pub async fn read_document(
        &self,
        caller: Option<&Principal>,
        collection: &str,
        id: Uuid,
    ) -> AccessResult<Document> {
        self.gateway.read_document(caller, collection, id).await
    }

    pub async fn update_document(
        &self,
        caller: Option<&Principal>,
        collection: &str,
        id: Uuid,
        fields: Map<String, Value>,
    ) -> AccessResult<Document> {
        self.gateway.update_document(caller, collection, id, fields).await
    }

    pub async fn delete_document(
        &self,
        caller: Option<&Principal>,
        collection: &str,
        id: Uuid,
    ) -> AccessResult<()> {
        self.gateway.delete_document(caller, collection, id).await
    }

    pub async fn list_documents(
        &self,
        caller: Option<&Principal>,
        collection: &str,
    ) -> AccessResult<Vec<Document>> {
        self.gateway.list_documents(caller, collection).await
    }

    pub async fn explain(
        &self,
        caller: &Principal,
        operation: Operation,
        collection: &str,
        resource_id: Option<&str>,
    ) -> AccessResult<Explanation> {
        self.gateway
            .explain(caller, operation, collection, resource_id)
            .await
    }

    /// Make `identity_id` elevated on behalf of the system, provisioning its
    /// profile if the lifecycle has not done so yet. Returns whether the role
    /// changed; repeated runs only re-assert the claim.
    pub async fn bootstrap_elevated(
        &self,
        identity_id: &IdentityId,
        email: &str,
    ) -> AccessResult<bool> {
        let system = IdentityId::system();
        let now = Utc::now();
        let profiles = &self.profiles;

        let seed = Profile::provision(identity_id.clone(), email, None, system.clone(), now);
        call_with_retry(&self.retry, "create_if_absent", || profiles.create_if_absent(&seed)).await?;

        let prior = call_with_retry(&self.retry, "set_role", || {
            profiles.set_role(identity_id, Role::Elevated, &system, now)
        })
        .await?;

        if prior.role == Role::Elevated {
            self.claims.assert_claims(identity_id, Role::Elevated).await?;
            info!(identity_id = %identity_id, "bootstrap identity already elevated");
            return Ok(false);
        }

        self.claims
            .propagate_role(identity_id, Role::Elevated, prior.role, &system)
            .await?;
        self.audit
            .record(
                AuditEntry::role_change(system, identity_id.clone(), prior.role, Role::Elevated)
                    .with_metadata(json!({ "source": "bootstrap" })),
            )
            .await;
        info!(identity_id = %identity_id, "bootstrap identity elevated");
        Ok(true)
    }
}

/// Storage and collaborators the service runs on.
pub struct Backends {
    pub profiles: Arc<dyn ProfileStore>,
    pub audit: Arc<dyn AuditStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub alerts: Arc<dyn AlertSink>,
}

impl Backends {
    pub fn in_memory(identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            profiles: Arc::new(InMemoryProfileStore::new()),
            audit: Arc::new(InMemoryAuditStore::new()),
            documents: Arc::new(InMemoryDocumentStore::new()),
            identity,
            alerts: Arc::new(LoggingAlertSink),
        }
    }

    /// Postgres profiles and audit; the schema is applied on connect.
    /// Content documents stay in memory.
    pub async fn postgres(
        database_url: &str,
        acquire_timeout: Duration,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self, StoreError> {
        let pool = db::connect(database_url, acquire_timeout).await?;
        db::migrate(&pool).await?;
        Ok(Self {
            profiles: Arc::new(PostgresProfileStore::new(pool.clone())),
            audit: Arc::new(PostgresAuditStore::new(pool)),
            documents: Arc::new(InMemoryDocumentStore::new()),
            identity,
            alerts: Arc::new(LoggingAlertSink),
        })
    }

    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }
}

/// Retry and timeout settings for the wired components.
#[derive(Debug, Clone)]
pub struct CallPolicies {
    /// Request-path calls.
    pub request: RetryPolicy,
    /// Deletions and background revocation.
    pub background: RetryPolicy,
    /// Bound on a single audit append.
    pub audit_timeout: Duration,
}

impl Default for CallPolicies {
    fn default() -> Self {
        let request = RetryPolicy::default();
        Self {
            audit_timeout: request.attempt_timeout,
            background: request.clone(),
            request,
        }
    }
}

/// The service plus the lifecycle orchestrator sharing its components.
pub struct Wiring {
    pub service: AccessService,
    pub lifecycle: Arc<LifecycleOrchestrator>,
}

impl Wiring {
    pub fn new(backends: Backends, policies: CallPolicies) -> Self {
        let Backends {
            profiles,
            audit,
            documents,
            identity,
            alerts,
        } = backends;

        let recorder = AuditRecorder::new(audit, alerts.clone(), policies.audit_timeout);
        let revocation = SessionRevocationManager::new(
            identity.clone(),
            alerts.clone(),
            policies.request.clone(),
            policies.background.clone(),
        );
        let claims = ClaimsIssuer::new(
            profiles.clone(),
            identity.clone(),
            revocation.clone(),
            recorder.clone(),
            alerts.clone(),
            policies.request.clone(),
        );
        let gateway = DataGateway::new(
            profiles.clone(),
            documents,
            recorder.clone(),
            claims.clone(),
            revocation.clone(),
            policies.request.clone(),
        );
        let lifecycle = Arc::new(LifecycleOrchestrator::new(
            profiles.clone(),
            claims.clone(),
            recorder.clone(),
            alerts,
            policies.request.clone(),
            policies.background,
        ));
        let service = AccessService {
            identity,
            profiles,
            claims,
            revocation,
            gateway,
            audit: recorder,
            retry: policies.request,
        };
        Self { service, lifecycle }
    }
}
