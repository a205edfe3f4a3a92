//! Lifecycle Trigger Orchestrator.
//!
//! Turns identity-provider events into profile provisioning and retirement.
//! Delivery is at-least-once, so every handler is idempotent: provisioning is
//! a single conditional create, and deleting an already-deleted profile is a
//! no-op.

mod worker;

pub use worker::{LifecycleWorker, WorkerHandle, WorkerStats};

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use rolegate_auth::{AuditEntry, ChangeType, Profile, Role};
use rolegate_core::IdentityId;
use rolegate_events::{IdentityCreated, IdentityDeleted, IdentityEvent};

use crate::alerts::{AlertKind, AlertSink, OperationalAlert};
use crate::audit_recorder::AuditRecorder;
use crate::claims_issuer::ClaimsIssuer;
use crate::profile_store::{CreateOutcome, ProfileStore, StoreError};
use crate::retry::{RetryPolicy, call_with_retry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleOutcome {
    ProfileCreated,
    AlreadyProvisioned,
    ProfileDeleted,
    AlreadyDeleted,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("provisioning failed for {identity_id}: {source}")]
    ProvisioningFailed {
        identity_id: IdentityId,
        source: StoreError,
    },

    #[error("profile deletion abandoned for {identity_id} after {attempts} attempts: {source}")]
    DeletionAbandoned {
        identity_id: IdentityId,
        attempts: u32,
        source: StoreError,
    },
}

#[derive(Clone)]
pub struct LifecycleOrchestrator {
    profiles: Arc<dyn ProfileStore>,
    claims: ClaimsIssuer,
    audit: AuditRecorder,
    alerts: Arc<dyn AlertSink>,
    retry: RetryPolicy,
    background_retry: RetryPolicy,
}

impl LifecycleOrchestrator {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        claims: ClaimsIssuer,
        audit: AuditRecorder,
        alerts: Arc<dyn AlertSink>,
        retry: RetryPolicy,
        background_retry: RetryPolicy,
    ) -> Self {
        Self {
            profiles,
            claims,
            audit,
            alerts,
            retry,
            background_retry,
        }
    }

    /// Bounds deletion retries and redelivery of failed provisioning.
    pub fn background_retry(&self) -> &RetryPolicy {
        &self.background_retry
    }

    /// Give up on provisioning `identity_id` after `deliveries` attempts.
    pub fn abandon_provisioning(&self, identity_id: &IdentityId, deliveries: u32, error: &LifecycleError) {
        self.alerts.raise(OperationalAlert::new(
            AlertKind::ProvisioningAbandoned,
            Some(identity_id.clone()),
            format!("profile provisioning gave up after {deliveries} deliveries: {error}"),
        ));
    }

    pub async fn handle(&self, event: &IdentityEvent) -> Result<LifecycleOutcome, LifecycleError> {
        match event {
            IdentityEvent::Created(e) => self.on_identity_created(e).await,
            IdentityEvent::Deleted(e) => self.on_identity_deleted(e).await,
        }
    }

    /// Ensure exactly one profile exists for the new identity.
    pub async fn on_identity_created(
        &self,
        event: &IdentityCreated,
    ) -> Result<LifecycleOutcome, LifecycleError> {
        let id = &event.identity_id;
        // Microsecond precision survives a round trip through Postgres.
        let now = Utc::now().trunc_subsecs(6);
        let profile = Profile::provision(
            id.clone(),
            &event.email,
            event.display_name.as_deref(),
            IdentityId::system(),
            now,
        );

        let profiles = &self.profiles;
        let outcome = call_with_retry(&self.retry, "create_if_absent", || {
            profiles.create_if_absent(&profile)
        })
        .await
        .map_err(|source| LifecycleError::ProvisioningFailed {
            identity_id: id.clone(),
            source,
        })?;

        if outcome == CreateOutcome::AlreadyExists && !self.is_own_write(&profile).await? {
            debug!(identity_id = %id, "profile already provisioned, replay ignored");
            return Ok(LifecycleOutcome::AlreadyProvisioned);
        }

        info!(identity_id = %id, provider = %event.provider, "profile provisioned");
        self.audit
            .record(
                AuditEntry::new(IdentityId::system(), id.clone(), ChangeType::ProfileCreate)
                    .with_values(
                        serde_json::Value::Null,
                        json!({ "email": profile.email, "role": Role::Standard }),
                    )
                    .with_metadata(json!({ "provider": event.provider })),
            )
            .await;

        // Tokens without a claim already read as standard; seeding makes it
        // explicit. A claim set by a grant in the meantime is left alone.
        match self.claims.seed_claims(id, Role::Standard).await {
            Ok(true) => {}
            Ok(false) => debug!(identity_id = %id, "claim already set, seeding skipped"),
            Err(e) => warn!(identity_id = %id, error = %e, "initial claim seeding failed"),
        }

        Ok(LifecycleOutcome::ProfileCreated)
    }

    /// Whether the stored profile is the one `candidate` describes, i.e. an
    /// earlier attempt of this delivery landed before timing out.
    async fn is_own_write(&self, candidate: &Profile) -> Result<bool, LifecycleError> {
        let id = &candidate.identity_id;
        let profiles = &self.profiles;
        let stored = call_with_retry(&self.retry, "get_profile", || profiles.get(id))
            .await
            .map_err(|source| LifecycleError::ProvisioningFailed {
                identity_id: id.clone(),
                source,
            })?;
        Ok(stored.is_some_and(|stored| {
            stored.created_at == candidate.created_at && stored.created_by == candidate.created_by
        }))
    }

    /// Retire the identity's profile. Bounded retries, then an alert; never
    /// retried forever.
    pub async fn on_identity_deleted(
        &self,
        event: &IdentityDeleted,
    ) -> Result<LifecycleOutcome, LifecycleError> {
        let id = &event.identity_id;
        let profiles = &self.profiles;
        let deleted = match call_with_retry(&self.background_retry, "delete_profile", || {
            profiles.delete(id)
        })
        .await
        {
            Ok(deleted) => deleted,
            Err(source) => {
                let attempts = self.background_retry.max_attempts.max(1);
                self.alerts.raise(OperationalAlert::new(
                    AlertKind::DeletionAbandoned,
                    Some(id.clone()),
                    format!("profile deletion gave up after {attempts} attempts: {source}"),
                ));
                return Err(LifecycleError::DeletionAbandoned {
                    identity_id: id.clone(),
                    attempts,
                    source,
                });
            }
        };

        let Some(profile) = deleted else {
            debug!(identity_id = %id, "profile already deleted, replay ignored");
            return Ok(LifecycleOutcome::AlreadyDeleted);
        };

        info!(identity_id = %id, "profile deleted");
        self.audit
            .record(
                AuditEntry::new(IdentityId::system(), id.clone(), ChangeType::ProfileDelete)
                    .with_values(
                        json!({ "email": profile.email, "role": profile.role }),
                        serde_json::Value::Null,
                    ),
            )
            .await;
        Ok(LifecycleOutcome::ProfileDeleted)
    }
}
