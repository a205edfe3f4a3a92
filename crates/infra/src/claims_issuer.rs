//! Claims Issuer: the `grantRole` protocol.
//!
//! Steps run strictly in order: validate, write the profile role, set the
//! signed claim, revoke outstanding sessions, audit. A failure to set the claim
//! after the profile write rolls the profile back, so a failed call never
//! leaves the profile and the claim disagreeing.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use rolegate_auth::{AuditEntry, AuthClaims, Principal, Profile, Role, require_role};
use rolegate_core::IdentityId;

use crate::alerts::{AlertKind, AlertSink, OperationalAlert};
use crate::audit_recorder::AuditRecorder;
use crate::error::{AccessError, AccessResult};
use crate::identity::{IdentityProvider, IdentityProviderError};
use crate::profile_store::{ProfileStore, StoreError};
use crate::retry::{RetryPolicy, call_with_retry};
use crate::revocation::SessionRevocationManager;

/// Result of a successful `grantRole`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct RoleGrant {
    pub success: bool,
    pub role: Role,
}

#[derive(Clone)]
pub struct ClaimsIssuer {
    profiles: Arc<dyn ProfileStore>,
    identity: Arc<dyn IdentityProvider>,
    revocation: SessionRevocationManager,
    audit: AuditRecorder,
    alerts: Arc<dyn AlertSink>,
    retry: RetryPolicy,
}

impl ClaimsIssuer {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        identity: Arc<dyn IdentityProvider>,
        revocation: SessionRevocationManager,
        audit: AuditRecorder,
        alerts: Arc<dyn AlertSink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            profiles,
            identity,
            revocation,
            audit,
            alerts,
            retry,
        }
    }

    /// Set `target_id`'s role. Only elevated callers may do this.
    pub async fn grant_role(
        &self,
        caller: &Principal,
        role: &str,
        target_id: &IdentityId,
    ) -> AccessResult<RoleGrant> {
        let actor = &caller.identity_id;
        if let Err(e) = require_role(caller, Role::Elevated) {
            warn!(actor_id = %actor, target_id = %target_id, "grant_role denied: caller not elevated");
            return Err(e.into());
        }

        let role: Role = role
            .parse()
            .map_err(|_| AccessError::InvalidRole(role.to_string()))?;

        let target = self.load_active_target(target_id).await?;

        if caller.is(target_id) && role == Role::Standard {
            self.ensure_not_last_elevated(actor).await?;
        }

        // Profile first.
        let now = Utc::now();
        let profiles = &self.profiles;
        let prior = match call_with_retry(&self.retry, "set_role", || {
            profiles.set_role(target_id, role, actor, now)
        })
        .await
        {
            Ok(prior) => prior,
            Err(StoreError::NotFound) => return Err(AccessError::TargetNotFound),
            Err(e) => {
                // A timed-out write may still have landed.
                self.roll_back_role(target_id, role, target.role, actor).await;
                return Err(e.into());
            }
        };

        // Then the claim, then revocation.
        self.propagate_role(target_id, role, prior.role, actor).await?;

        self.audit
            .record(
                AuditEntry::role_change(actor.clone(), target_id.clone(), prior.role, role)
                    .with_metadata(json!({ "source": "grant_role" })),
            )
            .await;

        info!(
            actor_id = %actor,
            target_id = %target_id,
            old_role = %prior.role,
            new_role = %role,
            "role granted"
        );
        Ok(RoleGrant {
            success: true,
            role,
        })
    }

    /// Steps after a committed profile role write: set the signed claim
    /// (rolling the profile back if that fails), then revoke the target's
    /// sessions. Revocation failure is never surfaced.
    pub(crate) async fn propagate_role(
        &self,
        target_id: &IdentityId,
        role: Role,
        prior_role: Role,
        actor: &IdentityId,
    ) -> AccessResult<()> {
        let identity = &self.identity;
        // Attempts cut off by the timeout never answer, and may have landed.
        let unanswered = &AtomicU32::new(0);
        if let Err(e) = call_with_retry(&self.retry, "set_claims", move || async move {
            unanswered.fetch_add(1, Ordering::Relaxed);
            let result = identity.set_claims(target_id, AuthClaims::new(role)).await;
            unanswered.fetch_sub(1, Ordering::Relaxed);
            result
        })
        .await
        {
            warn!(target_id = %target_id, error = %e, "claim update failed, rolling back profile role");
            self.roll_back_role(target_id, role, prior_role, actor).await;
            if unanswered.load(Ordering::Relaxed) > 0 {
                self.restore_claim(target_id, role, prior_role).await;
            }
            return Err(match e {
                IdentityProviderError::NotFound => AccessError::TargetNotFound,
                _ => AccessError::Unavailable,
            });
        }

        self.revoke_sessions(target_id).await;
        Ok(())
    }

    /// Put the initial claim on a freshly provisioned identity, unless a
    /// claim is already there. Returns whether it was written.
    pub async fn seed_claims(
        &self,
        identity_id: &IdentityId,
        role: Role,
    ) -> Result<bool, IdentityProviderError> {
        let identity = &self.identity;
        call_with_retry(&self.retry, "seed_claims", || {
            identity.set_claims_if_absent(identity_id, AuthClaims::new(role))
        })
        .await
    }

    /// Overwrite the claim with `role`, whatever it currently is.
    pub async fn assert_claims(
        &self,
        identity_id: &IdentityId,
        role: Role,
    ) -> Result<(), IdentityProviderError> {
        let identity = &self.identity;
        call_with_retry(&self.retry, "assert_claims", || {
            identity.set_claims(identity_id, AuthClaims::new(role))
        })
        .await
    }

    async fn revoke_sessions(&self, target_id: &IdentityId) {
        if let Err(e) = self.revocation.try_revoke_all(target_id).await {
            warn!(target_id = %target_id, error = %e, "inline revocation failed, retrying in background");
            self.revocation.revoke_all_in_background(target_id.clone());
        }
    }

    /// Put the claim back to `prior` and end any session that may have been
    /// issued with `applied` in the meantime.
    async fn restore_claim(&self, target_id: &IdentityId, applied: Role, prior: Role) {
        if applied == prior {
            return;
        }
        match self.assert_claims(target_id, prior).await {
            Ok(()) => {
                info!(target_id = %target_id, role = %prior, "claim restored");
                self.revoke_sessions(target_id).await;
            }
            Err(IdentityProviderError::NotFound) => {}
            Err(e) => {
                self.alerts.raise(OperationalAlert::new(
                    AlertKind::RollbackFailed,
                    Some(target_id.clone()),
                    format!("claim may be left at {applied} after failed claim update (was {prior}): {e}"),
                ));
                self.revocation.revoke_all_in_background(target_id.clone());
            }
        }
    }

    /// Reject when `actor` is the only active elevated identity.
    ///
    /// The count and the following write are not atomic; two concurrent
    /// self-demotions by the last two admins can still both pass.
    pub(crate) async fn ensure_not_last_elevated(&self, actor: &IdentityId) -> AccessResult<()> {
        let profiles = &self.profiles;
        let elevated = call_with_retry(&self.retry, "count_with_role", || {
            profiles.count_with_role(Role::Elevated, true)
        })
        .await?;
        if elevated <= 1 {
            warn!(actor_id = %actor, "refusing to remove the last elevated identity");
            return Err(AccessError::LastPrivilegedActorProtected);
        }
        Ok(())
    }

    /// The target must exist and be active.
    pub(crate) async fn load_active_target(&self, target_id: &IdentityId) -> AccessResult<Profile> {
        let profiles = &self.profiles;
        match call_with_retry(&self.retry, "get_profile", || profiles.get(target_id)).await? {
            Some(p) if p.is_active => Ok(p),
            _ => Err(AccessError::TargetNotFound),
        }
    }

    async fn roll_back_role(
        &self,
        target_id: &IdentityId,
        applied: Role,
        prior: Role,
        actor: &IdentityId,
    ) {
        if applied == prior {
            return;
        }
        let profiles = &self.profiles;
        let result = call_with_retry(&self.retry, "roll_back_role", || {
            profiles.compare_and_set_role(target_id, applied, prior, actor, Utc::now())
        })
        .await;
        match result {
            Ok(true) => info!(target_id = %target_id, role = %prior, "profile role rolled back"),
            Ok(false) => warn!(
                target_id = %target_id,
                "profile role is not at the failed write's value, nothing to roll back"
            ),
            Err(StoreError::NotFound) => {}
            Err(e) => self.alerts.raise(OperationalAlert::new(
                AlertKind::RollbackFailed,
                Some(target_id.clone()),
                format!("profile role left at {applied} after failed claim update (was {prior}): {e}"),
            )),
        }
    }
}
