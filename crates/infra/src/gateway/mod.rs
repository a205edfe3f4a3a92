//! Policy-guarded data gateway.
//!
//! The only path from the API to profiles, audit records and content
//! documents. Every method evaluates the access policy before the store is
//! touched; a denied call has no side effects.
//!
//! Missing resources are evaluated against a placeholder: callers that would
//! be allowed to see the resource get `NotFound`, everyone else gets the same
//! denial they would get for an existing one.

mod documents;

pub use documents::{Document, DocumentStore, InMemoryDocumentStore};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use rolegate_auth::policy::fields::MESSAGE_SCHEMA;
use rolegate_auth::policy::{Explanation, RuleSet, collections, default_rules};
use rolegate_auth::{
    AuditEntry, AuditRecord, ChangeType, Operation, PolicyInput, Principal, Profile, ProfilePatch,
    Resource, Role,
};
use rolegate_core::IdentityId;

use crate::audit_recorder::AuditRecorder;
use crate::audit_store::AuditQuery;
use crate::claims_issuer::ClaimsIssuer;
use crate::error::{AccessError, AccessResult};
use crate::profile_store::ProfileStore;
use crate::retry::{RetryPolicy, call_with_retry};
use crate::revocation::SessionRevocationManager;

#[derive(Clone)]
pub struct DataGateway {
    rules: &'static RuleSet,
    profiles: Arc<dyn ProfileStore>,
    documents: Arc<dyn DocumentStore>,
    audit: AuditRecorder,
    claims: ClaimsIssuer,
    revocation: SessionRevocationManager,
    retry: RetryPolicy,
}

impl DataGateway {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        documents: Arc<dyn DocumentStore>,
        audit: AuditRecorder,
        claims: ClaimsIssuer,
        revocation: SessionRevocationManager,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            rules: default_rules(),
            profiles,
            documents,
            audit,
            claims,
            revocation,
            retry,
        }
    }

    /// Evaluate against `rules` instead of the deployed rule set.
    pub fn with_rules(mut self, rules: &'static RuleSet) -> Self {
        self.rules = rules;
        self
    }

    // ── profiles ────────────────────────────────────────────────────────────

    pub async fn read_profile(
        &self,
        caller: &Principal,
        identity_id: &IdentityId,
    ) -> AccessResult<Profile> {
        self.load_profile(caller, Operation::Read, identity_id, None).await
    }

    /// Generic profile update. Role and activation changes go through the
    /// same propagation, revocation and audit steps as the dedicated paths.
    ///
    /// The write is conditional on `expected_updated_at`, or on the version
    /// the policy was evaluated against when none is given.
    pub async fn update_profile(
        &self,
        caller: &Principal,
        identity_id: &IdentityId,
        patch: &ProfilePatch,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> AccessResult<Profile> {
        patch.validate()?;
        let request = patch.to_fields();
        let current = self
            .load_profile(caller, Operation::Update, identity_id, Some(&request))
            .await?;

        let actor = &caller.identity_id;
        let role_change = patch.role.filter(|r| *r != current.role);
        let active_change = patch.is_active.filter(|a| *a != current.is_active);
        let gives_up_elevation =
            role_change == Some(Role::Standard) || active_change == Some(false);
        if caller.is(identity_id) && current.role.is_elevated() && gives_up_elevation {
            self.claims.ensure_not_last_elevated(actor).await?;
        }

        let now = Utc::now();
        let expected = expected_updated_at.unwrap_or(current.updated_at);
        let profiles = &self.profiles;
        // A retried attempt whose predecessor already landed reports Conflict.
        let updated = call_with_retry(&self.retry, "apply_patch", || {
            profiles.apply_patch(identity_id, patch, Some(expected), actor, now)
        })
        .await?;

        if let Some(role) = role_change {
            self.claims
                .propagate_role(identity_id, role, current.role, actor)
                .await?;
            self.audit
                .record(
                    AuditEntry::role_change(actor.clone(), identity_id.clone(), current.role, role)
                        .with_metadata(json!({ "source": "update_profile" })),
                )
                .await;
        }
        if let Some(active) = active_change {
            self.after_activation_change(actor, identity_id, active, "update_profile")
                .await;
        }

        debug!(actor_id = %actor, target_id = %identity_id, "profile updated");
        Ok(updated)
    }

    /// Set `isActive`. Unchanged state is a no-op without audit.
    pub async fn set_active(
        &self,
        caller: &Principal,
        identity_id: &IdentityId,
        active: bool,
    ) -> AccessResult<Profile> {
        let mut request = Map::new();
        request.insert("isActive".to_string(), Value::Bool(active));
        let current = self
            .load_profile(caller, Operation::Update, identity_id, Some(&request))
            .await?;
        if current.is_active == active {
            return Ok(current);
        }

        let actor = &caller.identity_id;
        if !active && caller.is(identity_id) && current.role.is_elevated() {
            self.claims.ensure_not_last_elevated(actor).await?;
        }

        let now = Utc::now();
        let profiles = &self.profiles;
        let mut updated = call_with_retry(&self.retry, "set_active", || {
            profiles.set_active(identity_id, active, actor, now)
        })
        .await?;
        updated.is_active = active;
        updated.updated_at = now;
        updated.updated_by = actor.clone();

        self.after_activation_change(actor, identity_id, active, "set_active")
            .await;
        Ok(updated)
    }

    /// Stamp `lastLogoutAt` on the caller's own profile.
    pub async fn record_logout(&self, caller: &Principal, at: DateTime<Utc>) -> AccessResult<()> {
        let mut request = Map::new();
        request.insert("lastLogoutAt".to_string(), json!(at));
        let identity_id = &caller.identity_id;
        self.load_profile(caller, Operation::Update, identity_id, Some(&request))
            .await?;
        let profiles = &self.profiles;
        call_with_retry(&self.retry, "record_logout", || {
            profiles.record_logout(identity_id, at)
        })
        .await?;
        Ok(())
    }

    async fn load_profile(
        &self,
        caller: &Principal,
        operation: Operation,
        identity_id: &IdentityId,
        request: Option<&Map<String, Value>>,
    ) -> AccessResult<Profile> {
        let profiles = &self.profiles;
        let stored = call_with_retry(&self.retry, "get_profile", || profiles.get(identity_id)).await?;

        let resource = match &stored {
            Some(profile) => Resource::profile(profile),
            None => Resource {
                owner_id: Some(identity_id.clone()),
                ..Default::default()
            },
        };
        let mut input =
            PolicyInput::new(operation, collections::PROFILES, Some(caller)).with_resource(&resource);
        if let Some(request) = request {
            input = input.with_request(request);
        }
        self.authorize(&input)?;
        stored.ok_or(AccessError::NotFound)
    }

    async fn after_activation_change(
        &self,
        actor: &IdentityId,
        identity_id: &IdentityId,
        active: bool,
        source: &str,
    ) {
        if !active {
            if let Err(e) = self.revocation.revoke_all(identity_id).await {
                warn!(target_id = %identity_id, error = %e, "revocation after deactivation failed, retrying in background");
                self.revocation.revoke_all_in_background(identity_id.clone());
            }
        }
        let change_type = if active {
            ChangeType::Reactivate
        } else {
            ChangeType::Deactivate
        };
        self.audit
            .record(
                AuditEntry::new(actor.clone(), identity_id.clone(), change_type)
                    .with_values(json!({ "isActive": !active }), json!({ "isActive": active }))
                    .with_metadata(json!({ "source": source })),
            )
            .await;
        info!(actor_id = %actor, target_id = %identity_id, active, "account activation changed");
    }

    // ── audit ───────────────────────────────────────────────────────────────

    pub async fn list_audit(
        &self,
        caller: &Principal,
        query: &AuditQuery,
    ) -> AccessResult<Vec<AuditRecord>> {
        self.authorize(&PolicyInput::new(
            Operation::Read,
            collections::AUDIT,
            Some(caller),
        ))?;
        let store = self.audit.store();
        let records =
            call_with_retry(&self.retry, "list_audit", || store.list(query)).await?;
        Ok(records)
    }

    // ── content documents ───────────────────────────────────────────────────

    pub async fn create_document(
        &self,
        caller: Option<&Principal>,
        collection: &str,
        fields: Map<String, Value>,
    ) -> AccessResult<Document> {
        document_collection(collection)?;
        if collection == collections::MESSAGES {
            MESSAGE_SCHEMA
                .validate(&fields)
                .map_err(|v| AccessError::InvalidArgument(v.to_string()))?;
        }
        self.authorize(&PolicyInput::new(Operation::Create, collection, caller).with_request(&fields))?;
        let documents = &self.documents;
        let doc = call_with_retry(&self.retry, "insert_document", || {
            documents.insert(collection, fields.clone())
        })
        .await?;
        debug!(collection, document_id = %doc.id, "document created");
        Ok(doc)
    }

    pub async fn read_document(
        &self,
        caller: Option<&Principal>,
        collection: &str,
        id: Uuid,
    ) -> AccessResult<Document> {
        self.load_document(caller, Operation::Read, collection, id, None)
            .await
    }

    pub async fn update_document(
        &self,
        caller: Option<&Principal>,
        collection: &str,
        id: Uuid,
        fields: Map<String, Value>,
    ) -> AccessResult<Document> {
        self.load_document(caller, Operation::Update, collection, id, Some(&fields))
            .await?;
        let documents = &self.documents;
        let doc = call_with_retry(&self.retry, "merge_document", || {
            documents.merge(collection, id, fields.clone())
        })
        .await?;
        Ok(doc)
    }

    pub async fn delete_document(
        &self,
        caller: Option<&Principal>,
        collection: &str,
        id: Uuid,
    ) -> AccessResult<()> {
        self.load_document(caller, Operation::Delete, collection, id, None)
            .await?;
        let documents = &self.documents;
        call_with_retry(&self.retry, "remove_document", || documents.remove(collection, id))
            .await?
            .ok_or(AccessError::NotFound)?;
        Ok(())
    }

    /// Documents the caller may read, oldest first. A collection without a
    /// read rule is denied outright rather than listed as empty.
    pub async fn list_documents(
        &self,
        caller: Option<&Principal>,
        collection: &str,
    ) -> AccessResult<Vec<Document>> {
        document_collection(collection)?;
        let has_read_rule = self
            .rules
            .collection(collection)
            .and_then(|rules| rules.rule(Operation::Read))
            .is_some();
        if !has_read_rule {
            return Err(denial(caller));
        }

        let documents = &self.documents;
        let all = call_with_retry(&self.retry, "list_documents", || documents.list(collection)).await?;
        Ok(all
            .into_iter()
            .filter(|doc| {
                let resource = Resource::document(doc.fields.clone());
                let input =
                    PolicyInput::new(Operation::Read, collection, caller).with_resource(&resource);
                self.rules.evaluate(&input).is_allowed()
            })
            .collect())
    }

    async fn load_document(
        &self,
        caller: Option<&Principal>,
        operation: Operation,
        collection: &str,
        id: Uuid,
        request: Option<&Map<String, Value>>,
    ) -> AccessResult<Document> {
        document_collection(collection)?;
        let documents = &self.documents;
        let stored = call_with_retry(&self.retry, "get_document", || documents.get(collection, id)).await?;

        let resource = stored
            .as_ref()
            .map(|doc| Resource::document(doc.fields.clone()))
            .unwrap_or_default();
        let mut input = PolicyInput::new(operation, collection, caller).with_resource(&resource);
        if let Some(request) = request {
            input = input.with_request(request);
        }
        self.authorize(&input)?;
        stored.ok_or(AccessError::NotFound)
    }

    // ── explanation ─────────────────────────────────────────────────────────

    /// Decision and deciding rule for `caller`. The explanation names rules,
    /// never stored field values.
    pub async fn explain(
        &self,
        caller: &Principal,
        operation: Operation,
        collection: &str,
        resource_id: Option<&str>,
    ) -> AccessResult<Explanation> {
        let resource = match resource_id {
            None => None,
            Some(raw) if collection == collections::PROFILES => {
                let identity_id = IdentityId::new(raw)?;
                let profiles = &self.profiles;
                call_with_retry(&self.retry, "get_profile", || profiles.get(&identity_id))
                    .await?
                    .map(|p| Resource::profile(&p))
            }
            Some(raw) => {
                let id = Uuid::parse_str(raw)
                    .map_err(|_| AccessError::InvalidArgument("malformed document id".to_string()))?;
                let documents = &self.documents;
                call_with_retry(&self.retry, "get_document", || documents.get(collection, id))
                    .await?
                    .map(|doc| Resource::document(doc.fields))
            }
        };

        let mut input = PolicyInput::new(operation, collection, Some(caller));
        if let Some(resource) = &resource {
            input = input.with_resource(resource);
        }
        Ok(self.rules.explain(&input))
    }

    fn authorize(&self, input: &PolicyInput<'_>) -> AccessResult<()> {
        if self.rules.evaluate(input).is_allowed() {
            return Ok(());
        }
        debug!(
            collection = input.collection,
            operation = %input.operation,
            caller_id = input.caller.map(|c| c.identity_id.as_str()),
            "access denied by policy"
        );
        Err(denial(input.caller))
    }
}

fn denial(caller: Option<&Principal>) -> AccessError {
    match caller {
        None => AccessError::Unauthenticated,
        Some(_) => AccessError::PermissionDenied,
    }
}

/// Profiles and audit have dedicated paths; they are never documents.
fn document_collection(collection: &str) -> AccessResult<()> {
    if collection == collections::PROFILES || collection == collections::AUDIT {
        return Err(AccessError::InvalidArgument(format!(
            "'{collection}' is not a document collection"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    use rolegate_auth::policy::{CollectionRules, Decision, DecisionReason, Rule};
    use serde_json::json;

    use crate::alerts::AlertKind;
    use crate::audit_store::AuditStore;
    use crate::identity::IdentityProvider;
    use crate::test_support::{Fixture, id};

    fn gateway(f: &Fixture) -> DataGateway {
        DataGateway::new(
            f.profiles.clone(),
            Arc::new(InMemoryDocumentStore::new()),
            f.recorder.clone(),
            f.claims.clone(),
            f.revocation.clone(),
            f.retry.clone(),
        )
    }

    fn body(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    fn rename(name: &str) -> ProfilePatch {
        ProfilePatch {
            display_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    // ── profiles ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn owners_and_elevated_read_profiles() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (user, _) = f.identity("user-1", Role::Standard).await;
        let (other, _) = f.identity("user-2", Role::Standard).await;
        let (admin, _) = f.identity("admin-1", Role::Elevated).await;

        assert!(g.read_profile(&user, &id("user-1")).await.is_ok());
        assert!(g.read_profile(&admin, &id("user-1")).await.is_ok());
        assert_eq!(
            g.read_profile(&other, &id("user-1")).await,
            Err(AccessError::PermissionDenied)
        );
    }

    #[tokio::test]
    async fn missing_profiles_do_not_leak_existence() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (user, _) = f.identity("user-1", Role::Standard).await;
        let (admin, _) = f.identity("admin-1", Role::Elevated).await;

        assert_eq!(g.read_profile(&admin, &id("ghost")).await, Err(AccessError::NotFound));
        assert_eq!(
            g.read_profile(&user, &id("ghost")).await,
            Err(AccessError::PermissionDenied)
        );
    }

    #[tokio::test]
    async fn standard_owner_updates_name_but_not_role() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (user, _) = f.identity("user-1", Role::Standard).await;

        let updated = g
            .update_profile(&user, &id("user-1"), &rename("Ada"), None)
            .await
            .unwrap();
        assert_eq!(updated.display_name, "Ada");

        let escalate = ProfilePatch {
            role: Some(Role::Elevated),
            ..rename("Root")
        };
        assert_eq!(
            g.update_profile(&user, &id("user-1"), &escalate, None).await,
            Err(AccessError::PermissionDenied)
        );
        let stored = f.profile("user-1").await.unwrap();
        assert_eq!(stored.role, Role::Standard);
        assert_eq!(stored.display_name, "Ada");
        assert_eq!(f.idp.inner.current_claims(&id("user-1")).unwrap().role, Role::Standard);
    }

    #[tokio::test]
    async fn invalid_patch_is_rejected_before_policy() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (user, _) = f.identity("user-1", Role::Standard).await;
        let r = g
            .update_profile(&user, &id("user-1"), &ProfilePatch::default(), None)
            .await;
        assert!(matches!(r, Err(AccessError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn stale_precondition_conflicts() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (user, _) = f.identity("user-1", Role::Standard).await;
        let before = f.profile("user-1").await.unwrap().updated_at;

        g.update_profile(&user, &id("user-1"), &rename("First"), Some(before))
            .await
            .unwrap();
        let stale = g
            .update_profile(&user, &id("user-1"), &rename("Second"), Some(before))
            .await;
        assert!(matches!(stale, Err(AccessError::Conflict(_))));
        assert_eq!(f.profile("user-1").await.unwrap().display_name, "First");
    }

    #[tokio::test]
    async fn elevated_role_change_propagates_and_audits() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (admin, _) = f.identity("admin-1", Role::Elevated).await;
        let (_, token) = f.identity("user-1", Role::Standard).await;

        let patch = ProfilePatch {
            role: Some(Role::Elevated),
            ..Default::default()
        };
        let updated = g.update_profile(&admin, &id("user-1"), &patch, None).await.unwrap();
        assert_eq!(updated.role, Role::Elevated);
        assert_eq!(f.idp.inner.current_claims(&id("user-1")).unwrap().role, Role::Elevated);
        assert!(f.idp.verify_token(&token.token).await.is_err());

        let records = f.audit.all();
        let last = records.last().unwrap();
        assert_eq!(last.change_type, ChangeType::RoleGrant);
        assert_eq!(last.metadata["source"], "update_profile");
    }

    #[tokio::test]
    async fn claim_failure_on_update_restores_role() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (admin, _) = f.identity("admin-1", Role::Elevated).await;
        f.identity("user-1", Role::Standard).await;
        f.idp.faults.fail_always("set_claims");

        let patch = ProfilePatch {
            role: Some(Role::Elevated),
            ..Default::default()
        };
        assert_eq!(
            g.update_profile(&admin, &id("user-1"), &patch, None).await,
            Err(AccessError::Unavailable)
        );
        assert_eq!(f.profile("user-1").await.unwrap().role, Role::Standard);
        assert!(f.audit.is_empty());
    }

    #[tokio::test]
    async fn deactivation_revokes_sessions_and_audits() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (admin, _) = f.identity("admin-1", Role::Elevated).await;
        let (_, token) = f.identity("user-1", Role::Standard).await;

        let updated = g.set_active(&admin, &id("user-1"), false).await.unwrap();
        assert!(!updated.is_active);
        assert!(f.idp.verify_token(&token.token).await.is_err());

        // Repeating is a no-op.
        g.set_active(&admin, &id("user-1"), false).await.unwrap();
        let kinds: Vec<ChangeType> = f.audit.all().iter().map(|r| r.change_type).collect();
        assert_eq!(kinds, vec![ChangeType::Deactivate]);

        g.set_active(&admin, &id("user-1"), true).await.unwrap();
        assert!(f.profile("user-1").await.unwrap().is_active);
        assert_eq!(f.audit.all().last().unwrap().change_type, ChangeType::Reactivate);
    }

    #[tokio::test]
    async fn standard_callers_cannot_deactivate() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (user, _) = f.identity("user-1", Role::Standard).await;
        assert_eq!(
            g.set_active(&user, &id("user-1"), false).await,
            Err(AccessError::PermissionDenied)
        );
        assert!(f.profile("user-1").await.unwrap().is_active);
    }

    #[tokio::test]
    async fn last_elevated_cannot_deactivate_itself() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (admin, _) = f.identity("admin-1", Role::Elevated).await;
        assert_eq!(
            g.set_active(&admin, &id("admin-1"), false).await,
            Err(AccessError::LastPrivilegedActorProtected)
        );
        let demote = ProfilePatch {
            role: Some(Role::Standard),
            ..Default::default()
        };
        assert_eq!(
            g.update_profile(&admin, &id("admin-1"), &demote, None).await,
            Err(AccessError::LastPrivilegedActorProtected)
        );
        assert_eq!(f.profile("admin-1").await.unwrap().role, Role::Elevated);
    }

    #[tokio::test]
    async fn failed_deactivation_revocation_falls_back_to_background() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (admin, _) = f.identity("admin-1", Role::Elevated).await;
        f.identity("user-1", Role::Standard).await;
        f.idp.faults.fail_always("revoke");

        g.set_active(&admin, &id("user-1"), false).await.unwrap();
        for _ in 0..100 {
            if f.alerts.count(AlertKind::RevocationAbandoned) == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(f.alerts.count(AlertKind::RevocationAbandoned), 1);
    }

    #[tokio::test]
    async fn logout_stamp_goes_through_policy() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (user, _) = f.identity("user-1", Role::Standard).await;
        let at = Utc::now();
        g.record_logout(&user, at).await.unwrap();
        assert_eq!(f.profile("user-1").await.unwrap().last_logout_at, Some(at));
    }

    // ── audit ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn audit_listing_is_elevated_only() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (admin, _) = f.identity("admin-1", Role::Elevated).await;
        let (user, _) = f.identity("user-1", Role::Standard).await;
        f.audit
            .append(AuditEntry::new(id("admin-1"), id("user-1"), ChangeType::Logout))
            .await
            .unwrap();

        let records = g.list_audit(&admin, &AuditQuery::default()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            g.list_audit(&user, &AuditQuery::default()).await,
            Err(AccessError::PermissionDenied)
        );
    }

    // ── documents ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn anonymous_visitors_post_valid_messages_only() {
        let f = Fixture::new();
        let g = gateway(&f);

        let ok = body(json!({"name": "V", "email": "v@example.com", "message": "hello"}));
        let doc = g.create_document(None, collections::MESSAGES, ok).await.unwrap();

        let bad = body(json!({"name": "V", "email": "nope", "message": "hello"}));
        assert!(matches!(
            g.create_document(None, collections::MESSAGES, bad).await,
            Err(AccessError::InvalidArgument(_))
        ));

        assert_eq!(
            g.read_document(None, collections::MESSAGES, doc.id).await,
            Err(AccessError::Unauthenticated)
        );
        let (admin, _) = f.identity("admin-1", Role::Elevated).await;
        assert!(g.read_document(Some(&admin), collections::MESSAGES, doc.id).await.is_ok());
    }

    #[tokio::test]
    async fn listing_hides_drafts_from_standard_callers() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (admin, _) = f.identity("admin-1", Role::Elevated).await;
        let (user, _) = f.identity("user-1", Role::Standard).await;

        g.create_document(Some(&admin), collections::BLOG_POSTS, body(json!({"title": "a", "status": "published"})))
            .await
            .unwrap();
        let draft = g
            .create_document(Some(&admin), collections::BLOG_POSTS, body(json!({"title": "b", "status": "draft"})))
            .await
            .unwrap();

        assert_eq!(g.list_documents(None, collections::BLOG_POSTS).await.unwrap().len(), 1);
        assert_eq!(g.list_documents(Some(&user), collections::BLOG_POSTS).await.unwrap().len(), 1);
        assert_eq!(g.list_documents(Some(&admin), collections::BLOG_POSTS).await.unwrap().len(), 2);

        g.update_document(Some(&admin), collections::BLOG_POSTS, draft.id, body(json!({"status": "published"})))
            .await
            .unwrap();
        assert_eq!(g.list_documents(None, collections::BLOG_POSTS).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn content_writes_and_deletes_need_elevated() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (admin, _) = f.identity("admin-1", Role::Elevated).await;
        let (user, _) = f.identity("user-1", Role::Standard).await;

        assert_eq!(
            g.create_document(Some(&user), collections::PROJECTS, body(json!({"title": "x"}))).await,
            Err(AccessError::PermissionDenied)
        );
        let doc = g
            .create_document(Some(&admin), collections::PROJECTS, body(json!({"title": "x"})))
            .await
            .unwrap();
        assert_eq!(
            g.delete_document(Some(&user), collections::PROJECTS, doc.id).await,
            Err(AccessError::PermissionDenied)
        );
        g.delete_document(Some(&admin), collections::PROJECTS, doc.id).await.unwrap();
        assert_eq!(
            g.read_document(Some(&admin), collections::PROJECTS, doc.id).await,
            Err(AccessError::NotFound)
        );
    }

    #[tokio::test]
    async fn collections_without_rules_are_fully_denied() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (admin, _) = f.identity("admin-1", Role::Elevated).await;

        assert_eq!(
            g.create_document(Some(&admin), "invoices", Map::new()).await,
            Err(AccessError::PermissionDenied)
        );
        assert_eq!(
            g.list_documents(Some(&admin), "invoices").await,
            Err(AccessError::PermissionDenied)
        );
        assert_eq!(
            g.read_document(Some(&admin), "invoices", Uuid::now_v7()).await,
            Err(AccessError::PermissionDenied)
        );
    }

    #[tokio::test]
    async fn profiles_and_audit_are_not_documents() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (admin, _) = f.identity("admin-1", Role::Elevated).await;
        assert!(matches!(
            g.create_document(Some(&admin), collections::AUDIT, Map::new()).await,
            Err(AccessError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn custom_rule_sets_are_honoured() {
        static RULES: OnceLock<RuleSet> = OnceLock::new();
        let rules = RULES.get_or_init(|| {
            RuleSet::empty().with_collection(
                "notes",
                CollectionRules {
                    create: Some(Rule::Authenticated),
                    ..Default::default()
                },
            )
        });
        let f = Fixture::new();
        let g = gateway(&f).with_rules(rules);
        let (user, _) = f.identity("user-1", Role::Standard).await;

        assert!(g.create_document(Some(&user), "notes", Map::new()).await.is_ok());
        assert_eq!(
            g.list_documents(Some(&user), "notes").await,
            Err(AccessError::PermissionDenied)
        );
        assert_eq!(
            g.create_document(Some(&user), collections::PROJECTS, Map::new()).await,
            Err(AccessError::PermissionDenied)
        );
    }

    #[tokio::test]
    async fn explain_reports_the_deciding_rule() {
        let f = Fixture::new();
        let g = gateway(&f);
        let (user, _) = f.identity("user-1", Role::Standard).await;
        f.identity("user-2", Role::Standard).await;

        let own = g
            .explain(&user, Operation::Read, collections::PROFILES, Some("user-1"))
            .await
            .unwrap();
        assert_eq!(own.decision, Decision::Allow);

        let other = g
            .explain(&user, Operation::Read, collections::PROFILES, Some("user-2"))
            .await
            .unwrap();
        assert_eq!(other.decision, Decision::Deny);
        assert!(matches!(other.reason, DecisionReason::RuleFailed { .. }));

        let unknown = g.explain(&user, Operation::Read, "invoices", None).await.unwrap();
        assert_eq!(unknown.reason, DecisionReason::UnknownCollection);
    }
}
