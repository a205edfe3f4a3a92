use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use rolegate_auth::{Profile, ProfilePatch, Role};
use rolegate_core::IdentityId;

use super::{CreateOutcome, ProfileStore, StoreError};

/// In-memory profile store.
///
/// Intended for tests/dev. Each method holds the write lock for the whole
/// check-and-write, which gives the same per-document atomicity the
/// Postgres adapter gets from conditional statements.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<IdentityId, Profile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update<T>(
        &self,
        identity_id: &IdentityId,
        f: impl FnOnce(&mut Profile) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut profiles = self
            .profiles
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let profile = profiles.get_mut(identity_id).ok_or(StoreError::NotFound)?;
        f(profile)
    }
}

#[async_trait::async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn create_if_absent(&self, profile: &Profile) -> Result<CreateOutcome, StoreError> {
        let mut profiles = self
            .profiles
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        if profiles.contains_key(&profile.identity_id) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        profiles.insert(profile.identity_id.clone(), profile.clone());
        Ok(CreateOutcome::Created)
    }

    async fn get(&self, identity_id: &IdentityId) -> Result<Option<Profile>, StoreError> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(profiles.get(identity_id).cloned())
    }

    async fn set_role(
        &self,
        identity_id: &IdentityId,
        role: Role,
        actor: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<Profile, StoreError> {
        self.update(identity_id, |p| {
            let before = p.clone();
            p.role = role;
            p.updated_at = at;
            p.updated_by = actor.clone();
            Ok(before)
        })
    }

    async fn compare_and_set_role(
        &self,
        identity_id: &IdentityId,
        expected: Role,
        role: Role,
        actor: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.update(identity_id, |p| {
            if p.role != expected {
                return Ok(false);
            }
            p.role = role;
            p.updated_at = at;
            p.updated_by = actor.clone();
            Ok(true)
        })
    }

    async fn apply_patch(
        &self,
        identity_id: &IdentityId,
        patch: &ProfilePatch,
        expected_updated_at: Option<DateTime<Utc>>,
        actor: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<Profile, StoreError> {
        self.update(identity_id, |p| {
            if let Some(expected) = expected_updated_at {
                if p.updated_at != expected {
                    return Err(StoreError::Conflict(
                        "profile changed since it was read".to_string(),
                    ));
                }
            }
            patch.apply_to(p, actor, at);
            Ok(p.clone())
        })
    }

    async fn set_active(
        &self,
        identity_id: &IdentityId,
        active: bool,
        actor: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<Profile, StoreError> {
        self.update(identity_id, |p| {
            let before = p.clone();
            p.is_active = active;
            p.updated_at = at;
            p.updated_by = actor.clone();
            Ok(before)
        })
    }

    async fn record_logout(
        &self,
        identity_id: &IdentityId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update(identity_id, |p| {
            p.last_logout_at = Some(at);
            Ok(())
        })
    }

    async fn delete(&self, identity_id: &IdentityId) -> Result<Option<Profile>, StoreError> {
        let mut profiles = self
            .profiles
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(profiles.remove(identity_id))
    }

    async fn count_with_role(&self, role: Role, active_only: bool) -> Result<u64, StoreError> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(profiles
            .values()
            .filter(|p| p.role == role && (!active_only || p.is_active))
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn id(s: &str) -> IdentityId {
        IdentityId::new(s).unwrap()
    }

    fn profile(s: &str) -> Profile {
        Profile::provision(id(s), &format!("{s}@example.com"), None, IdentityId::system(), Utc::now())
    }

    #[tokio::test]
    async fn create_if_absent_is_idempotent() {
        let store = InMemoryProfileStore::new();
        assert_eq!(store.create_if_absent(&profile("u1")).await.unwrap(), CreateOutcome::Created);

        let mut replay = profile("u1");
        replay.display_name = "someone else".to_string();
        assert_eq!(
            store.create_if_absent(&replay).await.unwrap(),
            CreateOutcome::AlreadyExists
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&id("u1")).await.unwrap().unwrap().display_name, "u1");
    }

    #[tokio::test]
    async fn concurrent_creates_produce_one_record() {
        let store = Arc::new(InMemoryProfileStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create_if_absent(&profile("racer")).await.unwrap()
            }));
        }
        let mut created = 0;
        for h in handles {
            if h.await.unwrap() == CreateOutcome::Created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn set_role_returns_prior_profile() {
        let store = InMemoryProfileStore::new();
        store.create_if_absent(&profile("u1")).await.unwrap();
        let before = store
            .set_role(&id("u1"), Role::Elevated, &id("admin"), Utc::now())
            .await
            .unwrap();
        assert_eq!(before.role, Role::Standard);
        let after = store.get(&id("u1")).await.unwrap().unwrap();
        assert_eq!(after.role, Role::Elevated);
        assert_eq!(after.updated_by, id("admin"));
    }

    #[tokio::test]
    async fn set_role_on_missing_profile_is_not_found() {
        let store = InMemoryProfileStore::new();
        let err = store
            .set_role(&id("ghost"), Role::Elevated, &id("admin"), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound);
    }

    #[tokio::test]
    async fn compare_and_set_only_writes_on_match() {
        let store = InMemoryProfileStore::new();
        store.create_if_absent(&profile("u1")).await.unwrap();
        let a = id("admin");
        assert!(!store.compare_and_set_role(&id("u1"), Role::Elevated, Role::Standard, &a, Utc::now()).await.unwrap());
        assert!(store.compare_and_set_role(&id("u1"), Role::Standard, Role::Elevated, &a, Utc::now()).await.unwrap());
        assert_eq!(store.get(&id("u1")).await.unwrap().unwrap().role, Role::Elevated);
    }

    #[tokio::test]
    async fn apply_patch_checks_precondition() {
        let store = InMemoryProfileStore::new();
        let p = profile("u1");
        let read_at = p.updated_at;
        store.create_if_absent(&p).await.unwrap();

        let patch = ProfilePatch {
            display_name: Some("New".to_string()),
            ..Default::default()
        };
        let updated = store
            .apply_patch(&id("u1"), &patch, Some(read_at), &id("u1"), Utc::now())
            .await
            .unwrap();
        assert_eq!(updated.display_name, "New");

        // Second writer still holding the stale read loses.
        let err = store
            .apply_patch(&id("u1"), &patch, Some(read_at), &id("u1"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn counts_filter_by_role_and_activity() {
        let store = InMemoryProfileStore::new();
        for s in ["a", "b", "c"] {
            store.create_if_absent(&profile(s)).await.unwrap();
        }
        let admin = id("admin");
        store.set_role(&id("a"), Role::Elevated, &admin, Utc::now()).await.unwrap();
        store.set_role(&id("b"), Role::Elevated, &admin, Utc::now()).await.unwrap();
        store.set_active(&id("b"), false, &admin, Utc::now()).await.unwrap();

        assert_eq!(store.count_with_role(Role::Elevated, false).await.unwrap(), 2);
        assert_eq!(store.count_with_role(Role::Elevated, true).await.unwrap(), 1);
        assert_eq!(store.count_with_role(Role::Standard, true).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_returns_removed_profile_once() {
        let store = InMemoryProfileStore::new();
        store.create_if_absent(&profile("u1")).await.unwrap();
        assert!(store.delete(&id("u1")).await.unwrap().is_some());
        assert!(store.delete(&id("u1")).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn record_logout_stamps_profile() {
        let store = InMemoryProfileStore::new();
        store.create_if_absent(&profile("u1")).await.unwrap();
        let at = Utc::now();
        store.record_logout(&id("u1"), at).await.unwrap();
        assert_eq!(store.get(&id("u1")).await.unwrap().unwrap().last_logout_at, Some(at));
    }
}
