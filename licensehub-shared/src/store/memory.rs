/// In-memory store
///
/// All state sits behind one tokio mutex. A consolidation transaction takes
/// the lock for its whole lifetime and works on a staged copy of the state,
/// which replaces the live state only on commit. That gives the same
/// all-or-nothing and one-at-a-time guarantees the Postgres store gets from
/// row locks.

use super::{private, ConsolidationTransaction, LicenseStore, StoreError, StoreResult};
use crate::consolidation::ConversionGrant;
use crate::models::license_key::{LicenseKey, NewLicenseKey};
use crate::models::organization::{Organization, OrganizationRole, OrganizationUser};
use crate::models::sub_license::{NewSubLicense, SubLicense, SubLicenseStatus};
use crate::models::user::User;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Row counts, for asserting that a failed operation wrote nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub licenses: usize,
    pub active_licenses: usize,
    pub converted_licenses: usize,
    pub sub_licenses: usize,
    pub organizations: usize,
    pub organization_users: usize,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    licenses: HashMap<Uuid, LicenseKey>,
    /// (user_id, license_id)
    ownership: BTreeSet<(Uuid, Uuid)>,
    sub_licenses: HashMap<Uuid, SubLicense>,
    organizations: HashMap<Uuid, Organization>,
    organization_users: Vec<OrganizationUser>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl MemoryState {
    /// Strictly increasing timestamps so creation order is never ambiguous
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    fn license_mut(&mut self, id: Uuid) -> StoreResult<&mut LicenseKey> {
        self.licenses
            .get_mut(&id)
            .ok_or_else(|| StoreError::Conflict(format!("license {id} disappeared")))
    }

    fn sub_license_email_taken(&self, id: Uuid, main_license_id: Uuid, email: &str) -> bool {
        self.sub_licenses.values().any(|s| {
            s.id != id
                && s.main_license_key_id == main_license_id
                && s.assigned_email.as_deref() == Some(email)
        })
    }
}

/// [`LicenseStore`] kept in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryLicenseStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryLicenseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user; the external auth system owns user creation in production
    pub async fn add_user(&self, email: &str, username: Option<&str>) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == email) {
            return Err(StoreError::Constraint(format!("user {email} already exists")));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            username: username.map(str::to_string),
            created_at: state.next_timestamp(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    /// Current row counts
    pub async fn counts(&self) -> StoreCounts {
        let state = self.state.lock().await;
        StoreCounts {
            licenses: state.licenses.len(),
            active_licenses: state.licenses.values().filter(|l| l.is_active).count(),
            converted_licenses: state.licenses.values().filter(|l| l.converted_to_team).count(),
            sub_licenses: state.sub_licenses.len(),
            organizations: state.organizations.len(),
            organization_users: state.organization_users.len(),
        }
    }
}

#[async_trait]
impl LicenseStore for InMemoryLicenseStore {
    async fn find_license_by_key(&self, key: &str) -> StoreResult<Option<LicenseKey>> {
        let state = self.state.lock().await;
        Ok(state.licenses.values().find(|l| l.key == key).cloned())
    }

    async fn find_license_by_id(&self, id: Uuid) -> StoreResult<Option<LicenseKey>> {
        Ok(self.state.lock().await.licenses.get(&id).cloned())
    }

    async fn find_sub_license_by_key(&self, key: &str) -> StoreResult<Option<SubLicense>> {
        let state = self.state.lock().await;
        Ok(state.sub_licenses.values().find(|s| s.key == key).cloned())
    }

    async fn find_sub_license_by_id(&self, id: Uuid) -> StoreResult<Option<SubLicense>> {
        Ok(self.state.lock().await.sub_licenses.get(&id).cloned())
    }

    async fn find_sub_license_by_email(
        &self,
        main_license_id: Uuid,
        email: &str,
    ) -> StoreResult<Option<SubLicense>> {
        let state = self.state.lock().await;
        Ok(state
            .sub_licenses
            .values()
            .find(|s| {
                s.main_license_key_id == main_license_id && s.assigned_email.as_deref() == Some(email)
            })
            .cloned())
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_owned_licenses(&self, user_id: Uuid) -> StoreResult<Vec<LicenseKey>> {
        let state = self.state.lock().await;
        let mut owned: Vec<LicenseKey> = state
            .ownership
            .iter()
            .filter(|(owner, _)| *owner == user_id)
            .filter_map(|(_, license_id)| state.licenses.get(license_id).cloned())
            .collect();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(owned)
    }

    async fn list_assigned_sub_licenses(
        &self,
        user_id: Uuid,
        email: Option<&str>,
    ) -> StoreResult<Vec<SubLicense>> {
        let state = self.state.lock().await;
        let mut assigned: Vec<SubLicense> = state
            .sub_licenses
            .values()
            .filter(|s| s.is_active())
            .filter(|s| {
                s.assigned_user_id == Some(user_id)
                    || (email.is_some() && s.assigned_email.as_deref() == email)
            })
            .cloned()
            .collect();
        assigned.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(assigned)
    }

    async fn list_sub_licenses(&self, main_license_id: Uuid) -> StoreResult<Vec<SubLicense>> {
        let state = self.state.lock().await;
        let mut subs: Vec<SubLicense> = state
            .sub_licenses
            .values()
            .filter(|s| s.main_license_key_id == main_license_id)
            .cloned()
            .collect();
        subs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(subs)
    }

    async fn owns_license(&self, user_id: Uuid, license_id: Uuid) -> StoreResult<bool> {
        Ok(self.state.lock().await.ownership.contains(&(user_id, license_id)))
    }

    async fn find_organization(&self, id: Uuid) -> StoreResult<Option<Organization>> {
        Ok(self.state.lock().await.organizations.get(&id).cloned())
    }

    async fn list_organization_members(
        &self,
        organization_id: Uuid,
    ) -> StoreResult<Vec<OrganizationUser>> {
        let state = self.state.lock().await;
        let mut members: Vec<OrganizationUser> = state
            .organization_users
            .iter()
            .filter(|m| m.organization_id == organization_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| {
            let rank = match m.role {
                OrganizationRole::Owner => 0,
                OrganizationRole::Admin => 1,
                OrganizationRole::Member => 2,
            };
            (rank, m.created_at)
        });
        Ok(members)
    }

    async fn upsert_user(&self, id: Uuid, email: &str) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.id != id && u.email == email) {
            return Err(StoreError::Constraint(format!("user {email} already exists")));
        }

        if let Some(user) = state.users.get_mut(&id) {
            user.email = email.to_string();
            return Ok(user.clone());
        }

        let user = User {
            id,
            email: email.to_string(),
            username: None,
            created_at: state.next_timestamp(),
        };
        state.users.insert(id, user.clone());
        Ok(user)
    }

    async fn create_license(&self, data: NewLicenseKey) -> StoreResult<LicenseKey> {
        let mut state = self.state.lock().await;
        if state.licenses.values().any(|l| l.key == data.key) {
            return Err(StoreError::Constraint("license key already exists".to_string()));
        }

        let now = state.next_timestamp();
        let license = LicenseKey {
            id: Uuid::new_v4(),
            key: data.key,
            is_active: true,
            vendor: data.vendor,
            tier: data.tier,
            external_product_id: data.external_product_id,
            organization_id: None,
            converted_to_team: false,
            activated_at: Some(now),
            deactivated_at: None,
            created_at: now,
            updated_at: now,
        };
        state.licenses.insert(license.id, license.clone());
        Ok(license)
    }

    async fn grant_license(&self, user_id: Uuid, license_id: Uuid) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&user_id) || !state.licenses.contains_key(&license_id) {
            return Err(StoreError::Constraint(format!(
                "cannot grant license {license_id} to user {user_id}"
            )));
        }
        state.ownership.insert((user_id, license_id));
        Ok(())
    }

    async fn deactivate_license(&self, id: Uuid) -> StoreResult<Option<LicenseKey>> {
        let mut state = self.state.lock().await;
        let now = state.next_timestamp();
        Ok(state.licenses.get_mut(&id).map(|license| {
            license.is_active = false;
            license.deactivated_at = Some(now);
            license.updated_at = now;
            license.clone()
        }))
    }

    async fn set_sub_license_status(
        &self,
        id: Uuid,
        status: SubLicenseStatus,
    ) -> StoreResult<Option<SubLicense>> {
        let mut state = self.state.lock().await;
        let now = state.next_timestamp();
        Ok(state.sub_licenses.get_mut(&id).map(|sub| {
            sub.status = status;
            sub.updated_at = now;
            sub.clone()
        }))
    }

    async fn set_sub_license_assignee(
        &self,
        id: Uuid,
        email: Option<&str>,
        user_id: Option<Uuid>,
    ) -> StoreResult<Option<SubLicense>> {
        let mut state = self.state.lock().await;
        let Some(main_license_id) = state.sub_licenses.get(&id).map(|s| s.main_license_key_id) else {
            return Ok(None);
        };
        if let Some(email) = email {
            if state.sub_license_email_taken(id, main_license_id, email) {
                return Err(StoreError::Constraint(format!(
                    "{email} already holds a sub-license of {main_license_id}"
                )));
            }
        }

        let now = state.next_timestamp();
        Ok(state.sub_licenses.get_mut(&id).map(|sub| {
            sub.assigned_email = email.map(str::to_string);
            sub.assigned_user_id = user_id;
            sub.updated_at = now;
            sub.clone()
        }))
    }

    async fn begin_consolidation(&self) -> StoreResult<Box<dyn ConsolidationTransaction>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryConsolidationTransaction { guard, staged }))
    }
}

/// Consolidation holding the store lock and a staged copy of the state
pub struct MemoryConsolidationTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

impl private::Sealed for MemoryConsolidationTransaction {}

#[async_trait]
impl ConsolidationTransaction for MemoryConsolidationTransaction {
    async fn lock_candidates(&mut self, owner_id: Uuid, ids: &[Uuid]) -> StoreResult<Vec<LicenseKey>> {
        let mut locked: Vec<LicenseKey> = ids
            .iter()
            .filter(|id| self.staged.ownership.contains(&(owner_id, **id)))
            .filter_map(|id| self.staged.licenses.get(id))
            .filter(|l| l.is_standalone())
            .cloned()
            .collect();
        locked.sort_by_key(|l| l.id);
        locked.dedup_by_key(|l| l.id);
        Ok(locked)
    }

    async fn find_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.staged.users.get(&id).cloned())
    }

    async fn create_organization(
        &mut self,
        _grant: &ConversionGrant,
        name: &str,
        owner_id: Uuid,
    ) -> StoreResult<Organization> {
        if self.staged.organizations.values().any(|o| o.name == name) {
            return Err(StoreError::Constraint(format!("organization {name} already exists")));
        }
        if !self.staged.users.contains_key(&owner_id) {
            return Err(StoreError::Constraint(format!("user {owner_id} does not exist")));
        }

        let now = self.staged.next_timestamp();
        let organization = Organization {
            id: Uuid::new_v4(),
            name: name.to_string(),
            premium: true,
            main_license_key_id: None,
            created_at: now,
            updated_at: now,
        };
        self.staged.organizations.insert(organization.id, organization.clone());
        self.staged.organization_users.push(OrganizationUser {
            organization_id: organization.id,
            user_id: owner_id,
            role: OrganizationRole::Owner,
            created_at: now,
        });
        Ok(organization)
    }

    async fn promote_main_license(
        &mut self,
        _grant: &ConversionGrant,
        license_id: Uuid,
        team_tier: i32,
        vendor: &str,
        organization_id: Uuid,
    ) -> StoreResult<LicenseKey> {
        let now = self.staged.next_timestamp();
        let license = self.staged.license_mut(license_id)?;
        if !license.is_active || license.converted_to_team {
            return Err(StoreError::Conflict(format!(
                "license {license_id} changed before promotion"
            )));
        }

        license.tier = team_tier;
        license.vendor = Some(vendor.to_string());
        license.organization_id = Some(organization_id);
        license.converted_to_team = true;
        license.updated_at = now;
        Ok(license.clone())
    }

    async fn insert_sub_license(
        &mut self,
        _grant: &ConversionGrant,
        data: NewSubLicense,
    ) -> StoreResult<SubLicense> {
        if self.staged.sub_licenses.values().any(|s| s.key == data.key) {
            return Err(StoreError::Constraint("sub-license key already exists".to_string()));
        }
        if !self.staged.licenses.contains_key(&data.main_license_key_id) {
            return Err(StoreError::Constraint(format!(
                "main license {} does not exist",
                data.main_license_key_id
            )));
        }

        let now = self.staged.next_timestamp();
        let sub = SubLicense {
            id: Uuid::new_v4(),
            key: data.key,
            status: SubLicenseStatus::Active,
            main_license_key_id: data.main_license_key_id,
            vendor: data.vendor,
            assigned_user_id: None,
            assigned_email: None,
            converted_to_team: true,
            created_at: now,
            updated_at: now,
        };
        self.staged.sub_licenses.insert(sub.id, sub.clone());
        Ok(sub)
    }

    async fn deactivate_demoted(
        &mut self,
        _grant: &ConversionGrant,
        license_id: Uuid,
    ) -> StoreResult<LicenseKey> {
        let now = self.staged.next_timestamp();
        let license = self.staged.license_mut(license_id)?;
        license.is_active = false;
        license.deactivated_at = Some(now);
        license.updated_at = now;
        Ok(license.clone())
    }

    async fn set_organization_main_license(
        &mut self,
        _grant: &ConversionGrant,
        organization_id: Uuid,
        main_license_id: Uuid,
    ) -> StoreResult<Organization> {
        let now = self.staged.next_timestamp();
        let organization = self
            .staged
            .organizations
            .get_mut(&organization_id)
            .ok_or_else(|| StoreError::Conflict(format!("organization {organization_id} disappeared")))?;
        organization.main_license_key_id = Some(main_license_id);
        organization.updated_at = now;
        Ok(organization.clone())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryConsolidationTransaction { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_license(key: &str) -> NewLicenseKey {
        NewLicenseKey {
            key: key.to_string(),
            vendor: None,
            tier: 1,
            external_product_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_license_rejects_duplicate_key() {
        let store = InMemoryLicenseStore::new();
        store.create_license(new_license("DUP")).await.unwrap();

        let err = store.create_license(new_license("DUP")).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_creation_timestamps_are_strictly_increasing() {
        let store = InMemoryLicenseStore::new();
        let a = store.create_license(new_license("A")).await.unwrap();
        let b = store.create_license(new_license("B")).await.unwrap();
        assert!(a.created_at < b.created_at);
    }

    #[tokio::test]
    async fn test_owned_licenses_are_listed_oldest_first() {
        let store = InMemoryLicenseStore::new();
        let user = store.add_user("owner@example.com", None).await.unwrap();
        let a = store.create_license(new_license("A")).await.unwrap();
        let b = store.create_license(new_license("B")).await.unwrap();
        store.grant_license(user.id, b.id).await.unwrap();
        store.grant_license(user.id, a.id).await.unwrap();

        let owned = store.list_owned_licenses(user.id).await.unwrap();
        let keys: Vec<&str> = owned.iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_upsert_user_keeps_id_and_refreshes_email() {
        let store = InMemoryLicenseStore::new();
        let id = Uuid::new_v4();

        let created = store.upsert_user(id, "old@example.com").await.unwrap();
        assert_eq!(created.id, id);

        let updated = store.upsert_user(id, "new@example.com").await.unwrap();
        assert_eq!(updated.id, id);
        assert_eq!(updated.created_at, created.created_at);
        assert!(store.find_user_by_email("old@example.com").await.unwrap().is_none());

        let other = store.add_user("taken@example.com", None).await.unwrap();
        let err = store.upsert_user(id, &other.email).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_dropped_transaction_leaves_state_untouched() {
        let store = InMemoryLicenseStore::new();
        let user = store.add_user("owner@example.com", None).await.unwrap();
        let a = store.create_license(new_license("A")).await.unwrap();
        store.grant_license(user.id, a.id).await.unwrap();
        let before = store.counts().await;

        {
            let mut tx = store.begin_consolidation().await.unwrap();
            let locked = tx.lock_candidates(user.id, &[a.id]).await.unwrap();
            assert_eq!(locked.len(), 1);
        }

        assert_eq!(store.counts().await, before);
    }

    #[tokio::test]
    async fn test_lock_candidates_skips_unowned_and_inactive() {
        let store = InMemoryLicenseStore::new();
        let user = store.add_user("owner@example.com", None).await.unwrap();
        let owned = store.create_license(new_license("OWNED")).await.unwrap();
        let inactive = store.create_license(new_license("INACTIVE")).await.unwrap();
        let foreign = store.create_license(new_license("FOREIGN")).await.unwrap();
        store.grant_license(user.id, owned.id).await.unwrap();
        store.grant_license(user.id, inactive.id).await.unwrap();
        store.deactivate_license(inactive.id).await.unwrap();

        let mut tx = store.begin_consolidation().await.unwrap();
        let locked = tx
            .lock_candidates(user.id, &[owned.id, inactive.id, foreign.id])
            .await
            .unwrap();

        assert_eq!(locked.len(), 1);
        assert_eq!(locked[0].id, owned.id);
    }
}
