/// Read model over the licenses a user can use

use crate::models::license_key::LicenseKey;
use crate::store::{LicenseStore, StoreResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// One usable license as seen by its holder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolEntry {
    /// License ID, or sub-license ID when `is_sub_license`
    pub id: Uuid,

    pub key: String,

    /// For sub-licenses: the main license is active and the sub-license is ACTIVE
    pub is_active: bool,

    pub vendor: Option<String>,

    /// For sub-licenses, the main license's tier
    pub tier: i32,

    pub is_sub_license: bool,

    /// Main license a sub-license resolves to
    pub main_license_id: Option<Uuid>,

    pub organization_id: Option<Uuid>,

    pub converted_to_team: bool,
}

impl From<LicenseKey> for PoolEntry {
    fn from(license: LicenseKey) -> Self {
        Self {
            id: license.id,
            key: license.key,
            is_active: license.is_active,
            vendor: license.vendor,
            tier: license.tier,
            is_sub_license: false,
            main_license_id: None,
            organization_id: license.organization_id,
            converted_to_team: license.converted_to_team,
        }
    }
}

/// Lists a user's licenses and consolidation candidates
#[derive(Clone)]
pub struct LicensePool {
    store: Arc<dyn LicenseStore>,
}

impl LicensePool {
    pub fn new(store: Arc<dyn LicenseStore>) -> Self {
        Self { store }
    }

    /// Active licenses the user owns, then ACTIVE sub-licenses assigned to them
    ///
    /// Sub-licenses are matched by user ID or by the user's email, since a
    /// seat can be assigned before the holder signs up.
    pub async fn list(&self, user_id: Uuid) -> StoreResult<Vec<PoolEntry>> {
        let mut entries: Vec<PoolEntry> = self
            .store
            .list_owned_licenses(user_id)
            .await?
            .into_iter()
            .filter(|l| l.is_active)
            .map(PoolEntry::from)
            .collect();

        let email = self.store.find_user(user_id).await?.map(|u| u.email);
        let assigned = self
            .store
            .list_assigned_sub_licenses(user_id, email.as_deref())
            .await?;

        for sub in assigned {
            let Some(main) = self.store.find_license_by_id(sub.main_license_key_id).await? else {
                continue;
            };
            entries.push(PoolEntry {
                id: sub.id,
                is_active: main.is_active && sub.is_active(),
                key: sub.key,
                vendor: sub.vendor,
                tier: main.tier,
                is_sub_license: true,
                main_license_id: Some(main.id),
                organization_id: main.organization_id,
                converted_to_team: sub.converted_to_team,
            });
        }

        debug!(%user_id, entries = entries.len(), "Listed license pool");
        Ok(entries)
    }

    /// Licenses the user could select for a consolidation
    ///
    /// Owned, active, and not already part of a team.
    pub async fn consolidation_candidates(&self, user_id: Uuid) -> StoreResult<Vec<LicenseKey>> {
        Ok(self
            .store
            .list_owned_licenses(user_id)
            .await?
            .into_iter()
            .filter(LicenseKey::is_standalone)
            .collect())
    }
}
