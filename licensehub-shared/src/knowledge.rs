/// Resolution of the license record that owns per-license data
///
/// Custom knowledge and settings are stored against a license id. Holders of
/// a sub-license share the main license's record: a sub-license key resolves
/// to the main license's id, paired with the sub-license's own key.

use crate::store::{LicenseStore, StoreError};
use crate::validation::key_fingerprint;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Record that per-license data is keyed by
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnowledgeOwner {
    /// Owning license id (the main license for sub-license keys)
    pub id: Uuid,

    /// The key that was resolved (the sub-license's own key for sub-license keys)
    pub key: String,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("license key not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Maps a license or sub-license key to its [`KnowledgeOwner`]
#[derive(Clone)]
pub struct CustomKnowledgeResolver {
    store: Arc<dyn LicenseStore>,
}

impl CustomKnowledgeResolver {
    pub fn new(store: Arc<dyn LicenseStore>) -> Self {
        Self { store }
    }

    /// Resolves `key`
    ///
    /// Lookup order:
    /// 1. an active license with this key resolves to itself
    /// 2. an ACTIVE sub-license resolves to `(main license id, sub-license key)`
    /// 3. an inactive license with no active sub-license still resolves to itself
    ///
    /// Step 3 comes last so that a key demoted by consolidation (inactive
    /// license row plus sub-license) follows its sub-license.
    pub async fn resolve(&self, key: &str) -> Result<KnowledgeOwner, ResolveError> {
        let primary = self.store.find_license_by_key(key).await?;

        if let Some(license) = primary.as_ref().filter(|l| l.is_active) {
            return Ok(KnowledgeOwner {
                id: license.id,
                key: license.key.clone(),
            });
        }

        if let Some(sub) = self
            .store
            .find_sub_license_by_key(key)
            .await?
            .filter(|s| s.is_active())
        {
            debug!(
                key = %key_fingerprint(key),
                main_license_id = %sub.main_license_key_id,
                "Resolved sub-license to main license"
            );
            return Ok(KnowledgeOwner {
                id: sub.main_license_key_id,
                key: sub.key,
            });
        }

        primary
            .map(|license| KnowledgeOwner {
                id: license.id,
                key: license.key,
            })
            .ok_or(ResolveError::NotFound)
    }
}
