/// License redemption
///
/// Validation only answers "is this key good". Redemption is what happens
/// next: the caller's identity is mirrored into `users`, a key accepted by a
/// reseller gets its `license_keys` row on first sight, and the caller is
/// recorded as an owner of the license so it shows up in their pool.
///
/// ```text
/// redeem(key, user)
///   ├─> LicenseValidationOrchestrator::validate   (no side effects)
///   ├─> upsert user from token identity
///   ├─> find or create the license row            (remote vendors only)
///   └─> grant ownership                           (standalone licenses only)
/// ```
///
/// Sub-license keys are never granted: a seat is held through its assignment.
/// Licenses already merged into a team are left alone as well, so presenting
/// a demoted key cannot make its holder an owner of the team.

use crate::models::license_key::{LicenseKey, NewLicenseKey};
use crate::models::user::User;
use crate::store::{LicenseStore, StoreError, StoreResult};
use crate::validation::{key_fingerprint, LicenseValidationOrchestrator, ValidationResult};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Authenticated caller redeeming a key
#[derive(Debug, Clone, Copy)]
pub struct Redeemer<'a> {
    pub user_id: Uuid,

    /// Email from the token, if the issuer included one
    pub email: Option<&'a str>,
}

/// Validates keys and links the accepted ones to their holder
#[derive(Clone)]
pub struct LicenseRegistry {
    store: Arc<dyn LicenseStore>,
    validation: Arc<LicenseValidationOrchestrator>,
    base_tier: i32,
}

impl LicenseRegistry {
    /// `base_tier` is the tier given to licenses first seen through a reseller
    pub fn new(
        store: Arc<dyn LicenseStore>,
        validation: Arc<LicenseValidationOrchestrator>,
        base_tier: i32,
    ) -> Self {
        Self {
            store,
            validation,
            base_tier,
        }
    }

    /// Validates `key` and, when it is accepted, records the caller as its owner
    ///
    /// A rejected key writes nothing. The returned result is the
    /// orchestrator's, unchanged.
    ///
    /// # Errors
    ///
    /// Returns a store error if the accepted key could not be recorded. The
    /// validation itself never fails.
    #[instrument(skip(self, key, redeemer), fields(key = %key_fingerprint(key), user_id = %redeemer.user_id))]
    pub async fn redeem(&self, key: &str, redeemer: Redeemer<'_>) -> StoreResult<ValidationResult> {
        let result = self.validation.validate(key, redeemer.user_id).await;
        if !result.is_valid {
            return Ok(result);
        }

        let Some(user) = self.ensure_user(redeemer).await? else {
            warn!("Token carries no email and the user is unknown; ownership not recorded");
            return Ok(result);
        };

        match self.license_for(key, &result).await? {
            Some(license) if license.is_standalone() => {
                self.store.grant_license(user.id, license.id).await?;
                info!(license_id = %license.id, vendor = ?license.vendor, "License redeemed");
            }
            Some(license) => {
                debug!(license_id = %license.id, "License belongs to a team; ownership unchanged");
            }
            None => debug!("Key is a sub-license; held through its assignment"),
        }

        Ok(result)
    }

    /// The user row for the caller, created from the token when missing
    async fn ensure_user(&self, redeemer: Redeemer<'_>) -> StoreResult<Option<User>> {
        match redeemer.email.map(str::trim).filter(|e| !e.is_empty()) {
            Some(email) => self
                .store
                .upsert_user(redeemer.user_id, &email.to_lowercase())
                .await
                .map(Some),
            None => self.store.find_user(redeemer.user_id).await,
        }
    }

    /// The license row behind an accepted key, if it is a primary license
    async fn license_for(&self, key: &str, result: &ValidationResult) -> StoreResult<Option<LicenseKey>> {
        if let Some(license) = self.store.find_license_by_key(key).await? {
            return Ok(Some(license));
        }
        if self.store.find_sub_license_by_key(key).await?.is_some() {
            return Ok(None);
        }

        let created = self
            .store
            .create_license(NewLicenseKey {
                key: key.to_string(),
                vendor: result.vendor.clone(),
                tier: self.base_tier,
                external_product_id: result.product_id,
            })
            .await;

        match created {
            Ok(license) => {
                info!(license_id = %license.id, vendor = ?license.vendor, "Recorded reseller license");
                Ok(Some(license))
            }
            // A concurrent redemption of the same key won the insert
            Err(StoreError::Constraint(_)) => self.store.find_license_by_key(key).await,
            Err(e) => Err(e),
        }
    }
}
