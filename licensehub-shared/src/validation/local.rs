/// Validator for keys stored in our own database

use super::{key_fingerprint, ValidationResult, VendorValidator};
use crate::models::license_key::{LicenseKey, LicenseVendor};
use crate::models::sub_license::SubLicense;
use crate::store::{LicenseStore, StoreResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Looks a key up as a primary license, then as a sub-license
///
/// An active primary license wins outright. Otherwise a sub-license with the
/// same key is resolved through to its main license and is valid only when
/// the main license is active and the sub-license itself is ACTIVE. A key
/// demoted by consolidation has both an inactive primary row and a
/// sub-license; the sub-license decides.
pub struct LocalValidator {
    store: Arc<dyn LicenseStore>,
}

impl LocalValidator {
    pub fn new(store: Arc<dyn LicenseStore>) -> Self {
        Self { store }
    }

    async fn check(&self, key: &str) -> StoreResult<ValidationResult> {
        let primary = self.store.find_license_by_key(key).await?;

        if let Some(license) = primary.as_ref().filter(|l| l.is_active) {
            return Ok(ValidationResult::valid(stored_vendor(license)));
        }

        if let Some(sub) = self.store.find_sub_license_by_key(key).await? {
            return self.check_sub_license(&sub).await;
        }

        Ok(match primary {
            Some(_) => ValidationResult::invalid("Inactive license key"),
            None => ValidationResult::invalid("License key not found in database"),
        })
    }

    async fn check_sub_license(&self, sub: &SubLicense) -> StoreResult<ValidationResult> {
        let Some(main) = self.store.find_license_by_id(sub.main_license_key_id).await? else {
            return Ok(ValidationResult::invalid("Main license not found"));
        };

        if !sub.is_active() {
            return Ok(ValidationResult::invalid("Sub-license is not active"));
        }
        if !main.is_active {
            return Ok(ValidationResult::invalid("Main license is inactive"));
        }

        Ok(ValidationResult::valid(stored_vendor(&main)))
    }
}

/// Stored vendor label, `local` when unset
fn stored_vendor(license: &LicenseKey) -> String {
    match license.vendor.as_deref().map(str::trim) {
        Some(vendor) if !vendor.is_empty() => vendor.to_string(),
        _ => LicenseVendor::Local.as_str().to_string(),
    }
}

#[async_trait]
impl VendorValidator for LocalValidator {
    fn vendor(&self) -> &str {
        LicenseVendor::Local.as_str()
    }

    async fn validate(&self, key: &str) -> ValidationResult {
        match self.check(key).await {
            Ok(result) => {
                debug!(
                    key = %key_fingerprint(key),
                    is_valid = result.is_valid,
                    "Local license lookup finished"
                );
                result
            }
            Err(e) => {
                warn!(key = %key_fingerprint(key), error = %e, "Local license lookup failed");
                ValidationResult::invalid("Error checking database for license")
            }
        }
    }
}
