/// Fixed-order validation across every vendor

use super::{key_fingerprint, ValidationResult, VendorValidator};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Tries local, LemonSqueezy, then AppSumo, stopping at the first success
///
/// The order is fixed and the calls are sequential: the local store is free
/// and authoritative for keys we issued, so remote vendors are only asked
/// when it misses. When every validator rejects the key, the last
/// validator's error is returned.
#[derive(Clone)]
pub struct LicenseValidationOrchestrator {
    validators: [Arc<dyn VendorValidator>; 3],
}

impl LicenseValidationOrchestrator {
    pub fn new(
        local: Arc<dyn VendorValidator>,
        lemonsqueezy: Arc<dyn VendorValidator>,
        appsumo: Arc<dyn VendorValidator>,
    ) -> Self {
        Self {
            validators: [local, lemonsqueezy, appsumo],
        }
    }

    /// Validates `key` on behalf of `requesting_user_id`
    #[instrument(skip(self, key), fields(key = %key_fingerprint(key), user_id = %requesting_user_id))]
    pub async fn validate(&self, key: &str, requesting_user_id: Uuid) -> ValidationResult {
        let mut last = ValidationResult::invalid("Invalid license key");

        for validator in &self.validators {
            let result = validator.validate(key).await;
            if result.is_valid {
                info!(vendor = validator.vendor(), "License key validated");
                return result;
            }

            debug!(
                vendor = validator.vendor(),
                error = ?result.error,
                "Validator rejected license key"
            );
            last = result;
        }

        last
    }
}
