/// License key validation
///
/// A license key may have been issued by us or by one of two resellers. Each
/// source of truth is wrapped in a [`VendorValidator`]; the
/// [`LicenseValidationOrchestrator`] asks them in a fixed order and returns the
/// first success.
///
/// # Validator contract
///
/// Validators never fail past their boundary. Network errors, timeouts,
/// malformed responses and unknown keys all come back as
/// `ValidationResult { is_valid: false, error: Some(reason) }`, because the
/// orchestrator only looks at `is_valid`.
///
/// ```text
/// validate(key)
///   ├─> LocalValidator          (store lookup, resolves sub-licenses)
///   ├─> LemonSqueezyValidator   (POST form, then store/product/usage rules)
///   └─> AppSumoValidator        (GET by key, status must be "active")
/// ```
///
/// # Example
///
/// ```no_run
/// use licensehub_shared::validation::{ValidationResult, VendorValidator};
/// use async_trait::async_trait;
///
/// struct AlwaysInvalid;
///
/// #[async_trait]
/// impl VendorValidator for AlwaysInvalid {
///     fn vendor(&self) -> &str {
///         "none"
///     }
///
///     async fn validate(&self, _key: &str) -> ValidationResult {
///         ValidationResult::invalid("not ours")
///     }
/// }
/// ```

pub mod appsumo;
mod http;
pub mod lemonsqueezy;
mod local;
mod orchestrator;

pub use appsumo::{AppSumoConfig, AppSumoValidator};
pub use http::create_vendor_client;
pub use lemonsqueezy::{LemonSqueezyConfig, LemonSqueezyValidator};
pub use local::LocalValidator;
pub use orchestrator::LicenseValidationOrchestrator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Outcome of validating one key against one or more vendors
///
/// Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,

    /// Vendor label of the source that accepted the key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    /// Reason the key was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Vendor product the key was sold for, when the vendor reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,
}

impl ValidationResult {
    pub fn valid(vendor: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            vendor: Some(vendor.into()),
            error: None,
            product_id: None,
        }
    }

    /// Attaches the vendor's product id to a successful result
    pub fn with_product_id(mut self, product_id: Option<i64>) -> Self {
        self.product_id = product_id;
        self
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            vendor: None,
            error: Some(error.into()),
            product_id: None,
        }
    }
}

/// One source of truth for license keys
#[async_trait]
pub trait VendorValidator: Send + Sync {
    /// Label reported in logs
    fn vendor(&self) -> &str;

    /// Checks a raw key; must not panic and must not return early with an error
    async fn validate(&self, key: &str) -> ValidationResult;
}

/// Short, stable, non-reversible identifier for a license key in logs
///
/// Raw keys are credentials and are never logged.
pub fn key_fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..6])
}
