/// LemonSqueezy subscription-key validator
///
/// LemonSqueezy's answer is necessary but not sufficient: a key it reports as
/// valid is accepted only if it belongs to our store, to an allow-listed
/// product, and has activation usage below the configured ceiling.

use super::http::is_json;
use super::{key_fingerprint, ValidationResult, VendorValidator};
use crate::models::license_key::LicenseVendor;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use tracing::{debug, instrument, warn};

/// Default validation endpoint
pub const DEFAULT_VALIDATE_URL: &str = "https://api.lemonsqueezy.com/v1/licenses/validate";

/// Default activation-usage ceiling (exclusive)
pub const DEFAULT_MAX_ACTIVATION_USAGE: u32 = 5;

/// Business rules applied on top of LemonSqueezy's answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LemonSqueezyConfig {
    /// Validation endpoint
    pub validate_url: String,

    /// Store the key must belong to
    pub store_id: String,

    /// Products whose keys are accepted
    pub product_ids: Vec<String>,

    /// Keys with this many activations or more are rejected
    pub max_activation_usage: u32,
}

impl LemonSqueezyConfig {
    /// Config for a store and product allow-list, with default endpoint and ceiling
    pub fn new(store_id: impl Into<String>, product_ids: Vec<String>) -> Self {
        Self {
            validate_url: DEFAULT_VALIDATE_URL.to_string(),
            store_id: store_id.into(),
            product_ids,
            max_activation_usage: DEFAULT_MAX_ACTIVATION_USAGE,
        }
    }
}

/// Identifiers arrive as JSON numbers, but tolerate strings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum RemoteId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteId::Number(n) => write!(f, "{n}"),
            RemoteId::Text(s) => f.write_str(s.trim()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    valid: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    meta: Option<ResponseMeta>,
    #[serde(default)]
    license_key: Option<ResponseLicenseKey>,
}

#[derive(Debug, Deserialize)]
struct ResponseMeta {
    store_id: RemoteId,
    product_id: RemoteId,
    #[serde(default)]
    activation_usage: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ResponseLicenseKey {
    #[serde(default)]
    activation_usage: Option<u32>,
}

/// What LemonSqueezy said, reduced to the fields the rules need
#[derive(Debug, Clone, PartialEq, Eq)]
enum RemoteVerdict {
    Rejected {
        reason: String,
    },
    Accepted {
        store_id: String,
        product_id: String,
        activation_usage: Option<u32>,
    },
}

impl From<ValidateResponse> for RemoteVerdict {
    fn from(response: ValidateResponse) -> Self {
        if !response.valid {
            return RemoteVerdict::Rejected {
                reason: response
                    .error
                    .unwrap_or_else(|| "LemonSqueezy reported the key as invalid".to_string()),
            };
        }

        let Some(meta) = response.meta else {
            return RemoteVerdict::Rejected {
                reason: "LemonSqueezy response is missing license metadata".to_string(),
            };
        };

        let activation_usage = response
            .license_key
            .and_then(|lk| lk.activation_usage)
            .or(meta.activation_usage);

        RemoteVerdict::Accepted {
            store_id: meta.store_id.to_string(),
            product_id: meta.product_id.to_string(),
            activation_usage,
        }
    }
}

impl LemonSqueezyConfig {
    fn judge(&self, verdict: RemoteVerdict) -> ValidationResult {
        let (store_id, product_id, activation_usage) = match verdict {
            RemoteVerdict::Rejected { reason } => return ValidationResult::invalid(reason),
            RemoteVerdict::Accepted {
                store_id,
                product_id,
                activation_usage,
            } => (store_id, product_id, activation_usage),
        };

        if store_id != self.store_id {
            return ValidationResult::invalid("License belongs to a different store");
        }
        if !self.product_ids.iter().any(|p| p.trim() == product_id) {
            return ValidationResult::invalid("License is for a product that is not accepted");
        }
        match activation_usage {
            None => ValidationResult::invalid("LemonSqueezy did not report activation usage"),
            Some(usage) if usage >= self.max_activation_usage => {
                ValidationResult::invalid("License activation limit reached")
            }
            Some(_) => ValidationResult::valid(LicenseVendor::LemonSqueezy.as_str())
                .with_product_id(product_id.parse().ok()),
        }
    }
}

/// Validator for keys sold through LemonSqueezy
pub struct LemonSqueezyValidator {
    client: Client,
    config: LemonSqueezyConfig,
}

impl LemonSqueezyValidator {
    pub fn new(client: Client, config: LemonSqueezyConfig) -> Self {
        Self { client, config }
    }

    async fn fetch(&self, key: &str) -> Result<ValidateResponse, String> {
        let response = self
            .client
            .post(&self.config.validate_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("license_key", key)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    "LemonSqueezy validation timed out".to_string()
                } else {
                    format!("LemonSqueezy request failed: {e}")
                }
            })?;

        // Rejections come back as 4xx with a JSON body, so status alone is not decisive
        let status = response.status();
        if !is_json(&response) {
            return Err(format!("Unexpected response format from LemonSqueezy (HTTP {status})"));
        }
        if status.is_server_error() {
            return Err(format!("LemonSqueezy returned HTTP {status}"));
        }

        response
            .json::<ValidateResponse>()
            .await
            .map_err(|e| format!("Malformed LemonSqueezy response: {e}"))
    }
}

#[async_trait]
impl VendorValidator for LemonSqueezyValidator {
    fn vendor(&self) -> &str {
        LicenseVendor::LemonSqueezy.as_str()
    }

    #[instrument(skip(self, key), fields(key = %key_fingerprint(key)))]
    async fn validate(&self, key: &str) -> ValidationResult {
        match self.fetch(key).await {
            Ok(response) => {
                let result = self.config.judge(RemoteVerdict::from(response));
                debug!(is_valid = result.is_valid, error = ?result.error, "LemonSqueezy validation finished");
                result
            }
            Err(reason) => {
                warn!(%reason, "LemonSqueezy validation failed");
                ValidationResult::invalid(reason)
            }
        }
    }
}
