/// AppSumo activation-registry validator

use super::http::is_json;
use super::{key_fingerprint, ValidationResult, VendorValidator};
use crate::models::license_key::LicenseVendor;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

/// Default licensing API base URL
pub const DEFAULT_API_URL: &str = "https://api.licensing.appsumo.com/v2";

/// Header carrying the partner API key
const API_KEY_HEADER: &str = "X-AppSumo-Licensing-Key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSumoConfig {
    /// Base URL; keys are looked up at `{api_url}/licenses/{key}`
    pub api_url: String,

    /// Partner API key
    pub api_key: String,
}

impl AppSumoConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.into(),
        }
    }
}

/// License state as reported by AppSumo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RemoteStatus {
    Active,
    Inactive,
    Deactivated,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct LicenseResponse {
    status: RemoteStatus,
}

/// Validator for keys redeemed through AppSumo
pub struct AppSumoValidator {
    client: Client,
    config: AppSumoConfig,
}

impl AppSumoValidator {
    pub fn new(client: Client, config: AppSumoConfig) -> Self {
        Self { client, config }
    }

    /// `{api_url}/licenses/{key}` with the key as one escaped path segment
    fn license_url(&self, key: &str) -> Result<Url, String> {
        let mut url = Url::parse(&self.config.api_url)
            .map_err(|e| format!("Invalid AppSumo API URL: {e}"))?;
        url.path_segments_mut()
            .map_err(|_| "Invalid AppSumo API URL: cannot be a base".to_string())?
            .pop_if_empty()
            .push("licenses")
            .push(key);
        Ok(url)
    }

    async fn check(&self, key: &str) -> ValidationResult {
        let url = match self.license_url(key) {
            Ok(url) => url,
            Err(reason) => return ValidationResult::invalid(reason),
        };

        let response = match self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return ValidationResult::invalid("AppSumo validation timed out")
            }
            Err(e) => {
                warn!(error = %e, "AppSumo request failed");
                return ValidationResult::invalid("Error validating AppSumo license");
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return ValidationResult::invalid("AppSumo license not found");
        }
        if !status.is_success() {
            warn!(%status, "AppSumo API returned an error status");
            return ValidationResult::invalid("Error validating AppSumo license");
        }
        if !is_json(&response) {
            warn!(%status, "AppSumo API returned a non-JSON body");
            return ValidationResult::invalid("Unexpected response format from AppSumo API");
        }

        match response.json::<LicenseResponse>().await {
            Ok(LicenseResponse {
                status: RemoteStatus::Active,
            }) => ValidationResult::valid(LicenseVendor::AppSumo.as_str()),
            Ok(LicenseResponse { status }) => {
                debug!(?status, "AppSumo license is not active");
                ValidationResult::invalid("Invalid or inactive AppSumo license")
            }
            Err(e) => {
                warn!(error = %e, "Malformed AppSumo response");
                ValidationResult::invalid("Unexpected response format from AppSumo API")
            }
        }
    }
}

#[async_trait]
impl VendorValidator for AppSumoValidator {
    fn vendor(&self) -> &str {
        LicenseVendor::AppSumo.as_str()
    }

    #[instrument(skip(self, key), fields(key = %key_fingerprint(key)))]
    async fn validate(&self, key: &str) -> ValidationResult {
        let result = self.check(key).await;
        debug!(is_valid = result.is_valid, "AppSumo validation finished");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn validator(api_url: &str) -> AppSumoValidator {
        let client = crate::validation::create_vendor_client(Duration::from_secs(1)).unwrap();
        AppSumoValidator::new(
            client,
            AppSumoConfig {
                api_url: api_url.to_string(),
                api_key: "secret".to_string(),
            },
        )
    }

    #[test]
    fn test_license_url_escapes_key() {
        let url = validator("https://api.example.com/v2").license_url("AB/CD 12").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v2/licenses/AB%2FCD%2012");
    }

    #[test]
    fn test_license_url_tolerates_trailing_slash() {
        let url = validator("https://api.example.com/v2/").license_url("KEY").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v2/licenses/KEY");
    }

    #[test]
    fn test_unknown_status_deserializes() {
        let parsed: LicenseResponse =
            serde_json::from_value(serde_json::json!({"status": "pending"})).unwrap();
        assert_eq!(parsed.status, RemoteStatus::Unknown);
    }

    #[tokio::test]
    async fn test_invalid_base_url_is_reported_not_raised() {
        let result = validator("not a url").validate("KEY").await;
        assert!(!result.is_valid);
        assert!(result.error.unwrap().starts_with("Invalid AppSumo API URL"));
    }
}
