/// Shared HTTP client for vendor validators

use reqwest::Client;
use std::time::Duration;

/// Builds the client used for every outbound vendor call
///
/// `timeout` bounds the whole request. A timed-out call is reported by the
/// validator as an ordinary failure so the orchestrator moves on.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn create_vendor_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .pool_max_idle_per_host(10)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(3)))
        .user_agent(concat!("licensehub/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Whether a response declares a JSON body
pub(super) fn is_json(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_vendor_client() {
        assert!(create_vendor_client(Duration::from_secs(5)).is_ok());
    }
}
