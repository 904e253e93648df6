/// Vendor validators against a local mock of both vendor APIs
///
/// The mock runs on an ephemeral port; the response is chosen by the key.

use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use licensehub_shared::validation::{
    create_vendor_client, AppSumoConfig, AppSumoValidator, LemonSqueezyConfig,
    LemonSqueezyValidator, VendorValidator,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;

const STORE_ID: &str = "12345";
const PRODUCT_ID: &str = "777";
const APPSUMO_API_KEY: &str = "partner-key";

#[derive(Deserialize)]
struct ValidateForm {
    license_key: String,
}

async fn lemonsqueezy_validate(Form(form): Form<ValidateForm>) -> Response {
    let accepted = |store: serde_json::Value, usage: u32| {
        Json(json!({
            "valid": true,
            "error": null,
            "license_key": { "status": "active", "activation_usage": usage },
            "meta": { "store_id": store, "product_id": 777, "activation_usage": usage }
        }))
        .into_response()
    };

    match form.license_key.as_str() {
        "LS-VALID" => accepted(json!(12345), 1),
        "LS-OTHER-STORE" => accepted(json!(999), 1),
        "LS-MAXED" => accepted(json!("12345"), 5),
        "LS-HTML" => Html("<html>maintenance</html>").into_response(),
        "LS-SLOW" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            accepted(json!(12345), 1)
        }
        "LS-DOWN" => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": "upstream unavailable" })),
        )
            .into_response(),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({ "valid": false, "error": "license_key not found." })),
        )
            .into_response(),
    }
}

async fn appsumo_license(Path(key): Path<String>, headers: HeaderMap) -> Response {
    let authorized = headers
        .get("x-appsumo-licensing-key")
        .and_then(|v| v.to_str().ok())
        == Some(APPSUMO_API_KEY);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad key" }))).into_response();
    }

    match key.as_str() {
        "AS-ACTIVE" => Json(json!({ "license_key": key, "status": "active" })).into_response(),
        "AS-INACTIVE" => Json(json!({ "license_key": key, "status": "inactive" })).into_response(),
        "AS-REFUNDED" => Json(json!({ "license_key": key, "status": "refunded" })).into_response(),
        "AS-BROKEN" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        "AS-HTML" => Html("<html>login</html>").into_response(),
        _ => (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." }))).into_response(),
    }
}

async fn spawn_vendor_mock() -> SocketAddr {
    let app = Router::new()
        .route("/v1/licenses/validate", post(lemonsqueezy_validate))
        .route("/v2/licenses/:key", get(appsumo_license));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock listener");
    let addr = listener.local_addr().expect("Failed to read mock address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Mock server failed");
    });
    addr
}

fn lemonsqueezy(addr: SocketAddr, timeout: Duration) -> LemonSqueezyValidator {
    let mut config = LemonSqueezyConfig::new(STORE_ID, vec![PRODUCT_ID.to_string()]);
    config.validate_url = format!("http://{addr}/v1/licenses/validate");
    LemonSqueezyValidator::new(create_vendor_client(timeout).unwrap(), config)
}

fn appsumo(addr: SocketAddr, api_key: &str) -> AppSumoValidator {
    let mut config = AppSumoConfig::new(api_key);
    config.api_url = format!("http://{addr}/v2/");
    AppSumoValidator::new(create_vendor_client(Duration::from_secs(5)).unwrap(), config)
}

#[tokio::test]
async fn test_lemonsqueezy_accepts_valid_key() {
    let addr = spawn_vendor_mock().await;
    let result = lemonsqueezy(addr, Duration::from_secs(5)).validate("LS-VALID").await;

    assert!(result.is_valid, "{:?}", result.error);
    assert_eq!(result.vendor.as_deref(), Some("lemonsqueezy"));
    assert_eq!(result.product_id, Some(777));
}

#[tokio::test]
async fn test_lemonsqueezy_passes_remote_rejection_through() {
    let addr = spawn_vendor_mock().await;
    let result = lemonsqueezy(addr, Duration::from_secs(5)).validate("LS-UNKNOWN").await;

    assert!(!result.is_valid);
    assert_eq!(result.error.as_deref(), Some("license_key not found."));
}

#[tokio::test]
async fn test_lemonsqueezy_enforces_store_and_usage() {
    let addr = spawn_vendor_mock().await;
    let validator = lemonsqueezy(addr, Duration::from_secs(5));

    let other_store = validator.validate("LS-OTHER-STORE").await;
    assert_eq!(
        other_store.error.as_deref(),
        Some("License belongs to a different store")
    );

    let maxed = validator.validate("LS-MAXED").await;
    assert_eq!(maxed.error.as_deref(), Some("License activation limit reached"));
}

#[tokio::test]
async fn test_lemonsqueezy_non_json_and_server_errors_are_invalid() {
    let addr = spawn_vendor_mock().await;
    let validator = lemonsqueezy(addr, Duration::from_secs(5));

    let html = validator.validate("LS-HTML").await;
    assert!(!html.is_valid);
    assert!(html
        .error
        .as_deref()
        .unwrap()
        .starts_with("Unexpected response format from LemonSqueezy"));

    let down = validator.validate("LS-DOWN").await;
    assert!(!down.is_valid);
    assert!(down.error.as_deref().unwrap().contains("502"));
}

#[tokio::test]
async fn test_lemonsqueezy_timeout_is_invalid() {
    let addr = spawn_vendor_mock().await;
    let result = lemonsqueezy(addr, Duration::from_millis(200))
        .validate("LS-SLOW")
        .await;

    assert!(!result.is_valid);
    assert_eq!(result.error.as_deref(), Some("LemonSqueezy validation timed out"));
}

#[tokio::test]
async fn test_appsumo_statuses() {
    let addr = spawn_vendor_mock().await;
    let validator = appsumo(addr, APPSUMO_API_KEY);

    let active = validator.validate("AS-ACTIVE").await;
    assert!(active.is_valid, "{:?}", active.error);
    assert_eq!(active.vendor.as_deref(), Some("appsumo"));

    for key in ["AS-INACTIVE", "AS-REFUNDED"] {
        let result = validator.validate(key).await;
        assert_eq!(
            result.error.as_deref(),
            Some("Invalid or inactive AppSumo license"),
            "{key}"
        );
    }
}

#[tokio::test]
async fn test_appsumo_error_responses() {
    let addr = spawn_vendor_mock().await;
    let validator = appsumo(addr, APPSUMO_API_KEY);

    let missing = validator.validate("AS-MISSING").await;
    assert_eq!(missing.error.as_deref(), Some("AppSumo license not found"));

    let broken = validator.validate("AS-BROKEN").await;
    assert_eq!(broken.error.as_deref(), Some("Error validating AppSumo license"));

    let html = validator.validate("AS-HTML").await;
    assert_eq!(
        html.error.as_deref(),
        Some("Unexpected response format from AppSumo API")
    );
}

#[tokio::test]
async fn test_appsumo_sends_partner_key() {
    let addr = spawn_vendor_mock().await;
    let result = appsumo(addr, "wrong-key").validate("AS-ACTIVE").await;

    assert!(!result.is_valid);
    assert_eq!(result.error.as_deref(), Some("Error validating AppSumo license"));
}
