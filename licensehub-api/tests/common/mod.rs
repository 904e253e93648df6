/// Common test utilities for API integration tests
///
/// The router runs over `InMemoryLicenseStore`; remote vendors are replaced
/// by validators with a fixed answer.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use licensehub_api::app::{build_router, AppState};
use licensehub_api::config::Config;
use licensehub_shared::auth::jwt::{create_token, Claims};
use licensehub_shared::models::license_key::{LicenseKey, NewLicenseKey};
use licensehub_shared::models::user::User;
use licensehub_shared::store::{InMemoryLicenseStore, LicenseStore};
use licensehub_shared::validation::{
    LicenseValidationOrchestrator, LocalValidator, ValidationResult, VendorValidator,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "api-test-secret-key-at-least-32-bytes";

/// Remote vendor stand-in that rejects every key
pub struct Unreachable(pub &'static str);

#[async_trait]
impl VendorValidator for Unreachable {
    fn vendor(&self) -> &str {
        self.0
    }

    async fn validate(&self, _key: &str) -> ValidationResult {
        ValidationResult::invalid(format!("{} is unreachable", self.0))
    }
}

/// Remote vendor stand-in that accepts every key
pub struct Accepting(pub &'static str);

#[async_trait]
impl VendorValidator for Accepting {
    fn vendor(&self) -> &str {
        self.0
    }

    async fn validate(&self, _key: &str) -> ValidationResult {
        ValidationResult::valid(self.0)
    }
}

/// Test context containing the router and one signed-in user
pub struct TestContext {
    pub store: Arc<InMemoryLicenseStore>,
    pub app: Router,
    pub user: User,
    pub jwt_token: String,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_remote_vendors(
            Arc::new(Unreachable("lemonsqueezy")),
            Arc::new(Unreachable("appsumo")),
        )
        .await
    }

    /// Context whose remote vendors are `lemonsqueezy` and `appsumo`
    pub async fn with_remote_vendors(
        lemonsqueezy: Arc<dyn VendorValidator>,
        appsumo: Arc<dyn VendorValidator>,
    ) -> Self {
        let vars: HashMap<&str, &str> = [
            ("DATABASE_URL", "postgresql://unused/test"),
            ("JWT_SECRET", JWT_SECRET),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
            .expect("Failed to build test config");

        let store = Arc::new(InMemoryLicenseStore::new());
        let dyn_store: Arc<dyn LicenseStore> = store.clone();
        let validation = LicenseValidationOrchestrator::new(
            Arc::new(LocalValidator::new(dyn_store.clone())),
            lemonsqueezy,
            appsumo,
        );
        let app = build_router(AppState::with_store(dyn_store, validation, config));

        let user = store
            .add_user("owner@example.com", Some("owner"))
            .await
            .expect("Failed to add user");
        let jwt_token = token_for(&user);

        Self {
            store,
            app,
            user,
            jwt_token,
        }
    }

    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.jwt_token)
    }

    /// Creates a license owned by `user`
    pub async fn license_for(&self, user: &User, key: &str, tier: i32, vendor: Option<&str>) -> LicenseKey {
        let license = self
            .store
            .create_license(NewLicenseKey {
                key: key.to_string(),
                vendor: vendor.map(str::to_string),
                tier,
                external_product_id: None,
            })
            .await
            .expect("Failed to create license");
        self.store
            .grant_license(user.id, license.id)
            .await
            .expect("Failed to grant license");
        license
    }

    pub async fn license(&self, key: &str, tier: i32, vendor: Option<&str>) -> LicenseKey {
        self.license_for(&self.user, key, tier, vendor).await
    }

    /// Sends a request as the context user
    pub async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call_as(Some(&self.auth_header()), method, uri, body).await
    }

    /// Sends a request with an explicit (or no) Authorization header
    pub async fn call_as(
        &self,
        authorization: Option<&str>,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(value) = authorization {
            builder = builder.header("authorization", value);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }
}

pub fn token_for(user: &User) -> String {
    create_token(&Claims::new(user.id, Some(user.email.clone())), JWT_SECRET)
        .expect("Failed to sign token")
}
