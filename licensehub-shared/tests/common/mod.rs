/// Shared fixtures for licensehub-shared integration tests
///
/// Everything runs against `InMemoryLicenseStore`; no external services.

use async_trait::async_trait;
use licensehub_shared::consolidation::{ConsolidationPolicy, TeamConsolidationEngine};
use licensehub_shared::models::license_key::{LicenseKey, NewLicenseKey};
use licensehub_shared::models::user::User;
use licensehub_shared::store::{InMemoryLicenseStore, LicenseStore};
use licensehub_shared::validation::{ValidationResult, VendorValidator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// In-memory store with one owner account
pub struct Fixture {
    pub store: Arc<InMemoryLicenseStore>,
    pub owner: User,
}

impl Fixture {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryLicenseStore::new());
        let owner = store
            .add_user("owner@example.com", Some("owner"))
            .await
            .expect("Failed to add owner");
        Self { store, owner }
    }

    /// Creates a license owned by the fixture owner
    pub async fn license(
        &self,
        key: &str,
        tier: i32,
        vendor: Option<&str>,
        product: Option<i64>,
    ) -> LicenseKey {
        self.license_for(&self.owner, key, tier, vendor, product).await
    }

    /// Creates a license owned by `user`
    pub async fn license_for(
        &self,
        user: &User,
        key: &str,
        tier: i32,
        vendor: Option<&str>,
        product: Option<i64>,
    ) -> LicenseKey {
        let license = self
            .store
            .create_license(NewLicenseKey {
                key: key.to_string(),
                vendor: vendor.map(str::to_string),
                tier,
                external_product_id: product,
            })
            .await
            .expect("Failed to create license");
        self.store
            .grant_license(user.id, license.id)
            .await
            .expect("Failed to grant license");
        license
    }

    pub fn dyn_store(&self) -> Arc<dyn LicenseStore> {
        self.store.clone()
    }

    pub fn engine(&self) -> TeamConsolidationEngine {
        TeamConsolidationEngine::new(self.dyn_store(), ConsolidationPolicy::default())
    }
}

/// Validator with a fixed answer that counts its calls
pub struct MockValidator {
    vendor: &'static str,
    accepts: bool,
    product_id: Option<i64>,
    calls: AtomicUsize,
}

impl MockValidator {
    pub fn accepting(vendor: &'static str) -> Arc<Self> {
        Arc::new(Self {
            vendor,
            accepts: true,
            product_id: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// Accepts every key and reports it as sold for `product_id`
    pub fn accepting_product(vendor: &'static str, product_id: i64) -> Arc<Self> {
        Arc::new(Self {
            vendor,
            accepts: true,
            product_id: Some(product_id),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn rejecting(vendor: &'static str) -> Arc<Self> {
        Arc::new(Self {
            vendor,
            accepts: false,
            product_id: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VendorValidator for MockValidator {
    fn vendor(&self) -> &str {
        self.vendor
    }

    async fn validate(&self, _key: &str) -> ValidationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.accepts {
            ValidationResult::valid(self.vendor).with_product_id(self.product_id)
        } else {
            ValidationResult::invalid(format!("{} rejected the key", self.vendor))
        }
    }
}
