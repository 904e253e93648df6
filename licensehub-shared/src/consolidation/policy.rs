/// Rules deciding which licenses may be merged into a team

use crate::models::license_key::{LicenseKey, LicenseVendor};
use serde::{Deserialize, Serialize};

/// Consolidation parameters
///
/// Defaults match the production catalogue: individual licenses are tier 1,
/// teams are tier 7, and product 328561 is a grandfathered line that may be
/// combined regardless of tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationPolicy {
    /// Tier of an individual license
    pub base_tier: i32,

    /// Tier the main license is escalated to
    pub team_tier: i32,

    /// Product whose licenses may be combined at any tier
    pub combinable_product_id: Option<i64>,

    /// Vendor written to a main license that has none
    pub fallback_vendor: String,

    /// Smallest selection accepted (never below 2)
    pub min_licenses: usize,
}

impl Default for ConsolidationPolicy {
    fn default() -> Self {
        Self {
            base_tier: 1,
            team_tier: 7,
            combinable_product_id: Some(328561),
            fallback_vendor: LicenseVendor::Local.as_str().to_string(),
            min_licenses: 2,
        }
    }
}

impl ConsolidationPolicy {
    /// Whether a single license may take part in a consolidation
    pub fn is_combinable(&self, license: &LicenseKey) -> bool {
        license.tier == self.base_tier
            || (self.combinable_product_id.is_some()
                && license.external_product_id == self.combinable_product_id)
    }

    /// Effective minimum selection size
    pub fn required_licenses(&self) -> usize {
        self.min_licenses.max(2)
    }

    /// Vendor label the main license ends up with
    pub fn main_vendor(&self, license: &LicenseKey) -> String {
        match license.vendor.as_deref().map(str::trim) {
            Some(vendor) if !vendor.is_empty() => vendor.to_string(),
            _ => self.fallback_vendor.clone(),
        }
    }
}
