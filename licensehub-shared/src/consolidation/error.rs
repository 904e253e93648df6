/// Consolidation failures

use crate::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Why a consolidation (or a preview of one) was refused
///
/// Every variant except [`ConsolidationError::Store`] is a business-rule
/// failure the user can fix by changing the selection. None of them leave
/// any state behind.
#[derive(Debug, Error)]
pub enum ConsolidationError {
    /// Fewer distinct licenses than the policy minimum
    #[error("at least {required} licenses are required to create a team, got {provided}")]
    TooFewLicenses { required: usize, provided: usize },

    /// Some selected licenses are missing, not owned, inactive, or already in a team
    #[error("only {found} of the {requested} selected licenses can be consolidated")]
    InvalidLicenseSelection { requested: usize, found: usize },

    /// Selected licenses come from different vendors
    #[error("selected licenses come from different vendors: {}", .vendors.join(", "))]
    VendorMismatch { vendors: Vec<String> },

    /// Some selected licenses are neither base tier nor the combinable product
    #[error("{} selected license(s) cannot be combined into a team", .license_ids.len())]
    NotCombinable { license_ids: Vec<Uuid> },

    /// Persistence failure; nothing was written
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ConsolidationError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ConsolidationError::TooFewLicenses { .. } => "too_few_licenses",
            ConsolidationError::InvalidLicenseSelection { .. } => "invalid_license_selection",
            ConsolidationError::VendorMismatch { .. } => "vendor_mismatch",
            ConsolidationError::NotCombinable { .. } => "not_combinable",
            ConsolidationError::Store(_) => "store_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ConsolidationError::Store(e) if e.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_mismatch_message_lists_vendors() {
        let err = ConsolidationError::VendorMismatch {
            vendors: vec!["appsumo".to_string(), "local".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "selected licenses come from different vendors: appsumo, local"
        );
        assert_eq!(err.code(), "vendor_mismatch");
    }

    #[test]
    fn test_only_store_conflicts_are_retryable() {
        assert!(ConsolidationError::Store(StoreError::Conflict("x".into())).is_retryable());
        assert!(!ConsolidationError::InvalidLicenseSelection { requested: 2, found: 1 }.is_retryable());
    }
}
