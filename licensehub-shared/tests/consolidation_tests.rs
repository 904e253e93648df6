/// Integration tests for team consolidation
///
/// Every refusal is checked against the store counts: a failed consolidation
/// must leave nothing behind.

#[allow(dead_code)]
mod common;

use common::Fixture;
use licensehub_shared::consolidation::ConsolidationError;
use licensehub_shared::models::organization::OrganizationRole;
use licensehub_shared::models::sub_license::SubLicenseStatus;
use licensehub_shared::store::LicenseStore;

const COMBINABLE_PRODUCT: i64 = 328561;

#[tokio::test]
async fn test_consolidate_promotes_highest_tier_and_demotes_the_rest() {
    let fixture = Fixture::new().await;
    let basic = fixture.license("KEY-BASIC", 1, Some("lemonsqueezy"), None).await;
    let pro = fixture
        .license("KEY-PRO", 3, Some("lemonsqueezy"), Some(COMBINABLE_PRODUCT))
        .await;

    let result = fixture
        .engine()
        .consolidate(fixture.owner.id, &[basic.id, pro.id])
        .await
        .expect("consolidation should succeed");

    assert_eq!(result.main_license.id, pro.id);
    assert_eq!(result.main_license.tier, 7);
    assert!(result.main_license.converted_to_team);
    assert!(result.main_license.is_active);
    assert_eq!(result.main_license.vendor.as_deref(), Some("lemonsqueezy"));
    assert_eq!(result.main_license.organization_id, Some(result.organization.id));

    assert_eq!(result.sub_licenses.len(), 1);
    let sub = &result.sub_licenses[0];
    assert_eq!(sub.key, "KEY-BASIC");
    assert_eq!(sub.status, SubLicenseStatus::Active);
    assert_eq!(sub.main_license_key_id, pro.id);
    assert_eq!(sub.vendor.as_deref(), Some("lemonsqueezy"));
    assert!(sub.assigned_email.is_none());

    let demoted = fixture.store.find_license_by_id(basic.id).await.unwrap().unwrap();
    assert!(!demoted.is_active);
    assert!(demoted.deactivated_at.is_some());
    assert!(!demoted.converted_to_team);
}

#[tokio::test]
async fn test_consolidate_creates_premium_organization_owned_by_caller() {
    let fixture = Fixture::new().await;
    let a = fixture.license("KEY-A", 1, None, None).await;
    let b = fixture.license("KEY-B", 1, None, None).await;

    let result = fixture
        .engine()
        .consolidate(fixture.owner.id, &[a.id, b.id])
        .await
        .unwrap();

    let organization = fixture
        .store
        .find_organization(result.organization.id)
        .await
        .unwrap()
        .unwrap();
    assert!(organization.premium);
    assert!(organization.name.starts_with("owner's Team "));
    assert_eq!(organization.main_license_key_id, Some(result.main_license.id));

    let members = fixture
        .store
        .list_organization_members(organization.id)
        .await
        .unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, fixture.owner.id);
    assert_eq!(members[0].role, OrganizationRole::Owner);

    // Local licenses get the fallback vendor on promotion
    assert_eq!(result.main_license.vendor.as_deref(), Some("local"));
}

#[tokio::test]
async fn test_three_licenses_yield_two_sub_licenses() {
    let fixture = Fixture::new().await;
    let a = fixture.license("KEY-A", 1, None, None).await;
    let b = fixture.license("KEY-B", 1, None, None).await;
    let c = fixture.license("KEY-C", 1, None, None).await;

    let result = fixture
        .engine()
        .consolidate(fixture.owner.id, &[c.id, b.id, a.id])
        .await
        .unwrap();

    // Equal tiers: the earliest-created license wins regardless of input order
    assert_eq!(result.main_license.id, a.id);
    let mut keys: Vec<&str> = result.sub_licenses.iter().map(|s| s.key.as_str()).collect();
    keys.sort();
    assert_eq!(keys, vec!["KEY-B", "KEY-C"]);

    let counts = fixture.store.counts().await;
    assert_eq!(counts.licenses, 3);
    assert_eq!(counts.active_licenses, 1);
    assert_eq!(counts.converted_licenses, 1);
    assert_eq!(counts.sub_licenses, 2);
    assert_eq!(counts.organizations, 1);
    assert_eq!(counts.organization_users, 1);
}

#[tokio::test]
async fn test_tier_tie_goes_to_earliest_created() {
    let fixture = Fixture::new().await;
    let first = fixture.license("KEY-FIRST", 1, None, None).await;
    let second = fixture
        .license("KEY-SECOND", 1, None, Some(COMBINABLE_PRODUCT))
        .await;

    let result = fixture
        .engine()
        .consolidate(fixture.owner.id, &[second.id, first.id])
        .await
        .unwrap();

    assert_eq!(result.main_license.id, first.id);
    assert_eq!(result.sub_licenses[0].key, "KEY-SECOND");
}

#[tokio::test]
async fn test_vendor_mismatch_writes_nothing() {
    let fixture = Fixture::new().await;
    let a = fixture.license("KEY-A", 1, Some("lemonsqueezy"), None).await;
    let b = fixture.license("KEY-B", 1, Some("appsumo"), None).await;
    let before = fixture.store.counts().await;

    let err = fixture
        .engine()
        .consolidate(fixture.owner.id, &[a.id, b.id])
        .await
        .unwrap_err();

    match err {
        ConsolidationError::VendorMismatch { vendors } => {
            assert_eq!(vendors, vec!["appsumo".to_string(), "lemonsqueezy".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(fixture.store.counts().await, before);
}

#[tokio::test]
async fn test_not_combinable_writes_nothing() {
    let fixture = Fixture::new().await;
    let basic = fixture.license("KEY-BASIC", 1, None, None).await;
    let business = fixture.license("KEY-BUSINESS", 5, None, None).await;
    let before = fixture.store.counts().await;

    let err = fixture
        .engine()
        .consolidate(fixture.owner.id, &[basic.id, business.id])
        .await
        .unwrap_err();

    match err {
        ConsolidationError::NotCombinable { license_ids } => {
            assert_eq!(license_ids, vec![business.id]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(fixture.store.counts().await, before);
    assert_eq!(before.organizations, 0);
}

#[tokio::test]
async fn test_too_few_licenses_after_dedup() {
    let fixture = Fixture::new().await;
    let a = fixture.license("KEY-A", 1, None, None).await;

    let err = fixture
        .engine()
        .consolidate(fixture.owner.id, &[a.id, a.id])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ConsolidationError::TooFewLicenses { required: 2, provided: 1 }
    ));
    assert_eq!(err.code(), "too_few_licenses");
}

#[tokio::test]
async fn test_unowned_license_is_invalid_selection() {
    let fixture = Fixture::new().await;
    let stranger = fixture
        .store
        .add_user("stranger@example.com", None)
        .await
        .unwrap();
    let mine = fixture.license("KEY-MINE", 1, None, None).await;
    let theirs = fixture
        .license_for(&stranger, "KEY-THEIRS", 1, None, None)
        .await;
    let before = fixture.store.counts().await;

    let err = fixture
        .engine()
        .consolidate(fixture.owner.id, &[mine.id, theirs.id])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ConsolidationError::InvalidLicenseSelection { requested: 2, found: 1 }
    ));
    assert_eq!(fixture.store.counts().await, before);
}

#[tokio::test]
async fn test_inactive_license_is_invalid_selection() {
    let fixture = Fixture::new().await;
    let a = fixture.license("KEY-A", 1, None, None).await;
    let b = fixture.license("KEY-B", 1, None, None).await;
    fixture.store.deactivate_license(b.id).await.unwrap();

    let err = fixture
        .engine()
        .consolidate(fixture.owner.id, &[a.id, b.id])
        .await
        .unwrap_err();

    assert!(matches!(err, ConsolidationError::InvalidLicenseSelection { .. }));
}

#[tokio::test]
async fn test_converted_license_cannot_be_consolidated_again() {
    let fixture = Fixture::new().await;
    let a = fixture.license("KEY-A", 1, None, None).await;
    let b = fixture.license("KEY-B", 1, None, None).await;
    let c = fixture.license("KEY-C", 1, None, None).await;

    let engine = fixture.engine();
    let first = engine.consolidate(fixture.owner.id, &[a.id, b.id]).await.unwrap();
    let after_first = fixture.store.counts().await;

    let err = engine
        .consolidate(fixture.owner.id, &[first.main_license.id, c.id])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ConsolidationError::InvalidLicenseSelection { requested: 2, found: 1 }
    ));
    assert_eq!(fixture.store.counts().await, after_first);
}

#[tokio::test]
async fn test_concurrent_overlapping_consolidations_admit_one() {
    let fixture = Fixture::new().await;
    let a = fixture.license("KEY-A", 1, None, None).await;
    let b = fixture.license("KEY-B", 1, None, None).await;
    let c = fixture.license("KEY-C", 1, None, None).await;

    let left = fixture.engine();
    let right = fixture.engine();
    let owner = fixture.owner.id;
    let left_ids = [a.id, b.id];
    let right_ids = [b.id, c.id];

    let (first, second) = tokio::join!(
        left.consolidate(owner, &left_ids),
        right.consolidate(owner, &right_ids),
    );

    let outcomes = [first, second];
    let succeeded = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);

    let failure = outcomes.into_iter().find_map(Result::err).unwrap();
    assert!(matches!(failure, ConsolidationError::InvalidLicenseSelection { .. }));
    assert!(!failure.is_retryable());

    let counts = fixture.store.counts().await;
    assert_eq!(counts.organizations, 1);
    assert_eq!(counts.sub_licenses, 1);
    assert_eq!(counts.converted_licenses, 1);
}

#[tokio::test]
async fn test_preview_matches_consolidation() {
    let fixture = Fixture::new().await;
    let a = fixture.license("KEY-A", 1, None, None).await;
    let b = fixture.license("KEY-B", 3, None, Some(COMBINABLE_PRODUCT)).await;
    let engine = fixture.engine();

    let plan = engine.preview(fixture.owner.id, &[a.id, b.id]).await.unwrap();
    assert_eq!(fixture.store.counts().await.organizations, 0);

    let result = engine.consolidate(fixture.owner.id, &[a.id, b.id]).await.unwrap();
    assert_eq!(plan.main.id, result.main_license.id);
    assert_eq!(plan.demoted.len(), result.sub_licenses.len());
    assert_eq!(plan.demoted[0].key, result.sub_licenses[0].key);
    assert_eq!(plan.vendor, "local");
}

#[tokio::test]
async fn test_preview_reports_same_refusals() {
    let fixture = Fixture::new().await;
    let a = fixture.license("KEY-A", 1, Some("lemonsqueezy"), None).await;
    let b = fixture.license("KEY-B", 1, Some("appsumo"), None).await;

    let err = fixture
        .engine()
        .preview(fixture.owner.id, &[a.id, b.id])
        .await
        .unwrap_err();

    assert_eq!(err.code(), "vendor_mismatch");
}
