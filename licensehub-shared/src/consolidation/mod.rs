/// Team consolidation
///
/// Merges two or more standalone licenses owned by one user into a single
/// organization with one main license and a sub-license for every other
/// license. The whole read-verify-write sequence runs inside one store
/// transaction: candidates are locked first, preconditions are checked
/// against the locked rows, and any failure drops the transaction so nothing
/// is written.
///
/// # Transition
///
/// ```text
/// consolidate(owner, ids)
///   ├─> dedupe ids, reject fewer than the minimum  (no store access)
///   ├─> BEGIN, lock owned + active + standalone licenses among ids
///   ├─> count matches?        else InvalidLicenseSelection
///   ├─> one vendor?           else VendorMismatch
///   ├─> all combinable?       else NotCombinable
///   ├─> create organization, owner gets OWNER
///   ├─> promote main license (tier -> team tier, vendor, org, converted)
///   ├─> sub-license per demoted license (same key, ACTIVE)
///   ├─> deactivate demoted licenses
///   ├─> point organization at main license
///   └─> COMMIT
/// ```
///
/// # Main license choice
///
/// Highest tier wins. Ties go to the earliest-created license, then to the
/// lowest id, so the outcome never depends on the order ids were supplied.
///
/// # Single writer
///
/// Converting a license and creating sub-license rows require a
/// [`ConversionGrant`], which only this module can construct.

mod error;
mod policy;

pub use error::ConsolidationError;
pub use policy::ConsolidationPolicy;

use crate::models::license_key::LicenseKey;
use crate::models::organization::Organization;
use crate::models::sub_license::{NewSubLicense, SubLicense};
use crate::store::{LicenseStore, StoreError};
use crate::validation::key_fingerprint;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Length of the random organization name suffix
const ORGANIZATION_SUFFIX_LEN: usize = 6;

/// Characters of the owner's handle kept in an organization name
///
/// `organizations.name` is `VARCHAR(255)`.
const ORGANIZATION_HANDLE_MAX_CHARS: usize = 200;

/// Permission to write team-converted state
///
/// Required by every mutator of [`crate::store::ConsolidationTransaction`].
/// The private field means it can only be built here.
#[derive(Debug)]
pub struct ConversionGrant {
    _private: (),
}

impl ConversionGrant {
    fn issue() -> Self {
        Self { _private: () }
    }
}

/// A selection that passed every precondition
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationPlan {
    /// License that will become the team's main license
    pub main: LicenseKey,

    /// Licenses that will become sub-licenses
    pub demoted: Vec<LicenseKey>,

    /// Normalized vendor shared by every selected license
    pub vendor: String,
}

impl ConsolidationPlan {
    /// Checks `selected` against the policy and picks the main license
    ///
    /// `requested` is the number of distinct ids the caller asked for;
    /// `selected` holds the ones that are owned, active and standalone.
    pub fn build(
        policy: &ConsolidationPolicy,
        requested: usize,
        mut selected: Vec<LicenseKey>,
    ) -> Result<Self, ConsolidationError> {
        if selected.len() != requested {
            return Err(ConsolidationError::InvalidLicenseSelection {
                requested,
                found: selected.len(),
            });
        }

        let mut vendors: Vec<String> = selected.iter().map(LicenseKey::vendor_label).collect();
        vendors.sort();
        vendors.dedup();
        if vendors.len() > 1 {
            return Err(ConsolidationError::VendorMismatch { vendors });
        }

        let not_combinable: Vec<Uuid> = selected
            .iter()
            .filter(|l| !policy.is_combinable(l))
            .map(|l| l.id)
            .collect();
        if !not_combinable.is_empty() {
            return Err(ConsolidationError::NotCombinable {
                license_ids: not_combinable,
            });
        }

        selected.sort_by(|a, b| {
            b.tier
                .cmp(&a.tier)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let mut licenses = selected.into_iter();
        let main = licenses.next().ok_or(ConsolidationError::TooFewLicenses {
            required: policy.required_licenses(),
            provided: 0,
        })?;

        Ok(Self {
            main,
            demoted: licenses.collect(),
            vendor: vendors.pop().unwrap_or_default(),
        })
    }
}

/// Outcome of a committed consolidation
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationResult {
    pub main_license: LicenseKey,
    pub sub_licenses: Vec<SubLicense>,
    pub organization: Organization,
}

/// Performs consolidations against a [`LicenseStore`]
#[derive(Clone)]
pub struct TeamConsolidationEngine {
    store: Arc<dyn LicenseStore>,
    policy: ConsolidationPolicy,
}

impl TeamConsolidationEngine {
    pub fn new(store: Arc<dyn LicenseStore>, policy: ConsolidationPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &ConsolidationPolicy {
        &self.policy
    }

    /// Merges `license_ids` owned by `owner_id` into a new team
    ///
    /// # Errors
    ///
    /// - [`ConsolidationError::TooFewLicenses`] before touching the store
    /// - [`ConsolidationError::InvalidLicenseSelection`], [`ConsolidationError::VendorMismatch`],
    ///   [`ConsolidationError::NotCombinable`] from the locked rows
    /// - [`ConsolidationError::Store`] on persistence failure (see `is_retryable`)
    ///
    /// In every error case the store is unchanged.
    #[instrument(skip(self, license_ids), fields(owner_id = %owner_id, requested = license_ids.len()))]
    pub async fn consolidate(
        &self,
        owner_id: Uuid,
        license_ids: &[Uuid],
    ) -> Result<ConsolidationResult, ConsolidationError> {
        let requested = self.check_selection_size(license_ids)?;
        let grant = ConversionGrant::issue();

        let mut tx = self.store.begin_consolidation().await?;
        let locked = tx.lock_candidates(owner_id, &requested).await?;
        debug!(locked = locked.len(), "Locked consolidation candidates");

        let plan = ConsolidationPlan::build(&self.policy, requested.len(), locked).map_err(|e| {
            warn!(reason = e.code(), "Consolidation refused");
            e
        })?;

        let owner = tx.find_user(owner_id).await?.ok_or_else(|| {
            StoreError::Constraint(format!("owner {owner_id} does not exist"))
        })?;

        let name = organization_name(owner.display_handle());
        let organization = tx.create_organization(&grant, &name, owner_id).await?;

        let main_license = tx
            .promote_main_license(
                &grant,
                plan.main.id,
                self.policy.team_tier,
                &self.policy.main_vendor(&plan.main),
                organization.id,
            )
            .await?;

        let mut sub_licenses = Vec::with_capacity(plan.demoted.len());
        for demoted in &plan.demoted {
            let sub = tx
                .insert_sub_license(
                    &grant,
                    NewSubLicense {
                        key: demoted.key.clone(),
                        main_license_key_id: main_license.id,
                        vendor: demoted.vendor.clone(),
                    },
                )
                .await?;
            debug!(
                license_id = %demoted.id,
                sub_license_id = %sub.id,
                key = %key_fingerprint(&demoted.key),
                "Demoted license into sub-license"
            );
            sub_licenses.push(sub);
        }

        for demoted in &plan.demoted {
            tx.deactivate_demoted(&grant, demoted.id).await?;
        }

        let organization = tx
            .set_organization_main_license(&grant, organization.id, main_license.id)
            .await?;

        tx.commit().await?;

        info!(
            organization_id = %organization.id,
            main_license_id = %main_license.id,
            sub_licenses = sub_licenses.len(),
            vendor = %plan.vendor,
            "Licenses consolidated into team"
        );

        Ok(ConsolidationResult {
            main_license,
            sub_licenses,
            organization,
        })
    }

    /// Checks a selection without writing anything
    ///
    /// Returns the plan the engine would execute, or the error it would fail
    /// with if nothing changes in between.
    pub async fn preview(
        &self,
        owner_id: Uuid,
        license_ids: &[Uuid],
    ) -> Result<ConsolidationPlan, ConsolidationError> {
        let requested = self.check_selection_size(license_ids)?;

        let selected: Vec<LicenseKey> = self
            .store
            .list_owned_licenses(owner_id)
            .await?
            .into_iter()
            .filter(|l| requested.contains(&l.id) && l.is_standalone())
            .collect();

        ConsolidationPlan::build(&self.policy, requested.len(), selected)
    }

    /// Distinct ids in input order, or `TooFewLicenses`
    fn check_selection_size(&self, license_ids: &[Uuid]) -> Result<Vec<Uuid>, ConsolidationError> {
        let mut seen = HashSet::with_capacity(license_ids.len());
        let distinct: Vec<Uuid> = license_ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let required = self.policy.required_licenses();
        if distinct.len() < required {
            return Err(ConsolidationError::TooFewLicenses {
                required,
                provided: distinct.len(),
            });
        }

        Ok(distinct)
    }
}

/// `"<handle>'s Team <suffix>"`; the suffix only avoids name collisions
fn organization_name(handle: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ORGANIZATION_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    let handle: String = handle.chars().take(ORGANIZATION_HANDLE_MAX_CHARS).collect();
    format!("{handle}'s Team {suffix}")
}
