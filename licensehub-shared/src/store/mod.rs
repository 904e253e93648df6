/// Persistent store abstraction
///
/// [`LicenseStore`] is the seam between license logic and the relational
/// store. Reads and ordinary lifecycle writes are plain async methods.
/// Consolidation writes only exist on a [`ConsolidationTransaction`], which
/// is sealed (implemented only in this module tree) and whose mutators each
/// demand a [`ConversionGrant`]. Grants are minted only by the consolidation
/// engine, so no other code path can convert a license or create a
/// sub-license row.
///
/// Two implementations are provided:
///
/// - [`PgLicenseStore`]: sqlx over PostgreSQL
/// - [`InMemoryLicenseStore`]: a mutex-guarded map store used by tests and
///   local development

mod memory;
mod postgres;

pub use memory::{InMemoryLicenseStore, StoreCounts};
pub use postgres::PgLicenseStore;

use crate::consolidation::ConversionGrant;
use crate::models::license_key::{LicenseKey, NewLicenseKey};
use crate::models::organization::{Organization, OrganizationUser};
use crate::models::sub_license::{NewSubLicense, SubLicense, SubLicenseStatus};
use crate::models::user::User;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// PostgreSQL SQLSTATE codes for failures that succeed when retried
const RETRYABLE_SQLSTATES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
];

/// Persistence failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error reported by the database driver
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness or foreign-key rule was violated
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// A row the transaction relied on changed or disappeared
    #[error("transaction conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    /// Whether the caller can retry the whole operation unchanged
    ///
    /// True for serialization failures, deadlocks, lock timeouts, pool
    /// exhaustion and in-transaction conflicts. A failed consolidation leaves
    /// nothing behind, so retrying is always safe.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => db
                .code()
                .map(|code| RETRYABLE_SQLSTATES.contains(&code.as_ref()))
                .unwrap_or(false),
            StoreError::Database(sqlx::Error::PoolTimedOut) => true,
            StoreError::Database(_) => false,
            StoreError::Constraint(_) => false,
            StoreError::Conflict(_) => true,
        }
    }
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Read and lifecycle access to licenses, sub-licenses, and organizations
#[async_trait]
pub trait LicenseStore: Send + Sync {
    /// Finds a primary license by key string
    async fn find_license_by_key(&self, key: &str) -> StoreResult<Option<LicenseKey>>;

    /// Finds a primary license by ID
    async fn find_license_by_id(&self, id: Uuid) -> StoreResult<Option<LicenseKey>>;

    /// Finds a sub-license by key string, regardless of status
    async fn find_sub_license_by_key(&self, key: &str) -> StoreResult<Option<SubLicense>>;

    /// Finds a sub-license by ID
    async fn find_sub_license_by_id(&self, id: Uuid) -> StoreResult<Option<SubLicense>>;

    /// Finds the sub-license of a main license assigned to an email
    async fn find_sub_license_by_email(
        &self,
        main_license_id: Uuid,
        email: &str,
    ) -> StoreResult<Option<SubLicense>>;

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Lists licenses a user owns (any state), oldest first
    async fn list_owned_licenses(&self, user_id: Uuid) -> StoreResult<Vec<LicenseKey>>;

    /// Lists ACTIVE sub-licenses assigned to a user by ID or email
    async fn list_assigned_sub_licenses(
        &self,
        user_id: Uuid,
        email: Option<&str>,
    ) -> StoreResult<Vec<SubLicense>>;

    /// Lists every sub-license of a main license
    async fn list_sub_licenses(&self, main_license_id: Uuid) -> StoreResult<Vec<SubLicense>>;

    /// Whether a user owns a license
    async fn owns_license(&self, user_id: Uuid, license_id: Uuid) -> StoreResult<bool>;

    async fn find_organization(&self, id: Uuid) -> StoreResult<Option<Organization>>;

    async fn list_organization_members(
        &self,
        organization_id: Uuid,
    ) -> StoreResult<Vec<OrganizationUser>>;

    /// Creates or refreshes the user row for an authenticated identity
    async fn upsert_user(&self, id: Uuid, email: &str) -> StoreResult<User>;

    /// Creates a standalone license at purchase or redemption time
    async fn create_license(&self, data: NewLicenseKey) -> StoreResult<LicenseKey>;

    /// Records ownership of a license (idempotent)
    async fn grant_license(&self, user_id: Uuid, license_id: Uuid) -> StoreResult<()>;

    /// Deactivates a license on refund or expiry
    async fn deactivate_license(&self, id: Uuid) -> StoreResult<Option<LicenseKey>>;

    async fn set_sub_license_status(
        &self,
        id: Uuid,
        status: SubLicenseStatus,
    ) -> StoreResult<Option<SubLicense>>;

    /// Sets or clears (both `None`) the assignee of a sub-license
    async fn set_sub_license_assignee(
        &self,
        id: Uuid,
        email: Option<&str>,
        user_id: Option<Uuid>,
    ) -> StoreResult<Option<SubLicense>>;

    /// Opens the transaction a consolidation runs in
    async fn begin_consolidation(&self) -> StoreResult<Box<dyn ConsolidationTransaction>>;
}

pub(crate) mod private {
    /// Restricts [`super::ConsolidationTransaction`] implementations to this crate
    pub trait Sealed {}
}

/// One atomic consolidation
///
/// Dropping the transaction without calling [`commit`](Self::commit) rolls
/// every change back.
#[async_trait]
pub trait ConsolidationTransaction: private::Sealed + Send {
    /// Locks the owner's standalone licenses among `ids`
    ///
    /// Only licenses that are owned by `owner_id`, active, not converted and
    /// not attached to an organization are returned. They stay locked until
    /// the transaction ends, so a concurrent consolidation touching any of
    /// them waits and then sees the committed state.
    async fn lock_candidates(&mut self, owner_id: Uuid, ids: &[Uuid]) -> StoreResult<Vec<LicenseKey>>;

    async fn find_user(&mut self, id: Uuid) -> StoreResult<Option<User>>;

    /// Creates a premium organization with `owner_id` as OWNER
    async fn create_organization(
        &mut self,
        grant: &ConversionGrant,
        name: &str,
        owner_id: Uuid,
    ) -> StoreResult<Organization>;

    /// Escalates a license into the main license of `organization_id`
    async fn promote_main_license(
        &mut self,
        grant: &ConversionGrant,
        license_id: Uuid,
        team_tier: i32,
        vendor: &str,
        organization_id: Uuid,
    ) -> StoreResult<LicenseKey>;

    /// Creates the sub-license for a demoted license
    async fn insert_sub_license(
        &mut self,
        grant: &ConversionGrant,
        data: NewSubLicense,
    ) -> StoreResult<SubLicense>;

    /// Deactivates a demoted license
    async fn deactivate_demoted(
        &mut self,
        grant: &ConversionGrant,
        license_id: Uuid,
    ) -> StoreResult<LicenseKey>;

    async fn set_organization_main_license(
        &mut self,
        grant: &ConversionGrant,
        organization_id: Uuid,
        main_license_id: Uuid,
    ) -> StoreResult<Organization>;

    /// Makes every change visible atomically
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
