/// PostgreSQL-backed store

use super::{private, ConsolidationTransaction, LicenseStore, StoreError, StoreResult};
use crate::consolidation::ConversionGrant;
use crate::models::license_key::{LicenseKey, NewLicenseKey};
use crate::models::organization::{Organization, OrganizationRole, OrganizationUser};
use crate::models::sub_license::{NewSubLicense, SubLicense, SubLicenseStatus};
use crate::models::user::User;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

/// How long a consolidation waits on a locked license before giving up
///
/// Surfaces as SQLSTATE 55P03, which [`StoreError::is_retryable`] reports as
/// retryable.
const CONSOLIDATION_LOCK_TIMEOUT: &str = "5s";

/// [`LicenseStore`] over a sqlx connection pool
#[derive(Debug, Clone)]
pub struct PgLicenseStore {
    pool: PgPool,
}

impl PgLicenseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LicenseStore for PgLicenseStore {
    async fn find_license_by_key(&self, key: &str) -> StoreResult<Option<LicenseKey>> {
        Ok(LicenseKey::find_by_key(&self.pool, key).await?)
    }

    async fn find_license_by_id(&self, id: Uuid) -> StoreResult<Option<LicenseKey>> {
        Ok(LicenseKey::find_by_id(&self.pool, id).await?)
    }

    async fn find_sub_license_by_key(&self, key: &str) -> StoreResult<Option<SubLicense>> {
        Ok(SubLicense::find_by_key(&self.pool, key).await?)
    }

    async fn find_sub_license_by_id(&self, id: Uuid) -> StoreResult<Option<SubLicense>> {
        Ok(SubLicense::find_by_id(&self.pool, id).await?)
    }

    async fn find_sub_license_by_email(
        &self,
        main_license_id: Uuid,
        email: &str,
    ) -> StoreResult<Option<SubLicense>> {
        Ok(SubLicense::find_by_main_and_email(&self.pool, main_license_id, email).await?)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(User::find_by_id(&self.pool, id).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(User::find_by_email(&self.pool, email).await?)
    }

    async fn list_owned_licenses(&self, user_id: Uuid) -> StoreResult<Vec<LicenseKey>> {
        Ok(LicenseKey::list_owned_by_user(&self.pool, user_id).await?)
    }

    async fn list_assigned_sub_licenses(
        &self,
        user_id: Uuid,
        email: Option<&str>,
    ) -> StoreResult<Vec<SubLicense>> {
        Ok(SubLicense::list_active_assigned_to(&self.pool, user_id, email).await?)
    }

    async fn list_sub_licenses(&self, main_license_id: Uuid) -> StoreResult<Vec<SubLicense>> {
        Ok(SubLicense::list_by_main_license(&self.pool, main_license_id).await?)
    }

    async fn owns_license(&self, user_id: Uuid, license_id: Uuid) -> StoreResult<bool> {
        Ok(LicenseKey::is_owned_by(&self.pool, user_id, license_id).await?)
    }

    async fn find_organization(&self, id: Uuid) -> StoreResult<Option<Organization>> {
        Ok(Organization::find_by_id(&self.pool, id).await?)
    }

    async fn list_organization_members(
        &self,
        organization_id: Uuid,
    ) -> StoreResult<Vec<OrganizationUser>> {
        Ok(Organization::list_members(&self.pool, organization_id).await?)
    }

    async fn upsert_user(&self, id: Uuid, email: &str) -> StoreResult<User> {
        User::upsert_identity(&self.pool, id, email)
            .await
            .map_err(map_constraint)
    }

    async fn create_license(&self, data: NewLicenseKey) -> StoreResult<LicenseKey> {
        LicenseKey::create(&self.pool, data).await.map_err(map_constraint)
    }

    async fn grant_license(&self, user_id: Uuid, license_id: Uuid) -> StoreResult<()> {
        LicenseKey::grant_to_user(&self.pool, user_id, license_id)
            .await
            .map_err(map_constraint)
    }

    async fn deactivate_license(&self, id: Uuid) -> StoreResult<Option<LicenseKey>> {
        Ok(LicenseKey::deactivate(&self.pool, id).await?)
    }

    async fn set_sub_license_status(
        &self,
        id: Uuid,
        status: SubLicenseStatus,
    ) -> StoreResult<Option<SubLicense>> {
        Ok(SubLicense::update_status(&self.pool, id, status).await?)
    }

    async fn set_sub_license_assignee(
        &self,
        id: Uuid,
        email: Option<&str>,
        user_id: Option<Uuid>,
    ) -> StoreResult<Option<SubLicense>> {
        SubLicense::update_assignment(&self.pool, id, email, user_id)
            .await
            .map_err(map_constraint)
    }

    async fn begin_consolidation(&self) -> StoreResult<Box<dyn ConsolidationTransaction>> {
        let mut tx = self.pool.begin().await?;

        // Postgres does not accept bind parameters in SET
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{CONSOLIDATION_LOCK_TIMEOUT}'"
        ))
        .execute(&mut *tx)
        .await?;

        debug!("Consolidation transaction started");
        Ok(Box::new(PgConsolidationTransaction { tx }))
    }
}

/// Consolidation running inside one Postgres transaction (READ COMMITTED)
pub struct PgConsolidationTransaction {
    tx: Transaction<'static, Postgres>,
}

impl private::Sealed for PgConsolidationTransaction {}

#[async_trait]
impl ConsolidationTransaction for PgConsolidationTransaction {
    async fn lock_candidates(&mut self, owner_id: Uuid, ids: &[Uuid]) -> StoreResult<Vec<LicenseKey>> {
        Ok(LicenseKey::lock_consolidation_candidates(&mut *self.tx, owner_id, ids).await?)
    }

    async fn find_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(User::find_by_id(&mut *self.tx, id).await?)
    }

    async fn create_organization(
        &mut self,
        _grant: &ConversionGrant,
        name: &str,
        owner_id: Uuid,
    ) -> StoreResult<Organization> {
        let organization = Organization::create_premium(&mut *self.tx, name)
            .await
            .map_err(map_constraint)?;
        Organization::add_member(&mut *self.tx, organization.id, owner_id, OrganizationRole::Owner)
            .await
            .map_err(map_constraint)?;
        Ok(organization)
    }

    async fn promote_main_license(
        &mut self,
        _grant: &ConversionGrant,
        license_id: Uuid,
        team_tier: i32,
        vendor: &str,
        organization_id: Uuid,
    ) -> StoreResult<LicenseKey> {
        LicenseKey::promote_to_team(&mut *self.tx, license_id, team_tier, vendor, organization_id)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    StoreError::Conflict(format!("license {license_id} changed before promotion"))
                }
                other => StoreError::Database(other),
            })
    }

    async fn insert_sub_license(
        &mut self,
        _grant: &ConversionGrant,
        data: NewSubLicense,
    ) -> StoreResult<SubLicense> {
        SubLicense::insert(&mut *self.tx, data).await.map_err(map_constraint)
    }

    async fn deactivate_demoted(
        &mut self,
        _grant: &ConversionGrant,
        license_id: Uuid,
    ) -> StoreResult<LicenseKey> {
        LicenseKey::deactivate(&mut *self.tx, license_id)
            .await?
            .ok_or_else(|| StoreError::Conflict(format!("license {license_id} disappeared")))
    }

    async fn set_organization_main_license(
        &mut self,
        _grant: &ConversionGrant,
        organization_id: Uuid,
        main_license_id: Uuid,
    ) -> StoreResult<Organization> {
        Ok(Organization::set_main_license(&mut *self.tx, organization_id, main_license_id).await?)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        this.tx.commit().await?;
        debug!("Consolidation transaction committed");
        Ok(())
    }
}

/// Turns unique and foreign-key violations into [`StoreError::Constraint`]
fn map_constraint(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if matches!(db.code().as_deref(), Some("23505") | Some("23503")) {
            return StoreError::Constraint(db.message().to_string());
        }
    }
    StoreError::Database(err)
}
