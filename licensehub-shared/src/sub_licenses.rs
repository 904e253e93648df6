/// Seat management for consolidated teams
///
/// The owner of a main license hands its sub-licenses out by email, takes
/// them back, and switches them between ACTIVE and INACTIVE. Switching a
/// sub-license to INACTIVE makes its key stop validating.

use crate::models::sub_license::{SubLicense, SubLicenseStatus};
use crate::store::{LicenseStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SubLicenseError {
    /// Sub-license or main license does not exist
    #[error("license not found")]
    NotFound,

    /// Caller does not own the main license
    #[error("only the owner of the main license can manage its sub-licenses")]
    NotOwner,

    /// The email already holds another sub-license of the same main license
    #[error("{0} already holds a sub-license of this team")]
    AlreadyAssigned(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Sub-license operations, each checked against main-license ownership
#[derive(Clone)]
pub struct SubLicenseManager {
    store: Arc<dyn LicenseStore>,
}

impl SubLicenseManager {
    pub fn new(store: Arc<dyn LicenseStore>) -> Self {
        Self { store }
    }

    /// Sub-licenses of a main license the caller owns
    pub async fn list(
        &self,
        actor_id: Uuid,
        main_license_id: Uuid,
    ) -> Result<Vec<SubLicense>, SubLicenseError> {
        if self.store.find_license_by_id(main_license_id).await?.is_none() {
            return Err(SubLicenseError::NotFound);
        }
        self.ensure_owner(actor_id, main_license_id).await?;

        Ok(self.store.list_sub_licenses(main_license_id).await?)
    }

    /// Assigns a sub-license to an email, linking the user if one exists
    #[instrument(skip(self, email), fields(actor_id = %actor_id, sub_license_id = %sub_license_id))]
    pub async fn assign(
        &self,
        actor_id: Uuid,
        sub_license_id: Uuid,
        email: &str,
    ) -> Result<SubLicense, SubLicenseError> {
        let sub = self.owned_sub_license(actor_id, sub_license_id).await?;
        let email = email.trim().to_ascii_lowercase();

        if let Some(holder) = self
            .store
            .find_sub_license_by_email(sub.main_license_key_id, &email)
            .await?
        {
            if holder.id != sub.id {
                return Err(SubLicenseError::AlreadyAssigned(email));
            }
        }

        let user_id = self.store.find_user_by_email(&email).await?.map(|u| u.id);
        let updated = self
            .store
            .set_sub_license_assignee(sub.id, Some(&email), user_id)
            .await
            .map_err(|e| match e {
                StoreError::Constraint(_) => SubLicenseError::AlreadyAssigned(email.clone()),
                other => SubLicenseError::Store(other),
            })?
            .ok_or(SubLicenseError::NotFound)?;

        info!(linked_user = user_id.is_some(), "Sub-license assigned");
        Ok(updated)
    }

    /// Clears a sub-license's assignee
    #[instrument(skip(self), fields(actor_id = %actor_id, sub_license_id = %sub_license_id))]
    pub async fn unassign(
        &self,
        actor_id: Uuid,
        sub_license_id: Uuid,
    ) -> Result<SubLicense, SubLicenseError> {
        let sub = self.owned_sub_license(actor_id, sub_license_id).await?;
        let updated = self
            .store
            .set_sub_license_assignee(sub.id, None, None)
            .await?
            .ok_or(SubLicenseError::NotFound)?;

        info!("Sub-license unassigned");
        Ok(updated)
    }

    /// Enables or disables a sub-license
    #[instrument(skip(self), fields(actor_id = %actor_id, sub_license_id = %sub_license_id, status = status.as_str()))]
    pub async fn set_status(
        &self,
        actor_id: Uuid,
        sub_license_id: Uuid,
        status: SubLicenseStatus,
    ) -> Result<SubLicense, SubLicenseError> {
        let sub = self.owned_sub_license(actor_id, sub_license_id).await?;
        let updated = self
            .store
            .set_sub_license_status(sub.id, status)
            .await?
            .ok_or(SubLicenseError::NotFound)?;

        info!("Sub-license status changed");
        Ok(updated)
    }

    async fn owned_sub_license(
        &self,
        actor_id: Uuid,
        sub_license_id: Uuid,
    ) -> Result<SubLicense, SubLicenseError> {
        let sub = self
            .store
            .find_sub_license_by_id(sub_license_id)
            .await?
            .ok_or(SubLicenseError::NotFound)?;
        self.ensure_owner(actor_id, sub.main_license_key_id).await?;
        Ok(sub)
    }

    async fn ensure_owner(&self, actor_id: Uuid, main_license_id: Uuid) -> Result<(), SubLicenseError> {
        if self.store.owns_license(actor_id, main_license_id).await? {
            Ok(())
        } else {
            Err(SubLicenseError::NotOwner)
        }
    }
}
