/// Sub-license model and database operations
///
/// A sub-license is a license key that was demoted into membership under a
/// main license during team consolidation. It keeps the literal key string of
/// the license it was created from, so anything already holding that key keeps
/// working, now routed through the main license.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE sub_license_status AS ENUM ('ACTIVE', 'INACTIVE');
///
/// CREATE TABLE sub_licenses (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     key VARCHAR(255) NOT NULL UNIQUE,
///     status sub_license_status NOT NULL DEFAULT 'ACTIVE',
///     main_license_key_id UUID NOT NULL REFERENCES license_keys(id) ON DELETE CASCADE,
///     vendor VARCHAR(50),
///     assigned_user_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     assigned_email VARCHAR(255),
///     converted_to_team BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// Rows are only inserted by the consolidation transaction (`insert` is
/// crate-private). Status and assignment can be changed afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Sub-license status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "sub_license_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubLicenseStatus {
    /// Usable; validates through its main license
    Active,

    /// Disabled by the team owner or an administrator
    Inactive,
}

impl SubLicenseStatus {
    /// Database/display label
    pub fn as_str(&self) -> &'static str {
        match self {
            SubLicenseStatus::Active => "ACTIVE",
            SubLicenseStatus::Inactive => "INACTIVE",
        }
    }
}

/// Sub-license row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubLicense {
    /// Unique sub-license ID
    pub id: Uuid,

    /// Key string, identical to the demoted license's key
    pub key: String,

    /// Current status
    pub status: SubLicenseStatus,

    /// The main license this sub-license resolves to
    pub main_license_key_id: Uuid,

    /// Vendor carried over from the demoted license
    pub vendor: Option<String>,

    /// User currently holding this seat
    pub assigned_user_id: Option<Uuid>,

    /// Email the seat was assigned to (may precede the user signing up)
    pub assigned_email: Option<String>,

    /// Always true for rows created by consolidation
    pub converted_to_team: bool,

    /// When the row was created
    pub created_at: DateTime<Utc>,

    /// When the row was last updated
    pub updated_at: DateTime<Utc>,
}

impl SubLicense {
    /// Whether the sub-license itself is enabled
    pub fn is_active(&self) -> bool {
        self.status == SubLicenseStatus::Active
    }
}

/// Data for a sub-license created during consolidation
#[derive(Debug, Clone)]
pub struct NewSubLicense {
    /// Key string of the demoted license
    pub key: String,

    /// Main license of the new team
    pub main_license_key_id: Uuid,

    /// Vendor of the demoted license
    pub vendor: Option<String>,
}

const SUB_LICENSE_COLUMNS: &str = "id, key, status, main_license_key_id, vendor, assigned_user_id, \
     assigned_email, converted_to_team, created_at, updated_at";

impl SubLicense {
    /// Finds a sub-license by ID
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, SubLicense>(&format!(
            "SELECT {SUB_LICENSE_COLUMNS} FROM sub_licenses WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Finds a sub-license by key string, regardless of status
    pub async fn find_by_key<'e, E>(executor: E, key: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, SubLicense>(&format!(
            "SELECT {SUB_LICENSE_COLUMNS} FROM sub_licenses WHERE key = $1"
        ))
        .bind(key)
        .fetch_optional(executor)
        .await
    }

    /// Lists the sub-licenses of a main license, oldest first
    pub async fn list_by_main_license<'e, E>(
        executor: E,
        main_license_key_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, SubLicense>(&format!(
            r#"
            SELECT {SUB_LICENSE_COLUMNS}
            FROM sub_licenses
            WHERE main_license_key_id = $1
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(main_license_key_id)
        .fetch_all(executor)
        .await
    }

    /// Lists active sub-licenses held by a user, matched by user ID or email
    pub async fn list_active_assigned_to<'e, E>(
        executor: E,
        user_id: Uuid,
        email: Option<&str>,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, SubLicense>(&format!(
            r#"
            SELECT {SUB_LICENSE_COLUMNS}
            FROM sub_licenses
            WHERE status = 'ACTIVE'
              AND (assigned_user_id = $1 OR ($2::TEXT IS NOT NULL AND assigned_email = $2))
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(user_id)
        .bind(email)
        .fetch_all(executor)
        .await
    }

    /// Finds the sub-license under a main license that is assigned to an email
    pub async fn find_by_main_and_email<'e, E>(
        executor: E,
        main_license_key_id: Uuid,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, SubLicense>(&format!(
            r#"
            SELECT {SUB_LICENSE_COLUMNS}
            FROM sub_licenses
            WHERE main_license_key_id = $1 AND assigned_email = $2
            "#
        ))
        .bind(main_license_key_id)
        .bind(email)
        .fetch_optional(executor)
        .await
    }

    /// Sets the status of a sub-license
    pub async fn update_status<'e, E>(
        executor: E,
        id: Uuid,
        status: SubLicenseStatus,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, SubLicense>(&format!(
            r#"
            UPDATE sub_licenses
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {SUB_LICENSE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(executor)
        .await
    }

    /// Sets or clears the assignee of a sub-license
    pub async fn update_assignment<'e, E>(
        executor: E,
        id: Uuid,
        email: Option<&str>,
        user_id: Option<Uuid>,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, SubLicense>(&format!(
            r#"
            UPDATE sub_licenses
            SET assigned_email = $2, assigned_user_id = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {SUB_LICENSE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(email)
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    /// Inserts the sub-license for a demoted license
    pub(crate) async fn insert<'e, E>(executor: E, data: NewSubLicense) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, SubLicense>(&format!(
            r#"
            INSERT INTO sub_licenses (key, status, main_license_key_id, vendor, converted_to_team)
            VALUES ($1, 'ACTIVE', $2, $3, TRUE)
            RETURNING {SUB_LICENSE_COLUMNS}
            "#
        ))
        .bind(data.key)
        .bind(data.main_license_key_id)
        .bind(data.vendor)
        .fetch_one(executor)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_as_str() {
        assert_eq!(SubLicenseStatus::Active.as_str(), "ACTIVE");
        assert_eq!(SubLicenseStatus::Inactive.as_str(), "INACTIVE");
    }


    #[test]
    fn test_status_serde_uses_screaming_case() {
        let json = serde_json::to_string(&SubLicenseStatus::Active).unwrap();
        assert_eq!(json, "\"ACTIVE\"");
    }
}
