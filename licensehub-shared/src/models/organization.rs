/// Organization model and database operations
///
/// An organization is the team created when a user consolidates several
/// licenses. It points at exactly one main license and has the consolidating
/// user as its owner.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE organization_role AS ENUM ('OWNER', 'ADMIN', 'MEMBER');
///
/// CREATE TABLE organizations (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL UNIQUE,
///     premium BOOLEAN NOT NULL DEFAULT FALSE,
///     main_license_key_id UUID REFERENCES license_keys(id),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE organization_users (
///     organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role organization_role NOT NULL DEFAULT 'MEMBER',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (organization_id, user_id)
/// );
/// ```
///
/// # Roles
///
/// - **OWNER**: The user who consolidated the licenses; manages sub-licenses
/// - **ADMIN**: Can manage sub-licenses on the owner's behalf
/// - **MEMBER**: Uses a seat

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Roles inside an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "organization_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrganizationRole {
    /// Created the team
    Owner,

    /// Manages seats
    Admin,

    /// Holds a seat
    Member,
}

impl OrganizationRole {
    /// Converts role to string for display
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationRole::Owner => "OWNER",
            OrganizationRole::Admin => "ADMIN",
            OrganizationRole::Member => "MEMBER",
        }
    }
}

/// Organization row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organization {
    /// Unique organization ID
    pub id: Uuid,

    /// Unique display name
    pub name: String,

    /// Premium flag, set for every consolidated team
    pub premium: bool,

    /// Main license; set in the transaction that creates the row
    pub main_license_key_id: Option<Uuid>,

    /// When the organization was created
    pub created_at: DateTime<Utc>,

    /// When the organization was last updated
    pub updated_at: DateTime<Utc>,
}

/// Organization membership row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrganizationUser {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: OrganizationRole,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    /// Finds an organization by ID
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Organization>(
            r#"
            SELECT id, name, premium, main_license_key_id, created_at, updated_at
            FROM organizations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Lists members of an organization, owner first
    pub async fn list_members<'e, E>(
        executor: E,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationUser>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, OrganizationUser>(
            r#"
            SELECT organization_id, user_id, role, created_at
            FROM organization_users
            WHERE organization_id = $1
            ORDER BY
                CASE role WHEN 'OWNER' THEN 0 WHEN 'ADMIN' THEN 1 ELSE 2 END,
                created_at ASC
            "#,
        )
        .bind(organization_id)
        .fetch_all(executor)
        .await
    }

    /// Gets a user's role in an organization
    pub async fn get_role<'e, E>(
        executor: E,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrganizationRole>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar::<_, OrganizationRole>(
            r#"
            SELECT role
            FROM organization_users
            WHERE organization_id = $1 AND user_id = $2
            "#,
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    /// Inserts a premium organization without a main license
    pub(crate) async fn create_premium<'e, E>(executor: E, name: &str) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Organization>(
            r#"
            INSERT INTO organizations (name, premium)
            VALUES ($1, TRUE)
            RETURNING id, name, premium, main_license_key_id, created_at, updated_at
            "#,
        )
        .bind(name)
        .fetch_one(executor)
        .await
    }

    /// Adds a user to an organization with a role
    pub(crate) async fn add_member<'e, E>(
        executor: E,
        organization_id: Uuid,
        user_id: Uuid,
        role: OrganizationRole,
    ) -> Result<OrganizationUser, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, OrganizationUser>(
            r#"
            INSERT INTO organization_users (organization_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING organization_id, user_id, role, created_at
            "#,
        )
        .bind(organization_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(executor)
        .await
    }

    /// Points an organization at its main license
    pub(crate) async fn set_main_license<'e, E>(
        executor: E,
        organization_id: Uuid,
        main_license_key_id: Uuid,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Organization>(
            r#"
            UPDATE organizations
            SET main_license_key_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, premium, main_license_key_id, created_at, updated_at
            "#,
        )
        .bind(organization_id)
        .bind(main_license_key_id)
        .fetch_one(executor)
        .await
    }
}
