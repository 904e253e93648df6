/// License key model and database operations
///
/// A `LicenseKey` is one purchased entitlement. Users own license keys through
/// the `user_license_keys` join table; a key may additionally belong to one
/// organization once it has been consolidated into a team.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE license_keys (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     key VARCHAR(255) NOT NULL UNIQUE,
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     vendor VARCHAR(50),
///     tier INTEGER NOT NULL DEFAULT 1,
///     external_product_id BIGINT,
///     organization_id UUID REFERENCES organizations(id) ON DELETE SET NULL,
///     converted_to_team BOOLEAN NOT NULL DEFAULT FALSE,
///     activated_at TIMESTAMPTZ,
///     deactivated_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE user_license_keys (
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     license_key_id UUID NOT NULL REFERENCES license_keys(id) ON DELETE CASCADE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (user_id, license_key_id)
/// );
/// ```
///
/// # Converted state
///
/// `converted_to_team` and `organization_id` are only ever written by the team
/// consolidation transaction. The statements that write them are crate-private
/// and reachable only through `store::ConsolidationTransaction`.
///
/// # Example
///
/// ```no_run
/// use licensehub_shared::models::license_key::{LicenseKey, NewLicenseKey, LicenseVendor};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let license = LicenseKey::create(&pool, NewLicenseKey {
///     key: "OLLY-1234-5678".to_string(),
///     vendor: Some(LicenseVendor::LemonSqueezy.as_str().to_string()),
///     tier: 1,
///     external_product_id: Some(328561),
/// }).await?;
///
/// if let Some(found) = LicenseKey::find_by_key(&pool, "OLLY-1234-5678").await? {
///     assert_eq!(found.id, license.id);
/// }
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Systems of record that issue license keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseVendor {
    /// Keys issued directly by us and stored in our database
    Local,

    /// Subscription-style keys validated against LemonSqueezy
    LemonSqueezy,

    /// Activation-registry keys validated against AppSumo
    AppSumo,
}

impl LicenseVendor {
    /// Label stored in the `vendor` column and reported in validation results
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseVendor::Local => "local",
            LicenseVendor::LemonSqueezy => "lemonsqueezy",
            LicenseVendor::AppSumo => "appsumo",
        }
    }

    /// Parses a stored vendor label (case-insensitive)
    ///
    /// `direct` is accepted as a legacy spelling of `local`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "direct" => Some(LicenseVendor::Local),
            "lemonsqueezy" | "lemon_squeezy" => Some(LicenseVendor::LemonSqueezy),
            "appsumo" => Some(LicenseVendor::AppSumo),
            _ => None,
        }
    }
}

/// License key row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LicenseKey {
    /// Unique license ID
    pub id: Uuid,

    /// The license key string handed to the customer
    pub key: String,

    /// Whether the license currently grants access
    pub is_active: bool,

    /// Issuing vendor label (see [`LicenseVendor`]); legacy rows may be NULL
    pub vendor: Option<String>,

    /// Capability level, higher means more seats/features
    pub tier: i32,

    /// Vendor product identifier (LemonSqueezy product id for subscription keys)
    pub external_product_id: Option<i64>,

    /// Organization this license belongs to, if consolidated
    pub organization_id: Option<Uuid>,

    /// Set once the license became the main license of a team
    pub converted_to_team: bool,

    /// When the license was first activated
    pub activated_at: Option<DateTime<Utc>>,

    /// When the license was deactivated (refund, expiry, or demotion)
    pub deactivated_at: Option<DateTime<Utc>>,

    /// When the row was created
    pub created_at: DateTime<Utc>,

    /// When the row was last updated
    pub updated_at: DateTime<Utc>,
}

impl LicenseKey {
    /// Parsed vendor, `None` when the stored label is unknown
    ///
    /// A missing vendor is treated as [`LicenseVendor::Local`].
    pub fn get_vendor(&self) -> Option<LicenseVendor> {
        match self.vendor.as_deref().map(str::trim) {
            None | Some("") => Some(LicenseVendor::Local),
            Some(label) => LicenseVendor::from_str(label),
        }
    }

    /// Normalized vendor label used to compare licenses with each other
    pub fn vendor_label(&self) -> String {
        match self.get_vendor() {
            Some(vendor) => vendor.as_str().to_string(),
            None => self
                .vendor
                .as_deref()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase(),
        }
    }

    /// Whether the license can still be selected for consolidation
    pub fn is_standalone(&self) -> bool {
        self.is_active && !self.converted_to_team && self.organization_id.is_none()
    }
}

/// Input for creating a license at purchase or redemption time
///
/// There is deliberately no way to create a license in converted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLicenseKey {
    /// The key string
    pub key: String,

    /// Issuing vendor label
    pub vendor: Option<String>,

    /// Purchased tier
    #[serde(default = "default_tier")]
    pub tier: i32,

    /// Vendor product identifier
    pub external_product_id: Option<i64>,
}

fn default_tier() -> i32 {
    1
}

const LICENSE_COLUMNS: &str = "id, key, is_active, vendor, tier, external_product_id, organization_id, \
     converted_to_team, activated_at, deactivated_at, created_at, updated_at";

impl LicenseKey {
    /// Creates an active, standalone license
    ///
    /// # Errors
    ///
    /// Returns an error if the key already exists or the database is unreachable
    pub async fn create<'e, E>(executor: E, data: NewLicenseKey) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, LicenseKey>(&format!(
            r#"
            INSERT INTO license_keys (key, vendor, tier, external_product_id, activated_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING {LICENSE_COLUMNS}
            "#
        ))
        .bind(data.key)
        .bind(data.vendor)
        .bind(data.tier)
        .bind(data.external_product_id)
        .fetch_one(executor)
        .await
    }

    /// Finds a license by ID
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, LicenseKey>(&format!(
            "SELECT {LICENSE_COLUMNS} FROM license_keys WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Finds a license by its key string
    pub async fn find_by_key<'e, E>(executor: E, key: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, LicenseKey>(&format!(
            "SELECT {LICENSE_COLUMNS} FROM license_keys WHERE key = $1"
        ))
        .bind(key)
        .fetch_optional(executor)
        .await
    }

    /// Lists every license a user owns, oldest first
    pub async fn list_owned_by_user<'e, E>(executor: E, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, LicenseKey>(
            r#"
            SELECT lk.id, lk.key, lk.is_active, lk.vendor, lk.tier, lk.external_product_id,
                   lk.organization_id, lk.converted_to_team, lk.activated_at, lk.deactivated_at,
                   lk.created_at, lk.updated_at
            FROM license_keys lk
            JOIN user_license_keys ulk ON ulk.license_key_id = lk.id
            WHERE ulk.user_id = $1
            ORDER BY lk.created_at ASC, lk.id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    /// Records that a user owns a license (idempotent)
    pub async fn grant_to_user<'e, E>(executor: E, user_id: Uuid, license_id: Uuid) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO user_license_keys (user_id, license_key_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, license_key_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(license_id)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Checks whether a user owns a license
    pub async fn is_owned_by<'e, E>(executor: E, user_id: Uuid, license_id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM user_license_keys
                WHERE user_id = $1 AND license_key_id = $2
            )
            "#,
        )
        .bind(user_id)
        .bind(license_id)
        .fetch_one(executor)
        .await
    }

    /// Deactivates a license (refund, expiry, or demotion into a sub-license)
    ///
    /// Returns the updated row, or `None` if the license doesn't exist.
    pub async fn deactivate<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, LicenseKey>(&format!(
            r#"
            UPDATE license_keys
            SET is_active = FALSE, deactivated_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {LICENSE_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Locks the owner's standalone licenses among `ids` for the rest of the transaction
    ///
    /// Rows are locked in id order so that overlapping consolidations queue on the
    /// same row instead of deadlocking. Under READ COMMITTED the WHERE clause is
    /// re-evaluated against the committed row once a lock wait ends, so a license
    /// consolidated by a concurrent transaction drops out of the result.
    pub(crate) async fn lock_consolidation_candidates<'e, E>(
        executor: E,
        owner_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, LicenseKey>(
            r#"
            SELECT lk.id, lk.key, lk.is_active, lk.vendor, lk.tier, lk.external_product_id,
                   lk.organization_id, lk.converted_to_team, lk.activated_at, lk.deactivated_at,
                   lk.created_at, lk.updated_at
            FROM license_keys lk
            JOIN user_license_keys ulk ON ulk.license_key_id = lk.id
            WHERE ulk.user_id = $1
              AND lk.id = ANY($2)
              AND lk.is_active
              AND NOT lk.converted_to_team
              AND lk.organization_id IS NULL
            ORDER BY lk.id
            FOR UPDATE OF lk
            "#,
        )
        .bind(owner_id)
        .bind(ids)
        .fetch_all(executor)
        .await
    }

    /// Turns a license into the main license of an organization
    pub(crate) async fn promote_to_team<'e, E>(
        executor: E,
        id: Uuid,
        team_tier: i32,
        vendor: &str,
        organization_id: Uuid,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, LicenseKey>(&format!(
            r#"
            UPDATE license_keys
            SET tier = $2, vendor = $3, organization_id = $4,
                converted_to_team = TRUE, updated_at = NOW()
            WHERE id = $1 AND is_active AND NOT converted_to_team
            RETURNING {LICENSE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(team_tier)
        .bind(vendor)
        .bind(organization_id)
        .fetch_one(executor)
        .await
    }
}
