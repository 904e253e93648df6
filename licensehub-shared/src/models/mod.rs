/// Database models for LicenseHub
///
/// Row types and their SQL. Statements that move a license into or out of
/// team-converted state are crate-private; the only public way to run them is
/// a `store::ConsolidationTransaction`.
///
/// # Models
///
/// - `user`: User identity (email, username)
/// - `license_key`: Purchased licenses and their owners
/// - `sub_license`: Demoted licenses attached to a main license
/// - `organization`: Teams created by consolidation, and their members
///
/// # Example
///
/// ```no_run
/// use licensehub_shared::models::license_key::LicenseKey;
/// use licensehub_shared::db::pool::{create_pool, DatabaseConfig};
/// use uuid::Uuid;
///
/// # async fn example(user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let owned = LicenseKey::list_owned_by_user(&pool, user_id).await?;
/// # Ok(())
/// # }
/// ```

pub mod license_key;
pub mod organization;
pub mod sub_license;
pub mod user;
