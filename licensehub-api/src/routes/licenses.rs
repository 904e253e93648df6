/// License endpoints
///
/// - `POST /v1/licenses/validate` - Validate a key against every vendor
/// - `GET /v1/licenses` - The caller's license pool
/// - `GET /v1/licenses/candidates` - Licenses the caller may consolidate
/// - `GET /v1/licenses/resolve/:key` - Record that owns a key's custom knowledge

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use licensehub_shared::{
    auth::middleware::AuthContext,
    knowledge::KnowledgeOwner,
    license_pool::PoolEntry,
    models::license_key::LicenseKey,
    registry::Redeemer,
    validation::{key_fingerprint, ValidationResult},
};
use serde::Deserialize;
use tracing::info;
use validator::{Validate, ValidationError};

/// Message returned for every rejected key
///
/// Vendor-specific reasons stay in the logs.
const GENERIC_INVALID_MESSAGE: &str = "Invalid license key";

/// Validate request
#[derive(Debug, Deserialize, Validate)]
pub struct ValidateRequest {
    #[validate(
        length(min = 1, max = 255, message = "License key must be 1-255 characters"),
        custom(function = "key_not_blank")
    )]
    pub key: String,
}

fn key_not_blank(key: &str) -> Result<(), ValidationError> {
    if key.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("License key must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Validates a license key and adds it to the caller's pool
///
/// Keys sold through a reseller are recorded on first redemption. Store
/// failures while recording surface as errors; a rejected key is always a
/// 200 with the generic message.
///
/// # Endpoint
///
/// ```text
/// POST /v1/licenses/validate
/// Authorization: Bearer <token>
///
/// { "key": "XXXX-XXXX" }
/// ```
///
/// # Response
///
/// ```json
/// { "is_valid": true, "vendor": "lemonsqueezy" }
/// { "is_valid": false, "error": "Invalid license key" }
/// ```
pub async fn validate_license(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<ValidateRequest>,
) -> ApiResult<Json<ValidationResult>> {
    req.validate()?;
    let key = req.key.trim();

    let redeemer = Redeemer {
        user_id: auth.user_id,
        email: auth.email.as_deref(),
    };
    let result = state.registry.redeem(key, redeemer).await?;
    if result.is_valid {
        return Ok(Json(result));
    }

    info!(
        user_id = %auth.user_id,
        key = %key_fingerprint(key),
        reason = result.error.as_deref().unwrap_or("unknown"),
        "License validation rejected"
    );
    Ok(Json(ValidationResult::invalid(GENERIC_INVALID_MESSAGE)))
}

/// Lists the caller's owned licenses and assigned sub-licenses
pub async fn list_licenses(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<PoolEntry>>> {
    Ok(Json(state.pool.list(auth.user_id).await?))
}

/// Lists licenses the caller can select for a team
pub async fn list_candidates(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<LicenseKey>>> {
    Ok(Json(state.pool.consolidation_candidates(auth.user_id).await?))
}

/// Resolves a key to the license record its custom knowledge lives under
pub async fn resolve_license(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<KnowledgeOwner>> {
    Ok(Json(state.knowledge.resolve(&key).await?))
}
