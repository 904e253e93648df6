/// Team consolidation endpoints
///
/// - `POST /v1/teams/preview` - Check a selection without writing
/// - `POST /v1/teams/consolidate` - Merge the selection into a team

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Extension, Json};
use licensehub_shared::{
    auth::middleware::AuthContext,
    consolidation::{ConsolidationError, ConsolidationResult},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Selection of licenses to merge
#[derive(Debug, Deserialize, Validate)]
pub struct TeamRequest {
    #[validate(length(min = 1, max = 100, message = "Select between 1 and 100 licenses"))]
    pub license_ids: Vec<Uuid>,
}

/// Preview outcome
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreviewResponse {
    pub valid: bool,

    /// Refusal code (`too_few_licenses`, `vendor_mismatch`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable refusal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// License that would become the main license
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_license_id: Option<Uuid>,
}

/// Checks a selection against the consolidation rules
///
/// Business-rule refusals come back as `200 {"valid": false, "reason": ...}`;
/// only store failures are errors.
pub async fn preview_team(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<TeamRequest>,
) -> ApiResult<Json<PreviewResponse>> {
    req.validate()?;

    let response = match state.consolidation.preview(auth.user_id, &req.license_ids).await {
        Ok(plan) => PreviewResponse {
            valid: true,
            reason: None,
            message: None,
            main_license_id: Some(plan.main.id),
        },
        Err(ConsolidationError::Store(err)) => return Err(err.into()),
        Err(err) => PreviewResponse {
            valid: false,
            reason: Some(err.code().to_string()),
            message: Some(err.to_string()),
            main_license_id: None,
        },
    };

    Ok(Json(response))
}

/// Consolidates the selection into a new team
///
/// # Endpoint
///
/// ```text
/// POST /v1/teams/consolidate
/// Authorization: Bearer <token>
///
/// { "license_ids": ["uuid", "uuid"] }
/// ```
///
/// # Errors
///
/// - `422 too_few_licenses`
/// - `409 invalid_license_selection`, `vendor_mismatch`, `not_combinable`
/// - `503 retryable`: lost a race with another update, nothing was written
pub async fn consolidate_team(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<TeamRequest>,
) -> ApiResult<Json<ConsolidationResult>> {
    req.validate()?;

    let result = state
        .consolidation
        .consolidate(auth.user_id, &req.license_ids)
        .await?;
    Ok(Json(result))
}
