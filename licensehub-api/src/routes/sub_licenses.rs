/// Sub-license (seat) endpoints
///
/// All of them are restricted to the owner of the main license.

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use licensehub_shared::{
    auth::middleware::AuthContext,
    models::sub_license::{SubLicense, SubLicenseStatus},
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct AssignRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: SubLicenseStatus,
}

/// `GET /v1/licenses/:id/sub-licenses`
pub async fn list_sub_licenses(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(main_license_id): Path<Uuid>,
) -> ApiResult<Json<Vec<SubLicense>>> {
    Ok(Json(state.sub_licenses.list(auth.user_id, main_license_id).await?))
}

/// `POST /v1/sub-licenses/:id/assign`
pub async fn assign_sub_license(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(sub_license_id): Path<Uuid>,
    Json(req): Json<AssignRequest>,
) -> ApiResult<Json<SubLicense>> {
    req.validate()?;
    let sub = state
        .sub_licenses
        .assign(auth.user_id, sub_license_id, &req.email)
        .await?;
    Ok(Json(sub))
}

/// `POST /v1/sub-licenses/:id/unassign`
pub async fn unassign_sub_license(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(sub_license_id): Path<Uuid>,
) -> ApiResult<Json<SubLicense>> {
    Ok(Json(state.sub_licenses.unassign(auth.user_id, sub_license_id).await?))
}

/// `POST /v1/sub-licenses/:id/status` with `{"status": "ACTIVE" | "INACTIVE"}`
pub async fn set_sub_license_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(sub_license_id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<Json<SubLicense>> {
    let sub = state
        .sub_licenses
        .set_status(auth.user_id, sub_license_id, req.status)
        .await?;
    Ok(Json(sub))
}
