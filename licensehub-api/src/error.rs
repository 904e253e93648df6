/// Error handling for the API server
///
/// Every handler returns `ApiResult<T>`; library errors convert into
/// [`ApiError`] with `?` and render as
/// `{"error": "<code>", "message": "...", "details": [...]}`.
///
/// # Status mapping
///
/// | Source | Status | `error` |
/// |---|---|---|
/// | `TooFewLicenses` | 422 | `too_few_licenses` |
/// | `InvalidLicenseSelection` | 409 | `invalid_license_selection` |
/// | `VendorMismatch` | 409 | `vendor_mismatch` |
/// | `NotCombinable` | 409 | `not_combinable` |
/// | retryable store error | 503 | `retryable` |
/// | other store error | 500 | `internal_error` |
/// | unknown license | 404 | `not_found` |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use licensehub_shared::{
    auth::middleware::AuthError,
    consolidation::ConsolidationError,
    knowledge::ResolveError,
    store::StoreError,
    sub_licenses::SubLicenseError,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409) with a specific code
    Conflict { code: &'static str, message: String },

    /// Unprocessable entity (422) - request body validation
    ValidationError(Vec<ValidationErrorDetail>),

    /// Unprocessable entity (422) with a specific code
    Unprocessable { code: &'static str, message: String },

    /// Service unavailable (503) - safe to retry unchanged
    Retryable(String),

    /// Internal server error (500)
    InternalError(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "not_found", "vendor_mismatch")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict { code, message } => write!(f, "Conflict ({}): {}", code, message),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::Unprocessable { code, message } => {
                write!(f, "Unprocessable ({}): {}", code, message)
            }
            ApiError::Retryable(msg) => write!(f, "Retryable: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict { code, message } => (StatusCode::CONFLICT, code, message, None),
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::Unprocessable { code, message } => {
                (StatusCode::UNPROCESSABLE_ENTITY, code, message, None)
            }
            ApiError::Retryable(msg) => {
                tracing::warn!("Retryable failure: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "retryable",
                    "The request conflicted with another update; retry it".to_string(),
                    None,
                )
            }
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        if err.is_retryable() {
            ApiError::Retryable(err.to_string())
        } else {
            ApiError::InternalError(err.to_string())
        }
    }
}

impl From<ConsolidationError> for ApiError {
    fn from(err: ConsolidationError) -> Self {
        let code = err.code();
        match err {
            ConsolidationError::TooFewLicenses { .. } => ApiError::Unprocessable {
                code,
                message: err.to_string(),
            },
            ConsolidationError::InvalidLicenseSelection { .. }
            | ConsolidationError::VendorMismatch { .. }
            | ConsolidationError::NotCombinable { .. } => ApiError::Conflict {
                code,
                message: err.to_string(),
            },
            ConsolidationError::Store(store) => store.into(),
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound => ApiError::NotFound("License key not found".to_string()),
            ResolveError::Store(store) => store.into(),
        }
    }
}

impl From<SubLicenseError> for ApiError {
    fn from(err: SubLicenseError) -> Self {
        match err {
            SubLicenseError::NotFound => ApiError::NotFound("License not found".to_string()),
            SubLicenseError::NotOwner => ApiError::Forbidden(err.to_string()),
            SubLicenseError::AlreadyAssigned(_) => ApiError::Conflict {
                code: "already_assigned",
                message: err.to_string(),
            },
            SubLicenseError::Store(store) => store.into(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => {
                ApiError::Unauthorized("Missing credentials".to_string())
            }
            AuthError::InvalidFormat(msg) => ApiError::BadRequest(msg),
            AuthError::InvalidToken(msg) => ApiError::Unauthorized(msg),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let errors: Vec<ValidationErrorDetail> = err
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        ApiError::ValidationError(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::NotFound("License not found".to_string());
        assert_eq!(err.to_string(), "Not found: License not found");
    }

    #[test]
    fn test_consolidation_error_statuses() {
        let cases = [
            (
                ConsolidationError::TooFewLicenses { required: 2, provided: 1 },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ConsolidationError::InvalidLicenseSelection { requested: 2, found: 1 },
                StatusCode::CONFLICT,
            ),
            (
                ConsolidationError::VendorMismatch { vendors: vec!["a".into(), "b".into()] },
                StatusCode::CONFLICT,
            ),
            (
                ConsolidationError::NotCombinable { license_ids: vec![] },
                StatusCode::CONFLICT,
            ),
            (
                ConsolidationError::Store(StoreError::Conflict("row moved".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ConsolidationError::Store(StoreError::Constraint("dup".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_conflict_carries_specific_code() {
        let err: ApiError = ConsolidationError::VendorMismatch {
            vendors: vec!["appsumo".into(), "local".into()],
        }
        .into();
        assert!(matches!(err, ApiError::Conflict { code: "vendor_mismatch", .. }));
    }

    #[test]
    fn test_sub_license_errors() {
        assert_eq!(
            ApiError::from(SubLicenseError::NotOwner).into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(SubLicenseError::AlreadyAssigned("a@example.com".into()))
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ResolveError::NotFound).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
