use std::collections::BTreeMap;

use axum::http::header::{RETRY_AFTER, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;
use crate::validation::ValidationErrors;

/// Application-wide error types with appropriate HTTP status codes.
///
/// # Identity vs. Authorization
///
/// Identity problems map to `401` and authorization problems to `403`:
///
/// - `InvalidCredentials`, `InvalidAuthenticationToken`, `AuthenticationRequired` - 401
/// - `InactiveAccount`, `NotPermitted` - 403
///
/// `NotFound` is deliberately coarse: callers never learn which attribute of a
/// lookup (token, scope, expiry) failed to match.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    FailedValidation(ValidationErrors),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Invalid authentication credentials")]
    InvalidCredentials,

    #[error("Invalid or missing authentication token")]
    InvalidAuthenticationToken,

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("User account is not activated")]
    InactiveAccount,

    #[error("Missing required permission")]
    NotPermitted,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Edit conflict")]
    EditConflict,

    #[error("Rate limit exceeded (retry after {retry_after}s)")]
    RateLimited { retry_after: u64 },

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials
            | AppError::InvalidAuthenticationToken
            | AppError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            AppError::InactiveAccount | AppError::NotPermitted => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::EditConflict => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error kind used in the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::FailedValidation(_) => "failed_validation",
            AppError::BadRequest(_) => "bad_request",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::InvalidAuthenticationToken => "invalid_authentication_token",
            AppError::AuthenticationRequired => "authentication_required",
            AppError::InactiveAccount => "inactive_account",
            AppError::NotPermitted => "not_permitted",
            AppError::NotFound(_) => "not_found",
            AppError::EditConflict => "edit_conflict",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::Internal(_) => "internal_error",
            AppError::ConfigError(_) => "config_error",
        }
    }

    /// Build a validation failure for a single field.
    pub fn field(key: &str, message: &str) -> Self {
        let mut errors = ValidationErrors::default();
        errors.add(key, message);
        AppError::FailedValidation(errors)
    }
}

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a BTreeMap<String, String>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Full detail stays server-side; clients only get sanitized messages
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let message = match &self {
            AppError::FailedValidation(_) => "The request failed validation.",
            AppError::BadRequest(msg) => msg.as_str(),
            AppError::InvalidCredentials => "Invalid authentication credentials.",
            AppError::InvalidAuthenticationToken => {
                "Invalid or missing authentication token."
            }
            AppError::AuthenticationRequired => {
                "You must be authenticated to access this resource."
            }
            AppError::InactiveAccount => {
                "Your user account must be activated to access this resource."
            }
            AppError::NotPermitted => {
                "Your user account doesn't have the necessary permissions to access this resource."
            }
            AppError::NotFound(_) => "The requested resource could not be found.",
            AppError::EditConflict => {
                "Unable to update the record due to an edit conflict, please try again."
            }
            AppError::RateLimited { .. } => "Rate limit exceeded. Please retry later.",
            AppError::Internal(_) | AppError::ConfigError(_) => {
                "The server encountered a problem and could not process your request."
            }
        };

        let fields = match &self {
            AppError::FailedValidation(errors) => Some(errors.as_map()),
            _ => None,
        };

        let body = ErrorResponse {
            error: self.kind(),
            message,
            fields,
        };
        let mut response = (status, axum::Json(body)).into_response();

        match &self {
            AppError::InvalidAuthenticationToken => {
                response
                    .headers_mut()
                    .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            AppError::RateLimited { retry_after } => {
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(*retry_after));
            }
            _ => {}
        }

        response
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::FailedValidation(errors)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound("record".to_string()),
            StoreError::EditConflict => AppError::EditConflict,
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_errors_are_401() {
        assert_eq!(
            AppError::AuthenticationRequired.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::InvalidAuthenticationToken.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_authorization_errors_are_403() {
        assert_eq!(AppError::InactiveAccount.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotPermitted.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_invalid_token_sets_www_authenticate() {
        let response = AppError::InvalidAuthenticationToken.into_response();
        assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = AppError::RateLimited { retry_after: 3 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "3");
    }

    #[test]
    fn test_store_error_mapping() {
        assert!(matches!(
            AppError::from(StoreError::NotFound),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(StoreError::EditConflict),
            AppError::EditConflict
        ));
        assert!(matches!(
            AppError::from(StoreError::Timeout),
            AppError::Internal(_)
        ));
    }
}
