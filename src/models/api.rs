use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Movie, Token, User};

/// Request to register a new account.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Request carrying a single token plaintext (activation).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenRequest {
    #[serde(default)]
    pub token: String,
}

/// Request to set a new password using a password-reset token.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub token: String,
}

/// Email and password exchanged for an authentication token.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Request naming an account by email (token resend, password reset).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMovieRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub runtime: i32,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMovieRequest {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<i32>,
    pub genres: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct AuthenticationTokenResponse {
    pub authentication_token: Token,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MovieResponse {
    pub movie: Movie,
}

#[derive(Debug, Serialize)]
pub struct MoviesResponse {
    pub movies: Vec<Movie>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "available" while the process serves requests
    pub status: String,
    pub system_info: SystemInfo,
}

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub environment: String,
    pub version: String,
}

/// Cumulative request counters exposed at `/debug/vars`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestCounters {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    pub total_processing_time_us: u64,
    pub total_responses_sent_by_status: BTreeMap<String, u64>,
}

/// Process diagnostics exposed at `/debug/vars`.
#[derive(Debug, Serialize)]
pub struct DebugVarsResponse {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub background_tasks: usize,
    pub rate_limited_clients: usize,
    pub requests: RequestCounters,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_missing_fields_default_to_empty() {
        let request: RegisterUserRequest =
            serde_json::from_str(r#"{"email": "a@example.com"}"#).unwrap();
        assert_eq!(request.email, "a@example.com");
        assert!(request.name.is_empty());
        assert!(request.password.is_empty());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: Result<EmailRequest, _> =
            serde_json::from_str(r#"{"email": "a@example.com", "admin": true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_update_movie_request_partial() {
        let request: UpdateMovieRequest = serde_json::from_str(r#"{"year": 1999}"#).unwrap();
        assert_eq!(request.year, Some(1999));
        assert!(request.title.is_none());
        assert!(request.genres.is_none());
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "available".to_string(),
            system_info: SystemInfo {
                environment: "development".to_string(),
                version: "0.1.0".to_string(),
            },
        };

        let json = serde_json::to_string(&response).expect("Serialization should succeed");
        assert!(json.contains("\"status\":\"available\""));
        assert!(json.contains("\"environment\":\"development\""));
    }
}
