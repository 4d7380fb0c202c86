//! Tests for the public domain and wire models.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{TimeDelta, Utc};
use serde_json::json;

// Note: These tests can be run with: cargo test --test model_tests

mod token_tests {
    use super::*;
    use greenlight::models::{Scope, TokenRecord, hash_plaintext};
    use greenlight::services::tokens::generate;
    use greenlight::validation::token_plaintext_is_valid;

    #[test]
    fn test_generated_token_shape() {
        let token = generate(7, Utc::now() + TimeDelta::hours(1), Scope::Authentication).unwrap();

        assert!(token_plaintext_is_valid(&token.plaintext));
        assert_eq!(token.hash, hash_plaintext(&token.plaintext));
        assert_eq!(token.user_id, 7);
        assert_eq!(token.scope, Scope::Authentication);
    }

    #[test]
    fn test_generated_tokens_differ() {
        let expiry = Utc::now() + TimeDelta::hours(1);
        let a = generate(1, expiry, Scope::Activation).unwrap();
        let b = generate(1, expiry, Scope::Activation).unwrap();

        assert_ne!(a.plaintext, b.plaintext);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_record_liveness_boundary() {
        let now = Utc::now();
        let token = generate(1, now, Scope::PasswordReset).unwrap();
        let record: TokenRecord = token.record(now - TimeDelta::minutes(30));

        assert!(record.is_live_at(now - TimeDelta::seconds(1)));
        assert!(!record.is_live_at(now));
        assert!(!record.is_live_at(now + TimeDelta::seconds(1)));
    }

    #[test]
    fn test_token_wire_format() {
        let token = generate(1, Utc::now() + TimeDelta::hours(24), Scope::Authentication).unwrap();
        let value = serde_json::to_value(&token).unwrap();

        assert_eq!(value["token"], json!(token.plaintext));
        assert!(value["expiry"].is_string());
        assert_eq!(value.as_object().unwrap().len(), 2);
    }
}

mod request_tests {
    use greenlight::models::{CredentialsRequest, ResetPasswordRequest, UpdateMovieRequest};

    #[test]
    fn test_credentials_request_deserialization() {
        let json = r#"{"email": "alice@example.com", "password": "pa55word1234"}"#;
        let request: CredentialsRequest = serde_json::from_str(json).expect("Deserialization failed");

        assert_eq!(request.email, "alice@example.com");
        assert_eq!(request.password, "pa55word1234");
    }

    #[test]
    fn test_reset_password_request_rejects_extra_fields() {
        let json = r#"{"password": "pa55word1234", "token": "x", "user_id": 1}"#;
        assert!(serde_json::from_str::<ResetPasswordRequest>(json).is_err());
    }

    #[test]
    fn test_update_movie_request_empty_body() {
        let request: UpdateMovieRequest = serde_json::from_str("{}").unwrap();

        assert!(request.title.is_none());
        assert!(request.year.is_none());
        assert!(request.runtime.is_none());
        assert!(request.genres.is_none());
    }
}

mod permission_tests {
    use greenlight::models::{MOVIES_READ, MOVIES_WRITE, Permissions};

    #[test]
    fn test_permissions_from_codes() {
        let permissions: Permissions = [MOVIES_READ].into_iter().collect();

        assert!(permissions.includes(MOVIES_READ));
        assert!(!permissions.includes(MOVIES_WRITE));
        assert_eq!(permissions.len(), 1);
    }
}
