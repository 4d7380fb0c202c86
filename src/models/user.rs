use std::fmt;

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use chrono::{DateTime, Utc};
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use thiserror::Error;

pub type UserId = i64;

/// A registered account.
///
/// The password hash and the optimistic-locking version are never serialized.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

/// Fields supplied when inserting a user; the store assigns id, timestamps and version.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: Password,
    pub activated: bool,
}

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("random source unavailable: {0}")]
    Rng(String),

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// An argon2id password hash in PHC string format.
#[derive(Clone)]
pub struct Password {
    phc: String,
}

impl Password {
    /// Hash `plaintext` with a fresh random salt.
    ///
    /// CPU-heavy: call from `spawn_blocking` inside request handlers.
    pub fn hash(plaintext: &str) -> Result<Self, PasswordError> {
        let mut salt = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| PasswordError::Rng(e.to_string()))?;
        let salt = SaltString::encode_b64(&salt).map_err(|e| PasswordError::Hash(e.to_string()))?;

        let phc = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hash(e.to_string()))?
            .to_string();

        Ok(Self { phc })
    }

    /// Check `plaintext` against the stored hash.
    ///
    /// A mismatch is `Ok(false)`; only a corrupt hash is an error.
    pub fn matches(&self, plaintext: &str) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(&self.phc).map_err(|e| PasswordError::Hash(e.to_string()))?;

        match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::Hash(e.to_string())),
        }
    }

    pub fn as_phc(&self) -> &str {
        &self.phc
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(..)")
    }
}

/// Who is making the current request.
///
/// Stored in request extensions by the authentication layer; downstream
/// guards and handlers read it from there.
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    User(User),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    pub fn is_activated(&self) -> bool {
        matches!(self, Identity::User(user) if user.activated)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::User(user) => Some(user),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample_user(activated: bool) -> User {
        User {
            id: 7,
            created_at: Utc::now(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password: Password::hash("pa55word").unwrap(),
            activated,
            version: 1,
        }
    }

    #[test]
    fn test_password_round_trip() {
        let password = Password::hash("pa55word").unwrap();
        assert!(password.as_phc().starts_with("$argon2"));
        assert!(password.matches("pa55word").unwrap());
        assert!(!password.matches("wrong-password").unwrap());
    }

    #[test]
    fn test_password_salts_differ() {
        let a = Password::hash("pa55word").unwrap();
        let b = Password::hash("pa55word").unwrap();
        assert_ne!(a.as_phc(), b.as_phc());
    }

    #[test]
    fn test_password_debug_is_redacted() {
        let password = Password::hash("pa55word").unwrap();
        assert_eq!(format!("{password:?}"), "Password(..)");
    }

    #[test]
    fn test_user_serialization_omits_secrets() {
        let json = serde_json::to_value(sample_user(true)).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("version").is_none());
        assert_eq!(json["email"], "alice@example.com");
        assert_eq!(json["activated"], true);
    }

    #[test]
    fn test_identity_predicates() {
        assert!(Identity::Anonymous.is_anonymous());
        assert!(!Identity::Anonymous.is_activated());

        let inactive = Identity::User(sample_user(false));
        assert!(!inactive.is_anonymous());
        assert!(!inactive.is_activated());

        let active = Identity::User(sample_user(true));
        assert!(active.is_activated());
        assert_eq!(active.user().map(|u| u.id), Some(7));
    }
}
