use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::user::UserId;

/// SHA-256 digest of a token plaintext. Only the digest is ever stored.
pub type TokenHash = [u8; 32];

/// What a token may be used for. A token is only honored for its own scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum Scope {
    Activation = 1,
    Authentication = 2,
    PasswordReset = 3,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
            Scope::PasswordReset => "password-reset",
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A freshly issued token.
///
/// The plaintext exists only here, returned once to the caller; it is
/// serialized as `token` and never logged.
#[derive(Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: TokenHash,
    #[serde(skip)]
    pub user_id: UserId,
    #[serde(skip)]
    pub scope: Scope,
    pub expiry: DateTime<Utc>,
}

impl Token {
    /// The persistable part of this token.
    pub fn record(&self, created_at: DateTime<Utc>) -> TokenRecord {
        TokenRecord {
            hash: self.hash,
            user_id: self.user_id,
            scope: self.scope,
            created_at,
            expiry: self.expiry,
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("plaintext", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("scope", &self.scope)
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Stored form of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub hash: TokenHash,
    pub user_id: UserId,
    pub scope: Scope,
    pub created_at: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
}

impl TokenRecord {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry > now
    }
}

pub fn hash_plaintext(plaintext: &str) -> TokenHash {
    Sha256::digest(plaintext.as_bytes()).into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_wire_names() {
        assert_eq!(
            serde_json::to_string(&Scope::PasswordReset).unwrap(),
            "\"password-reset\""
        );
        assert_eq!(Scope::Authentication.to_string(), "authentication");
        let parsed: Scope = serde_json::from_str("\"activation\"").unwrap();
        assert_eq!(parsed, Scope::Activation);
    }

    #[test]
    fn test_scope_codes_are_distinct() {
        assert_ne!(Scope::Activation.code(), Scope::Authentication.code());
        assert_ne!(Scope::Authentication.code(), Scope::PasswordReset.code());
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = hash_plaintext("abcdefghijklmnopqrstuv");
        let b = hash_plaintext("abcdefghijklmnopqrstuv");
        let c = hash_plaintext("abcdefghijklmnopqrstuw");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_token_serializes_only_plaintext_and_expiry() {
        let token = Token {
            plaintext: "abcdefghijklmnopqrstuv".to_string(),
            hash: hash_plaintext("abcdefghijklmnopqrstuv"),
            user_id: 1,
            scope: Scope::Authentication,
            expiry: Utc::now(),
        };

        let json = serde_json::to_value(&token).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(json["token"], "abcdefghijklmnopqrstuv");
        assert!(object.contains_key("expiry"));
    }

    #[test]
    fn test_token_debug_hides_plaintext() {
        let token = Token {
            plaintext: "abcdefghijklmnopqrstuv".to_string(),
            hash: [0; 32],
            user_id: 1,
            scope: Scope::Activation,
            expiry: Utc::now(),
        };
        assert!(!format!("{token:?}").contains("abcdefghijklmnopqrstuv"));
    }
}
