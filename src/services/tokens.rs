//! Issuing, resolving and revoking scoped tokens.
//!
//! A token plaintext is 16 bytes from the OS random source, encoded as
//! unpadded URL-safe base64 (22 characters). Only its SHA-256 digest is
//! persisted; the plaintext is handed back to the caller exactly once.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use rand::TryRngCore;
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::debug;

use crate::error::AppError;
use crate::models::{Scope, Token, UserId, hash_plaintext};
use crate::store::{StoreError, TokenStore};
use crate::validation::token_plaintext_is_valid;

/// Random bytes behind each token plaintext.
const TOKEN_ENTROPY_BYTES: usize = 16;

#[derive(Debug, Error)]
pub enum TokenError {
    /// Plaintext has the wrong shape; no lookup was attempted.
    #[error("malformed token")]
    Malformed,

    /// No live token of the requested scope matches.
    #[error("token not found")]
    NotFound,

    #[error("random source unavailable: {0}")]
    Rng(String),

    #[error("token lifetime out of range")]
    InvalidTtl,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TokenError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => TokenError::NotFound,
            other => TokenError::Store(other),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => AppError::field("token", "must be 22 bytes long"),
            TokenError::NotFound => AppError::NotFound("token".to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Build a new token for `user_id` expiring at `expiry`.
///
/// Pure apart from drawing randomness; nothing is stored.
pub fn generate(user_id: UserId, expiry: DateTime<Utc>, scope: Scope) -> Result<Token, TokenError> {
    let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| TokenError::Rng(e.to_string()))?;

    let plaintext = URL_SAFE_NO_PAD.encode(bytes);
    let hash = hash_plaintext(&plaintext);

    Ok(Token {
        plaintext,
        hash,
        user_id,
        scope,
        expiry,
    })
}

/// Token operations over a [`TokenStore`].
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn TokenStore>,
}

impl TokenService {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Generate and persist a token valid for `ttl`.
    pub async fn issue(&self, user_id: UserId, ttl: Duration, scope: Scope) -> Result<Token, TokenError> {
        let now = Utc::now();
        let expiry = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .ok_or(TokenError::InvalidTtl)?;

        let token = generate(user_id, expiry, scope)?;
        self.store.insert(token.record(now)).await?;

        debug!(user_id, scope = %scope, expiry = %token.expiry, "Issued token");
        Ok(token)
    }

    /// Owner of a live token of `scope`.
    ///
    /// The plaintext shape is checked before any store access. Unknown,
    /// expired and wrong-scope tokens are all reported as `NotFound`.
    pub async fn resolve(&self, scope: Scope, plaintext: &str) -> Result<UserId, TokenError> {
        if !token_plaintext_is_valid(plaintext) {
            return Err(TokenError::Malformed);
        }

        let hash = hash_plaintext(plaintext);
        Ok(self.store.find(scope, hash, Utc::now()).await?)
    }

    /// Remove every token of `scope` held by `user_id`.
    pub async fn revoke_all(&self, scope: Scope, user_id: UserId) -> Result<u64, TokenError> {
        let removed = self.store.delete_all_for_user(scope, user_id).await?;
        debug!(user_id, scope = %scope, removed, "Revoked tokens");
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::store::MemoryStore;

    fn service() -> TokenService {
        TokenService::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_generated_plaintext_shape() {
        let token = generate(1, Utc::now(), Scope::Activation).unwrap();
        assert_eq!(token.plaintext.len(), 22);
        assert!(token_plaintext_is_valid(&token.plaintext));
        assert_eq!(token.hash, hash_plaintext(&token.plaintext));
    }

    #[test]
    fn test_generated_plaintexts_are_unique() {
        let seen: HashSet<String> = (0..200)
            .map(|_| generate(1, Utc::now(), Scope::Authentication).unwrap().plaintext)
            .collect();
        assert_eq!(seen.len(), 200);
    }

    #[tokio::test]
    async fn test_issue_then_resolve() {
        let tokens = service();
        let token = tokens
            .issue(5, Duration::from_secs(60), Scope::Authentication)
            .await
            .unwrap();

        assert_eq!(
            tokens.resolve(Scope::Authentication, &token.plaintext).await.unwrap(),
            5
        );
    }

    #[tokio::test]
    async fn test_resolve_is_scoped() {
        let tokens = service();
        let token = tokens
            .issue(5, Duration::from_secs(60), Scope::Activation)
            .await
            .unwrap();

        let err = tokens
            .resolve(Scope::Authentication, &token.plaintext)
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::NotFound));
    }

    #[tokio::test]
    async fn test_malformed_plaintext_skips_lookup() {
        let err = service()
            .resolve(Scope::Authentication, "short")
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::Malformed));
    }

    #[tokio::test]
    async fn test_expired_token_is_not_found() {
        let tokens = service();
        let token = tokens
            .issue(5, Duration::from_millis(1), Scope::PasswordReset)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = tokens
            .resolve(Scope::PasswordReset, &token.plaintext)
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::NotFound));
    }

    #[tokio::test]
    async fn test_revoke_all_invalidates_tokens() {
        let tokens = service();
        let first = tokens
            .issue(5, Duration::from_secs(60), Scope::Activation)
            .await
            .unwrap();
        let second = tokens
            .issue(5, Duration::from_secs(60), Scope::Activation)
            .await
            .unwrap();
        let auth = tokens
            .issue(5, Duration::from_secs(60), Scope::Authentication)
            .await
            .unwrap();

        assert_eq!(tokens.revoke_all(Scope::Activation, 5).await.unwrap(), 2);
        for plaintext in [&first.plaintext, &second.plaintext] {
            assert!(tokens.resolve(Scope::Activation, plaintext).await.is_err());
        }
        assert!(tokens.resolve(Scope::Authentication, &auth.plaintext).await.is_ok());
    }

    #[test]
    fn test_app_error_mapping() {
        assert!(matches!(
            AppError::from(TokenError::NotFound),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(TokenError::Malformed),
            AppError::FailedValidation(_)
        ));
        assert!(matches!(
            AppError::from(TokenError::Store(StoreError::Timeout)),
            AppError::Internal(_)
        ));
    }
}
