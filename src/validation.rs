//! Field-level input validation.
//!
//! Validation functions record problems on a [`Validator`] instead of
//! returning on the first failure, so a client receives every field error in
//! one `422` response. Only the first message per field is kept.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fmt;

use chrono::{Datelike, Utc};

use crate::error::{AppError, AppResult};

// =============================================================================
// Validation Constants
// =============================================================================

/// Exact length of a token plaintext (16 random bytes, unpadded base64url).
pub const TOKEN_PLAINTEXT_LENGTH: usize = 22;

/// Minimum password length in bytes.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length in bytes.
pub const MAX_PASSWORD_LENGTH: usize = 72;

/// Maximum length for user names and movie titles.
pub const MAX_NAME_LENGTH: usize = 500;

/// Maximum length of an email address (RFC 5321 path limit).
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Year of the first known motion picture.
pub const MIN_MOVIE_YEAR: i32 = 1888;

/// Maximum number of genres per movie.
pub const MAX_GENRES: usize = 5;

/// Collected field errors, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    /// Record an error for `key` unless one is already present.
    pub fn add(&mut self, key: &str, message: &str) {
        self.0
            .entry(key.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, message) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{key}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

/// Accumulates field errors across several checks.
///
/// # Example
///
/// ```rust,ignore
/// let mut v = Validator::new();
/// validate_email(&mut v, &input.email);
/// validate_password_plaintext(&mut v, &input.password);
/// v.finish()?;
/// ```
#[derive(Debug, Default)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` for `key` when `ok` is false.
    pub fn check(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.errors.add(key, message);
        }
    }

    pub fn add_error(&mut self, key: &str, message: &str) {
        self.errors.add(key, message);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert into `Err(AppError::FailedValidation)` if any check failed.
    pub fn finish(self) -> AppResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::FailedValidation(self.errors))
        }
    }
}

/// Validate an email address.
///
/// This is a shape check (one `@`, non-empty local part, dotted domain, no
/// whitespace), not an RFC 5322 parser.
pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(
        email.len() <= MAX_EMAIL_LENGTH,
        "email",
        "must not be more than 254 bytes long",
    );
    v.check(is_email_shaped(email), "email", "must be a valid email address");
}

fn is_email_shaped(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        && !domain.ends_with('.')
}

/// Validate a plaintext password before hashing.
pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(
        password.len() >= MIN_PASSWORD_LENGTH,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        password.len() <= MAX_PASSWORD_LENGTH,
        "password",
        "must not be more than 72 bytes long",
    );
}

/// Validate a user's display name.
pub fn validate_name(v: &mut Validator, name: &str) {
    v.check(!name.trim().is_empty(), "name", "must be provided");
    v.check(
        name.len() <= MAX_NAME_LENGTH,
        "name",
        "must not be more than 500 bytes long",
    );
}

/// Validate the shape of a token plaintext.
///
/// Runs before any storage lookup so malformed input never reaches a store.
pub fn validate_token_plaintext(v: &mut Validator, token: &str) {
    v.check(!token.is_empty(), "token", "must be provided");
    v.check(
        token.len() == TOKEN_PLAINTEXT_LENGTH,
        "token",
        "must be 22 bytes long",
    );
    v.check(
        token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'),
        "token",
        "must only contain URL-safe base64 characters",
    );
}

/// Shorthand for a token-only check.
pub fn token_plaintext_is_valid(token: &str) -> bool {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, token);
    v.is_valid()
}

/// Validate the fields of a movie.
pub fn validate_movie(v: &mut Validator, title: &str, year: i32, runtime: i32, genres: &[String]) {
    v.check(!title.trim().is_empty(), "title", "must be provided");
    v.check(
        title.len() <= MAX_NAME_LENGTH,
        "title",
        "must not be more than 500 bytes long",
    );

    v.check(year != 0, "year", "must be provided");
    v.check(year >= MIN_MOVIE_YEAR, "year", "must be greater than 1888");
    v.check(
        year <= Utc::now().year(),
        "year",
        "must not be in the future",
    );

    v.check(runtime != 0, "runtime", "must be provided");
    v.check(runtime > 0, "runtime", "must be a positive integer");

    v.check(!genres.is_empty(), "genres", "must contain at least 1 genre");
    v.check(
        genres.len() <= MAX_GENRES,
        "genres",
        "must not contain more than 5 genres",
    );
    let unique: HashSet<&str> = genres.iter().map(String::as_str).collect();
    v.check(
        unique.len() == genres.len(),
        "genres",
        "must not contain duplicate values",
    );
}
