//! Token issuing endpoints.
//!
//! - `POST /v1/tokens/authentication` - exchange credentials for a bearer token
//! - `POST /v1/tokens/activation` - mail a fresh activation token
//! - `POST /v1/tokens/password-reset` - mail a password-reset token

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::json;
use tracing::{debug, instrument};

use super::util::{ApiJson, password_matches, send_mail_in_background};
use crate::error::{AppError, AppResult};
use crate::models::{
    AuthenticationTokenResponse, CredentialsRequest, EmailRequest, MessageResponse, Scope, User,
};
use crate::state::AppState;
use crate::store::StoreError;
use crate::validation::{Validator, validate_email, validate_password_plaintext};

/// Look up the account named in an email-only request, reporting an unknown
/// address as a field error.
async fn user_for_email(state: &AppState, email: &str) -> AppResult<User> {
    match state.stores.users.get_by_email(email).await {
        Ok(user) => Ok(user),
        Err(StoreError::NotFound) => {
            Err(AppError::field("email", "no matching email address found"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Issue an authentication token for valid credentials.
///
/// Unknown email and wrong password produce the same `401`.
#[instrument(skip(state, payload))]
pub async fn create_authentication_token(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CredentialsRequest>,
) -> AppResult<(StatusCode, Json<AuthenticationTokenResponse>)> {
    let mut v = Validator::new();
    validate_email(&mut v, &payload.email);
    validate_password_plaintext(&mut v, &payload.password);
    v.finish()?;

    let user = match state.stores.users.get_by_email(&payload.email).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(AppError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };

    if !password_matches(user.password.clone(), payload.password).await? {
        debug!(user_id = user.id, "Password mismatch");
        return Err(AppError::InvalidCredentials);
    }

    let token = state
        .tokens
        .issue(
            user.id,
            state.config.authentication_token_ttl,
            Scope::Authentication,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthenticationTokenResponse {
            authentication_token: token,
        }),
    ))
}

/// Mail a new activation token to an account that is not yet active.
#[instrument(skip(state, payload))]
pub async fn create_activation_token(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<EmailRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let mut v = Validator::new();
    validate_email(&mut v, &payload.email);
    v.finish()?;

    let user = user_for_email(&state, &payload.email).await?;
    if user.activated {
        return Err(AppError::field("email", "user has already been activated"));
    }

    let token = state
        .tokens
        .issue(user.id, state.config.activation_token_ttl, Scope::Activation)
        .await?;

    send_mail_in_background(
        &state,
        &user.email,
        "token_activation",
        json!({ "activationToken": token.plaintext }),
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(
            "an email will be sent to you containing activation instructions",
        )),
    ))
}

/// Mail a password-reset token to an activated account.
#[instrument(skip(state, payload))]
pub async fn create_password_reset_token(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<EmailRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let mut v = Validator::new();
    validate_email(&mut v, &payload.email);
    v.finish()?;

    let user = user_for_email(&state, &payload.email).await?;
    if !user.activated {
        return Err(AppError::field("email", "user account must be activated"));
    }

    let token = state
        .tokens
        .issue(
            user.id,
            state.config.password_reset_token_ttl,
            Scope::PasswordReset,
        )
        .await?;

    send_mail_in_background(
        &state,
        &user.email,
        "token_password_reset",
        json!({ "passwordResetToken": token.plaintext }),
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(
            "an email will be sent to you containing password reset instructions",
        )),
    ))
}
