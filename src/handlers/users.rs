//! Account lifecycle endpoints.
//!
//! - `POST /v1/users` - register, then mail an activation token
//! - `PUT /v1/users/activated` - redeem an activation token
//! - `PUT /v1/users/password` - redeem a password-reset token

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::json;
use tracing::{info, instrument};

use super::util::{ApiJson, hash_password, send_mail_in_background};
use crate::error::{AppError, AppResult};
use crate::models::{
    MOVIES_READ, MessageResponse, NewUser, RegisterUserRequest, ResetPasswordRequest, Scope,
    TokenRequest, UserId, UserResponse,
};
use crate::services::TokenError;
use crate::state::AppState;
use crate::store::StoreError;
use crate::validation::{
    Validator, validate_email, validate_name, validate_password_plaintext,
    validate_token_plaintext,
};

/// Register a new, inactive account.
///
/// The account is granted `movies:read` and an activation token is mailed
/// in the background. Responds `202 Accepted` since delivery is pending.
#[instrument(skip(state, payload))]
pub async fn register_user(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let mut v = Validator::new();
    validate_name(&mut v, &payload.name);
    validate_email(&mut v, &payload.email);
    validate_password_plaintext(&mut v, &payload.password);
    v.finish()?;

    let password = hash_password(payload.password).await?;
    let new_user = NewUser {
        name: payload.name,
        email: payload.email,
        password,
        activated: false,
    };

    let user = match state.stores.users.insert(new_user).await {
        Ok(user) => user,
        Err(StoreError::DuplicateEmail) => {
            return Err(AppError::field(
                "email",
                "a user with this email address already exists",
            ));
        }
        Err(e) => return Err(e.into()),
    };

    state
        .stores
        .permissions
        .add_for_user(user.id, vec![MOVIES_READ.to_string()])
        .await?;

    let token = state
        .tokens
        .issue(user.id, state.config.activation_token_ttl, Scope::Activation)
        .await?;

    send_mail_in_background(
        &state,
        &user.email,
        "user_welcome",
        json!({
            "activationToken": token.plaintext,
            "userID": user.id,
        }),
    );

    info!(user_id = user.id, "User registered");
    Ok((StatusCode::ACCEPTED, Json(UserResponse { user })))
}

/// Resolve a token for one of the redemption flows, reporting a miss as a
/// field error on `token`.
async fn redeem(state: &AppState, scope: Scope, plaintext: &str, miss: &str) -> AppResult<UserId> {
    match state.tokens.resolve(scope, plaintext).await {
        Ok(user_id) => Ok(user_id),
        Err(TokenError::NotFound | TokenError::Malformed) => Err(AppError::field("token", miss)),
        Err(e) => Err(e.into()),
    }
}

/// Activate the account owning an activation token.
///
/// Every activation token of that user is revoked afterwards.
#[instrument(skip(state, payload))]
pub async fn activate_user(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<TokenRequest>,
) -> AppResult<Json<UserResponse>> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &payload.token);
    v.finish()?;

    const MISS: &str = "invalid or expired activation token";
    let user_id = redeem(&state, Scope::Activation, &payload.token, MISS).await?;

    let mut user = match state.stores.users.get_by_id(user_id).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(AppError::field("token", MISS)),
        Err(e) => return Err(e.into()),
    };
    user.activated = true;
    let user = state.stores.users.update(user).await?;

    state.tokens.revoke_all(Scope::Activation, user.id).await?;

    info!(user_id = user.id, "User activated");
    Ok(Json(UserResponse { user }))
}

/// Set a new password using a password-reset token.
///
/// Every password-reset token of that user is revoked afterwards.
#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let mut v = Validator::new();
    validate_password_plaintext(&mut v, &payload.password);
    validate_token_plaintext(&mut v, &payload.token);
    v.finish()?;

    const MISS: &str = "invalid or expired password reset token";
    let user_id = redeem(&state, Scope::PasswordReset, &payload.token, MISS).await?;

    let mut user = match state.stores.users.get_by_id(user_id).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(AppError::field("token", MISS)),
        Err(e) => return Err(e.into()),
    };
    user.password = hash_password(payload.password).await?;
    let user = state.stores.users.update(user).await?;

    state.tokens.revoke_all(Scope::PasswordReset, user.id).await?;

    info!(user_id = user.id, "Password reset");
    Ok(Json(MessageResponse::new(
        "your password was successfully reset",
    )))
}
