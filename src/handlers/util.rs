//! Shared utilities for handlers.

use axum::extract::FromRequest;
use axum::extract::rejection::JsonRejection;
use serde_json::Value;
use tracing::error;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::Password;
use crate::services::MailMessage;
use crate::state::AppState;

/// JSON body extractor whose rejections render as [`AppError::BadRequest`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// Hash a password on the blocking pool.
pub async fn hash_password(plaintext: String) -> AppResult<Password> {
    tokio::task::spawn_blocking(move || Password::hash(&plaintext))
        .await
        .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Check a password on the blocking pool.
pub async fn password_matches(password: Password, plaintext: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || password.matches(&plaintext))
        .await
        .map_err(|e| AppError::Internal(format!("password check task failed: {e}")))?
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Queue a mail on the background runner.
///
/// Delivery failures are logged; the request has already been answered.
pub fn send_mail_in_background(state: &AppState, recipient: &str, template: &'static str, data: Value) {
    let mailer = state.mailer.clone();
    let message = MailMessage::new(recipient, template, data);

    state.background.spawn("send_mail", async move {
        if let Err(e) = mailer.send(&message).await {
            error!(template = %message.template, error = %e, "Failed to send mail");
            metrics::record_mail_failure(&message.template);
        }
    });
}
