//! Handler panic recovery.
//!
//! Plugged into `tower_http::catch_panic::CatchPanicLayer::custom`. The
//! panicking request gets the generic internal-error body plus
//! `Connection: close`, so the client does not reuse a connection whose
//! handler state may be inconsistent.

use std::any::Any;

use axum::http::HeaderValue;
use axum::http::header::CONNECTION;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::error::AppError;
use crate::metrics;
use crate::utils::panic_message;

pub fn recover_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic_message(payload.as_ref());
    error!(panic = %message, "Request handler panicked");
    metrics::record_handler_panic();

    let mut response = AppError::Internal(format!("handler panicked: {message}")).into_response();
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}
