//! Bearer-token authentication.
//!
//! Runs on every request. It resolves `Authorization: Bearer <token>` to an
//! [`Identity`] and stores it in the request extensions for guards and
//! handlers. Requests without the header, or with an empty one, proceed as [`Identity::Anonymous`].
//!
//! | Header                                | Outcome                          |
//! |---------------------------------------|----------------------------------|
//! | absent or empty                       | anonymous, request continues     |
//! | not `Bearer <token>`                  | 401 `invalid_authentication_token` |
//! | malformed, unknown or expired token   | 401 `invalid_authentication_token` |
//! | token owner no longer exists          | 401 `invalid_authentication_token` |
//! | store failure                         | 500                              |
//!
//! Every response carries `Vary: Authorization` so caches never serve one
//! user's response to another.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, VARY};
use axum::http::{HeaderMap, HeaderValue, Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::{Identity, Scope};
use crate::services::{TokenError, TokenService};
use crate::store::{StoreError, UserStore};

/// `<token>` from `Bearer <token>`, exactly two space-separated parts.
fn bearer_token(value: &str) -> Option<&str> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token),
        _ => None,
    }
}

/// Resolve the caller's identity from request headers.
pub async fn authenticate(
    headers: &HeaderMap,
    tokens: &TokenService,
    users: &dyn UserStore,
) -> AppResult<Identity> {
    let Some(value) = headers
        .get(AUTHORIZATION)
        .filter(|value| !value.as_bytes().is_empty())
    else {
        return Ok(Identity::Anonymous);
    };

    let token = value
        .to_str()
        .ok()
        .and_then(bearer_token)
        .ok_or(AppError::InvalidAuthenticationToken)?;

    let user_id = match tokens.resolve(Scope::Authentication, token).await {
        Ok(user_id) => user_id,
        Err(TokenError::Malformed | TokenError::NotFound) => {
            return Err(AppError::InvalidAuthenticationToken);
        }
        Err(e) => return Err(AppError::Internal(e.to_string())),
    };

    match users.get_by_id(user_id).await {
        Ok(user) => {
            debug!(user_id = user.id, "Request authenticated");
            Ok(Identity::User(user))
        }
        Err(StoreError::NotFound) => Err(AppError::InvalidAuthenticationToken),
        Err(e) => Err(e.into()),
    }
}

#[derive(Clone)]
pub struct AuthenticateLayer {
    tokens: TokenService,
    users: Arc<dyn UserStore>,
}

impl AuthenticateLayer {
    pub fn new(tokens: TokenService, users: Arc<dyn UserStore>) -> Self {
        Self { tokens, users }
    }
}

impl<S> Layer<S> for AuthenticateLayer {
    type Service = AuthenticateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthenticateService {
            inner,
            tokens: self.tokens.clone(),
            users: self.users.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthenticateService<S> {
    inner: S,
    tokens: TokenService,
    users: Arc<dyn UserStore>,
}

impl<S> Service<Request<Body>> for AuthenticateService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let tokens = self.tokens.clone();
        let users = self.users.clone();

        Box::pin(async move {
            let identity = authenticate(req.headers(), &tokens, users.as_ref()).await;
            let mut response = match identity {
                Ok(identity) => {
                    req.extensions_mut().insert(identity);
                    inner.call(req).await?
                }
                Err(e) => e.into_response(),
            };

            response
                .headers_mut()
                .append(VARY, HeaderValue::from_static("Authorization"));
            Ok(response)
        })
    }
}
