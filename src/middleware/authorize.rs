//! Per-route authorization guards.
//!
//! A guard wraps a single handler and inspects the [`Identity`] placed in
//! the request extensions by the authentication layer. Checks run in a fixed
//! order and stop at the first failure:
//!
//! 1. anonymous caller: 401 `authentication_required`
//! 2. inactive account: 403 `inactive_account`
//! 3. missing permission: 403 `not_permitted`
//!
//! Permissions are read from the store on each guarded request, so grants
//! and revocations apply immediately.
//!
//! # Example
//!
//! ```rust,ignore
//! let guard = Guards::new(stores.permissions.clone());
//! Router::new().route(
//!     "/v1/movies",
//!     get(list_movies.layer(guard.permission(MOVIES_READ))),
//! );
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::Identity;
use crate::store::PermissionStore;

/// What a guarded route demands of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    Activated,
    Permission(&'static str),
}

/// Decide whether `identity` satisfies `requirement`.
///
/// A missing identity means the authentication layer did not run, which is
/// a server fault rather than a client one.
pub async fn authorize(
    identity: Option<&Identity>,
    requirement: Requirement,
    permissions: &dyn PermissionStore,
) -> AppResult<()> {
    let identity = identity
        .ok_or_else(|| AppError::Internal("identity missing from request context".to_string()))?;

    let user = match identity {
        Identity::Anonymous => return Err(AppError::AuthenticationRequired),
        Identity::User(user) => user,
    };

    if requirement == Requirement::Authenticated {
        return Ok(());
    }

    if !user.activated {
        return Err(AppError::InactiveAccount);
    }

    if let Requirement::Permission(code) = requirement {
        let held = permissions.get_all_for_user(user.id).await?;
        if !held.includes(code) {
            debug!(user_id = user.id, permission = code, "Permission denied");
            return Err(AppError::NotPermitted);
        }
    }

    Ok(())
}

/// Builds guard layers that share one permission store.
#[derive(Clone)]
pub struct Guards {
    permissions: Arc<dyn PermissionStore>,
}

impl Guards {
    pub fn new(permissions: Arc<dyn PermissionStore>) -> Self {
        Self { permissions }
    }

    pub fn authenticated(&self) -> RequireLayer {
        self.layer(Requirement::Authenticated)
    }

    pub fn activated(&self) -> RequireLayer {
        self.layer(Requirement::Activated)
    }

    pub fn permission(&self, code: &'static str) -> RequireLayer {
        self.layer(Requirement::Permission(code))
    }

    fn layer(&self, requirement: Requirement) -> RequireLayer {
        RequireLayer {
            requirement,
            permissions: self.permissions.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RequireLayer {
    requirement: Requirement,
    permissions: Arc<dyn PermissionStore>,
}

impl<S> Layer<S> for RequireLayer {
    type Service = RequireService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireService {
            inner,
            requirement: self.requirement,
            permissions: self.permissions.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RequireService<S> {
    inner: S,
    requirement: Requirement,
    permissions: Arc<dyn PermissionStore>,
}

impl<S> Service<Request<Body>> for RequireService<S>
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

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let requirement = self.requirement;
        let permissions = self.permissions.clone();
        let identity = req.extensions().get::<Identity>().cloned();

        Box::pin(async move {
            match authorize(identity.as_ref(), requirement, permissions.as_ref()).await {
                Ok(()) => inner.call(req).await,
                Err(e) => Ok(e.into_response()),
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use axum::http::StatusCode;
    use tower::{ServiceBuilder, ServiceExt};

    use super::*;
    use crate::models::{MOVIES_READ, MOVIES_WRITE, NewUser, Password, User};
    use crate::store::{MemoryStore, UserStore};

    async fn user_with(store: &MemoryStore, activated: bool, perms: &[&str]) -> User {
        let user = UserStore::insert(
            store,
            NewUser {
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                password: Password::hash("pa55word").unwrap(),
                activated,
            },
        )
        .await
        .unwrap();
        store
            .add_for_user(user.id, perms.iter().map(|p| p.to_string()).collect())
            .await
            .unwrap();
        user
    }

    #[tokio::test]
    async fn test_missing_identity_is_internal() {
        let store = MemoryStore::new();
        let err = authorize(None, Requirement::Authenticated, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn test_anonymous_needs_authentication_first() {
        let store = MemoryStore::new();
        for requirement in [
            Requirement::Authenticated,
            Requirement::Activated,
            Requirement::Permission(MOVIES_READ),
        ] {
            let err = authorize(Some(&Identity::Anonymous), requirement, &store)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::AuthenticationRequired));
        }
    }

    #[tokio::test]
    async fn test_inactive_user_is_authenticated_but_not_activated() {
        let store = MemoryStore::new();
        let identity = Identity::User(user_with(&store, false, &[MOVIES_READ]).await);

        assert!(
            authorize(Some(&identity), Requirement::Authenticated, &store)
                .await
                .is_ok()
        );
        let err = authorize(Some(&identity), Requirement::Permission(MOVIES_READ), &store)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InactiveAccount));
    }

    #[tokio::test]
    async fn test_permission_required() {
        let store = MemoryStore::new();
        let identity = Identity::User(user_with(&store, true, &[MOVIES_READ]).await);

        assert!(
            authorize(Some(&identity), Requirement::Permission(MOVIES_READ), &store)
                .await
                .is_ok()
        );
        let err = authorize(Some(&identity), Requirement::Permission(MOVIES_WRITE), &store)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotPermitted));
    }

    #[tokio::test]
    async fn test_granted_permission_applies_immediately() {
        let store = MemoryStore::new();
        let user = user_with(&store, true, &[]).await;
        let identity = Identity::User(user.clone());

        assert!(
            authorize(Some(&identity), Requirement::Permission(MOVIES_WRITE), &store)
                .await
                .is_err()
        );
        store
            .add_for_user(user.id, vec![MOVIES_WRITE.to_string()])
            .await
            .unwrap();
        assert!(
            authorize(Some(&identity), Requirement::Permission(MOVIES_WRITE), &store)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_guard_layers_wrap_a_service() {
        let store = Arc::new(MemoryStore::new());
        let identity = Identity::User(user_with(&store, false, &[]).await);
        let guards = Guards::new(store);

        let ok = |_req: Request<Body>| async {
            Ok::<_, std::convert::Infallible>(Response::new(Body::empty()))
        };
        let request = || {
            let mut req = Request::new(Body::empty());
            req.extensions_mut().insert(identity.clone());
            req
        };

        let response = ServiceBuilder::new()
            .layer(guards.authenticated())
            .service_fn(ok)
            .oneshot(request())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = ServiceBuilder::new()
            .layer(guards.activated())
            .service_fn(ok)
            .oneshot(request())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
