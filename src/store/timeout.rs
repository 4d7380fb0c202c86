//! Store decorator that bounds every call with a deadline.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{MovieStore, PermissionStore, StoreError, StoreFuture, TokenStore, UserStore};
use crate::models::{
    Movie, MovieId, NewMovie, NewUser, Permissions, Scope, TokenHash, TokenRecord, User, UserId,
};

/// Wraps any backend so no call can outlive `timeout`.
#[derive(Clone, Debug)]
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

fn bounded<'a, T: Send + 'a>(
    operation: &'static str,
    timeout: Duration,
    call: StoreFuture<'a, T>,
) -> StoreFuture<'a, T> {
    Box::pin(async move {
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = timeout.as_millis() as u64,
                    "Store call timed out"
                );
                Err(StoreError::Timeout)
            }
        }
    })
}

impl<S: UserStore> UserStore for TimeoutStore<S> {
    fn insert(&self, user: NewUser) -> StoreFuture<'_, User> {
        bounded("users.insert", self.timeout, self.inner.insert(user))
    }

    fn get_by_id(&self, id: UserId) -> StoreFuture<'_, User> {
        bounded("users.get_by_id", self.timeout, self.inner.get_by_id(id))
    }

    fn get_by_email<'a>(&'a self, email: &'a str) -> StoreFuture<'a, User> {
        bounded("users.get_by_email", self.timeout, self.inner.get_by_email(email))
    }

    fn update(&self, user: User) -> StoreFuture<'_, User> {
        bounded("users.update", self.timeout, self.inner.update(user))
    }
}

impl<S: TokenStore> TokenStore for TimeoutStore<S> {
    fn insert(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
        bounded("tokens.insert", self.timeout, self.inner.insert(record))
    }

    fn find(&self, scope: Scope, hash: TokenHash, now: DateTime<Utc>) -> StoreFuture<'_, UserId> {
        bounded("tokens.find", self.timeout, self.inner.find(scope, hash, now))
    }

    fn delete_all_for_user(&self, scope: Scope, user_id: UserId) -> StoreFuture<'_, u64> {
        bounded(
            "tokens.delete_all_for_user",
            self.timeout,
            self.inner.delete_all_for_user(scope, user_id),
        )
    }
}

impl<S: PermissionStore> PermissionStore for TimeoutStore<S> {
    fn get_all_for_user(&self, user_id: UserId) -> StoreFuture<'_, Permissions> {
        bounded(
            "permissions.get_all_for_user",
            self.timeout,
            self.inner.get_all_for_user(user_id),
        )
    }

    fn add_for_user(&self, user_id: UserId, codes: Vec<String>) -> StoreFuture<'_, ()> {
        bounded(
            "permissions.add_for_user",
            self.timeout,
            self.inner.add_for_user(user_id, codes),
        )
    }
}

impl<S: MovieStore> MovieStore for TimeoutStore<S> {
    fn insert(&self, movie: NewMovie) -> StoreFuture<'_, Movie> {
        bounded("movies.insert", self.timeout, self.inner.insert(movie))
    }

    fn get(&self, id: MovieId) -> StoreFuture<'_, Movie> {
        bounded("movies.get", self.timeout, self.inner.get(id))
    }

    fn list(&self) -> StoreFuture<'_, Vec<Movie>> {
        bounded("movies.list", self.timeout, self.inner.list())
    }

    fn update(&self, movie: Movie) -> StoreFuture<'_, Movie> {
        bounded("movies.update", self.timeout, self.inner.update(movie))
    }

    fn delete(&self, id: MovieId) -> StoreFuture<'_, ()> {
        bounded("movies.delete", self.timeout, self.inner.delete(id))
    }
}
