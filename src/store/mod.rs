//! Storage contracts for users, tokens, permissions and movies.
//!
//! Every call returns a boxed future so the contracts stay object safe and
//! handlers can hold `Arc<dyn UserStore>` regardless of backend.

pub mod memory;
pub mod timeout;

pub use memory::MemoryStore;
pub use timeout::TimeoutStore;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    Movie, MovieId, NewMovie, NewUser, Permissions, Scope, TokenHash, TokenRecord, User, UserId,
};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Error type produced by every store contract.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("edit conflict")]
    EditConflict,

    #[error("store call timed out")]
    Timeout,

    #[error("backend failure: {0}")]
    Backend(String),
}

pub trait UserStore
where
    Self: Send + Sync,
{
    /// Persists a new user. Emails are unique, compared case-insensitively.
    fn insert(&self, user: NewUser) -> StoreFuture<'_, User>;

    fn get_by_id(&self, id: UserId) -> StoreFuture<'_, User>;

    fn get_by_email<'a>(&'a self, email: &'a str) -> StoreFuture<'a, User>;

    /// Writes `user` if its version still matches the stored one, bumping the version.
    fn update(&self, user: User) -> StoreFuture<'_, User>;
}

pub trait TokenStore
where
    Self: Send + Sync,
{
    fn insert(&self, record: TokenRecord) -> StoreFuture<'_, ()>;

    /// Owner of the live token with this hash and scope.
    ///
    /// Every mismatch (unknown hash, other scope, expired) is `NotFound`.
    fn find(&self, scope: Scope, hash: TokenHash, now: DateTime<Utc>) -> StoreFuture<'_, UserId>;

    /// Removes every token of `scope` owned by `user_id`, returning how many went.
    fn delete_all_for_user(&self, scope: Scope, user_id: UserId) -> StoreFuture<'_, u64>;
}

pub trait PermissionStore
where
    Self: Send + Sync,
{
    fn get_all_for_user(&self, user_id: UserId) -> StoreFuture<'_, Permissions>;

    fn add_for_user(&self, user_id: UserId, codes: Vec<String>) -> StoreFuture<'_, ()>;
}

pub trait MovieStore
where
    Self: Send + Sync,
{
    fn insert(&self, movie: NewMovie) -> StoreFuture<'_, Movie>;

    fn get(&self, id: MovieId) -> StoreFuture<'_, Movie>;

    /// All movies ordered by id.
    fn list(&self) -> StoreFuture<'_, Vec<Movie>>;

    fn update(&self, movie: Movie) -> StoreFuture<'_, Movie>;

    fn delete(&self, id: MovieId) -> StoreFuture<'_, ()>;
}

/// The set of stores a running service talks to.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub movies: Arc<dyn MovieStore>,
}

impl Stores {
    /// Use one backend for all four contracts.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserStore + TokenStore + PermissionStore + MovieStore + 'static,
    {
        Self {
            users: backend.clone(),
            tokens: backend.clone(),
            permissions: backend.clone(),
            movies: backend,
        }
    }

    /// In-process stores with every call bounded by `timeout`.
    pub fn in_memory(timeout: Duration) -> Self {
        Self::from_backend(Arc::new(TimeoutStore::new(MemoryStore::new(), timeout)))
    }
}
