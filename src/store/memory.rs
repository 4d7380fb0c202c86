//! Thread-safe in-memory store for development and tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};

use super::{MovieStore, PermissionStore, StoreError, StoreFuture, TokenStore, UserStore};
use crate::models::{
    Movie, MovieId, NewMovie, NewUser, Permissions, Scope, TokenHash, TokenRecord, User, UserId,
};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    next_user_id: UserId,
    tokens: Vec<TokenRecord>,
    permissions: HashMap<UserId, HashSet<String>>,
    movies: BTreeMap<MovieId, Movie>,
    next_movie_id: MovieId,
}

type SharedTables = Arc<RwLock<Tables>>;

/// Implements every store contract over a single lock.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(SharedTables);

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_user_now(tables: SharedTables, user: NewUser) -> Result<User, StoreError> {
        let mut guard = tables.write();
        if guard
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::DuplicateEmail);
        }

        guard.next_user_id += 1;
        let stored = User {
            id: guard.next_user_id,
            created_at: Utc::now(),
            name: user.name,
            email: user.email,
            password: user.password,
            activated: user.activated,
            version: 1,
        };
        guard.users.insert(stored.id, stored.clone());

        Ok(stored)
    }

    fn update_user_now(tables: SharedTables, user: User) -> Result<User, StoreError> {
        let mut guard = tables.write();
        let current_version = guard
            .users
            .get(&user.id)
            .map(|u| u.version)
            .ok_or(StoreError::EditConflict)?;
        if current_version != user.version {
            return Err(StoreError::EditConflict);
        }
        if guard
            .users
            .values()
            .any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::DuplicateEmail);
        }

        let stored = User {
            version: user.version + 1,
            ..user
        };
        guard.users.insert(stored.id, stored.clone());

        Ok(stored)
    }

    fn insert_token_now(tables: SharedTables, record: TokenRecord) {
        let mut guard = tables.write();
        let now = Utc::now();
        guard.tokens.retain(|t| t.is_live_at(now));
        guard.tokens.push(record);
    }

    /// Scans every record, folding the match into constant-time selections so
    /// the work done does not depend on where (or whether) a match sits.
    fn find_token_now(
        tables: SharedTables,
        scope: Scope,
        hash: TokenHash,
        now: DateTime<Utc>,
    ) -> Result<UserId, StoreError> {
        let guard = tables.read();
        let mut found = Choice::from(0);
        let mut owner: UserId = 0;

        for record in &guard.tokens {
            let matched = record.hash.as_slice().ct_eq(hash.as_slice())
                & record.scope.code().ct_eq(&scope.code())
                & Choice::from(u8::from(record.is_live_at(now)));
            owner = UserId::conditional_select(&owner, &record.user_id, matched);
            found |= matched;
        }

        if bool::from(found) {
            Ok(owner)
        } else {
            Err(StoreError::NotFound)
        }
    }

    fn delete_tokens_now(tables: SharedTables, scope: Scope, user_id: UserId) -> u64 {
        let mut guard = tables.write();
        let before = guard.tokens.len();
        guard
            .tokens
            .retain(|t| !(t.scope == scope && t.user_id == user_id));
        (before - guard.tokens.len()) as u64
    }

    fn update_movie_now(tables: SharedTables, movie: Movie) -> Result<Movie, StoreError> {
        let mut guard = tables.write();
        let current = guard
            .movies
            .get(&movie.id)
            .map(|m| m.version)
            .ok_or(StoreError::EditConflict)?;
        if current != movie.version {
            return Err(StoreError::EditConflict);
        }

        let stored = Movie {
            version: movie.version + 1,
            ..movie
        };
        guard.movies.insert(stored.id, stored.clone());

        Ok(stored)
    }
}

impl UserStore for MemoryStore {
    fn insert(&self, user: NewUser) -> StoreFuture<'_, User> {
        let tables = self.0.clone();

        Box::pin(async move { Self::insert_user_now(tables, user) })
    }

    fn get_by_id(&self, id: UserId) -> StoreFuture<'_, User> {
        let tables = self.0.clone();

        Box::pin(async move { tables.read().users.get(&id).cloned().ok_or(StoreError::NotFound) })
    }

    fn get_by_email<'a>(&'a self, email: &'a str) -> StoreFuture<'a, User> {
        let tables = self.0.clone();

        Box::pin(async move {
            tables
                .read()
                .users
                .values()
                .find(|u| u.email.eq_ignore_ascii_case(email))
                .cloned()
                .ok_or(StoreError::NotFound)
        })
    }

    fn update(&self, user: User) -> StoreFuture<'_, User> {
        let tables = self.0.clone();

        Box::pin(async move { Self::update_user_now(tables, user) })
    }
}

impl TokenStore for MemoryStore {
    fn insert(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
        let tables = self.0.clone();

        Box::pin(async move {
            Self::insert_token_now(tables, record);
            Ok(())
        })
    }

    fn find(&self, scope: Scope, hash: TokenHash, now: DateTime<Utc>) -> StoreFuture<'_, UserId> {
        let tables = self.0.clone();

        Box::pin(async move { Self::find_token_now(tables, scope, hash, now) })
    }

    fn delete_all_for_user(&self, scope: Scope, user_id: UserId) -> StoreFuture<'_, u64> {
        let tables = self.0.clone();

        Box::pin(async move { Ok(Self::delete_tokens_now(tables, scope, user_id)) })
    }
}

impl PermissionStore for MemoryStore {
    fn get_all_for_user(&self, user_id: UserId) -> StoreFuture<'_, Permissions> {
        let tables = self.0.clone();

        Box::pin(async move {
            Ok(tables
                .read()
                .permissions
                .get(&user_id)
                .map(|codes| codes.iter().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn add_for_user(&self, user_id: UserId, codes: Vec<String>) -> StoreFuture<'_, ()> {
        let tables = self.0.clone();

        Box::pin(async move {
            let mut guard = tables.write();
            if !guard.users.contains_key(&user_id) {
                return Err(StoreError::NotFound);
            }
            guard.permissions.entry(user_id).or_default().extend(codes);
            Ok(())
        })
    }
}

impl MovieStore for MemoryStore {
    fn insert(&self, movie: NewMovie) -> StoreFuture<'_, Movie> {
        let tables = self.0.clone();

        Box::pin(async move {
            let mut guard = tables.write();
            guard.next_movie_id += 1;
            let stored = Movie {
                id: guard.next_movie_id,
                created_at: Utc::now(),
                title: movie.title,
                year: movie.year,
                runtime: movie.runtime,
                genres: movie.genres,
                version: 1,
            };
            guard.movies.insert(stored.id, stored.clone());
            Ok(stored)
        })
    }

    fn get(&self, id: MovieId) -> StoreFuture<'_, Movie> {
        let tables = self.0.clone();

        Box::pin(async move { tables.read().movies.get(&id).cloned().ok_or(StoreError::NotFound) })
    }

    fn list(&self) -> StoreFuture<'_, Vec<Movie>> {
        let tables = self.0.clone();

        Box::pin(async move { Ok(tables.read().movies.values().cloned().collect()) })
    }

    fn update(&self, movie: Movie) -> StoreFuture<'_, Movie> {
        let tables = self.0.clone();

        Box::pin(async move { Self::update_movie_now(tables, movie) })
    }

    fn delete(&self, id: MovieId) -> StoreFuture<'_, ()> {
        let tables = self.0.clone();

        Box::pin(async move {
            tables
                .write()
                .movies
                .remove(&id)
                .map(|_| ())
                .ok_or(StoreError::NotFound)
        })
    }
}
