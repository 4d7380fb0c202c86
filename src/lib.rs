//! # Greenlight
//!
//! A JSON API for a movie catalog, built around a request pipeline that
//! protects and authenticates access:
//!
//! - **Rate limiting**: per-client token buckets keyed by IP, swept when idle
//! - **Authentication**: opaque bearer tokens stored only as SHA-256 hashes
//! - **Authorization**: per-route guards for activation and permission codes
//! - **Background work**: mail delivery off the request path, drained at shutdown
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pipeline (Metrics → Trace → Recover → CORS → Limit → Auth) │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Guards (authenticated → activated → permission)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, users, tokens, movies)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Services (TokenService, Mailer, BackgroundRunner)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Stores (users, tokens, permissions, movies)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use greenlight::services::LogMailer;
//! use greenlight::{AppState, Config, Stores, build_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let stores = Stores::in_memory(config.store_timeout);
//!
//!     let state = AppState::new(config, stores, Arc::new(LogMailer))?;
//!     let app = build_router(state);
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```

pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::AppState;
pub use store::Stores;
