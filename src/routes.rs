//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │     Metrics      │ ← /debug/vars counters, Prometheus facade
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response spans
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Panic Recovery  │ ← 500 + Connection: close
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← trusted origins, preflight answers
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 429 + Retry-After
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Authentication  │ ← 401 on a bad bearer token, Vary: Authorization
//! └────────┬─────────┘
//!          ▼
//!       Router → per-route guard → Handler
//! ```
//!
//! # Route Groups
//!
//! - `/v1/healthcheck`, `/debug/vars` - Health & monitoring
//! - `/v1/users`, `/v1/tokens` - Account lifecycle
//! - `/v1/movies` - Permission guarded catalog

use axum::Router;
use axum::handler::Handler;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post, put};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers;
use crate::middleware::{
    AuthenticateLayer, Guards, MetricsLayer, RateLimitLayer, TrustedProxyConfig, recover_panic,
};
use crate::models::{MOVIES_READ, MOVIES_WRITE};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
///
/// Rate limiting is skipped when the state carries no limiter registry; CORS
/// only echoes origins listed in `cors_trusted_origins`.
pub fn build_router(state: AppState) -> Router {
    let guards = Guards::new(state.stores.permissions.clone());

    // =========================================================================
    // Routes
    // =========================================================================
    let router = Router::new()
        // Health and diagnostics
        .route("/v1/healthcheck", get(handlers::healthcheck))
        .route("/debug/vars", get(handlers::debug_vars))
        // Movies
        .route(
            "/v1/movies",
            get(handlers::list_movies.layer(guards.permission(MOVIES_READ)))
                .post(handlers::create_movie.layer(guards.permission(MOVIES_WRITE))),
        )
        .route(
            "/v1/movies/{id}",
            get(handlers::show_movie.layer(guards.permission(MOVIES_READ)))
                .patch(handlers::update_movie.layer(guards.permission(MOVIES_WRITE)))
                .delete(handlers::delete_movie.layer(guards.permission(MOVIES_WRITE))),
        )
        // Users
        .route("/v1/users", post(handlers::register_user))
        .route("/v1/users/activated", put(handlers::activate_user))
        .route("/v1/users/password", put(handlers::reset_password))
        // Tokens
        .route(
            "/v1/tokens/authentication",
            post(handlers::create_authentication_token),
        )
        .route("/v1/tokens/activation", post(handlers::create_activation_token))
        .route(
            "/v1/tokens/password-reset",
            post(handlers::create_password_reset_token),
        );

    with_middleware(router, state)
}

/// Wrap `router` in the request pipeline and attach the state.
fn with_middleware(router: Router<AppState>, state: AppState) -> Router {
    let config = &state.config;

    // =========================================================================
    // Middleware Stack
    // =========================================================================
    match &state.limiter {
        Some(_) => info!(
            rps = config.limiter_rps,
            burst = config.limiter_burst,
            trusted_proxies = config.trusted_proxies.len(),
            "Rate limiting enabled"
        ),
        None => info!("Rate limiting disabled (LIMITER_ENABLED=false)"),
    }

    let pipeline = ServiceBuilder::new()
        .layer(MetricsLayer::new(state.request_metrics.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(recover_panic))
        .layer(build_cors_layer(&config.cors_trusted_origins))
        .layer(RateLimitLayer::new(
            state.limiter.clone(),
            TrustedProxyConfig::new(&config.trusted_proxies),
        ))
        .layer(AuthenticateLayer::new(
            state.tokens.clone(),
            state.stores.users.clone(),
        ));

    router.layer(pipeline).with_state(state)
}

/// Build the CORS layer from the trusted origin list.
///
/// `*` and unparsable entries are ignored: only explicitly listed origins
/// are echoed back.
fn build_cors_layer(trusted_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = trusted_origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    info!(origins = origins.len(), "CORS trusted origins configured");

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::OPTIONS, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}
