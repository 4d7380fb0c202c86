//! Shared application state for Axum handlers.
//!
//! This module provides thread-safe, clonable state that is shared across
//! all request handlers and the middleware pipeline. It includes:
//!
//! - **Stores**: user, token, permission and movie stores
//! - **Tokens**: issuing and resolving scoped tokens
//! - **Mailer**: outbound mail, always sent through the background runner
//! - **Limiter**: the per-client rate limiter registry, swept in the background
//! - **Request metrics**: counters served by `/debug/vars`
//!
//! # Structured Concurrency
//!
//! The limiter sweep is a long-lived task managed with a `TaskTracker` and
//! `CancellationToken`. Request side jobs go through [`BackgroundRunner`].
//! Call `shutdown()` once the HTTP server has stopped.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

use crate::background::BackgroundRunner;
use crate::config::Config;
use crate::metrics;
use crate::middleware::{ClientRegistry, RateLimitError, RequestMetrics};
use crate::services::{Mailer, TokenService};
use crate::store::Stores;

/// Shared application state for Axum handlers.
///
/// # Lifecycle
///
/// The limiter sweep task is spawned when the state is created:
///
/// ```rust,ignore
/// let state = AppState::new(config, Stores::in_memory(timeout), mailer)?;
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    pub stores: Stores,
    pub tokens: TokenService,
    pub mailer: Arc<dyn Mailer>,
    /// Runner for work that outlives the request
    pub background: BackgroundRunner,
    /// `None` when rate limiting is disabled
    pub limiter: Option<Arc<ClientRegistry>>,
    pub request_metrics: Arc<RequestMetrics>,
    /// Timestamp when the application started
    pub started_at: Instant,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Create application state and start the limiter sweep.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError` if the limiter settings are unusable.
    pub fn new(
        config: Config,
        stores: Stores,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, RateLimitError> {
        let limiter = if config.limiter_enabled {
            Some(Arc::new(ClientRegistry::new(
                config.limiter_rps,
                config.limiter_burst,
                config.limiter_retention,
            )?))
        } else {
            None
        };

        let state = Self {
            config: Arc::new(config),
            tokens: TokenService::new(stores.tokens.clone()),
            stores,
            mailer,
            background: BackgroundRunner::new(),
            limiter,
            request_metrics: Arc::new(RequestMetrics::new()),
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        state.spawn_limiter_sweep_task();

        Ok(state)
    }

    /// Spawn the task evicting idle clients from the limiter registry.
    fn spawn_limiter_sweep_task(&self) {
        let Some(registry) = self.limiter.clone() else {
            return;
        };
        let period = self.config.limiter_sweep_interval;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Limiter sweep task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = registry.sweep();
                        let remaining = registry.len();
                        metrics::set_rate_limiter_clients(remaining);
                        trace!(removed, remaining, "Limiter registry swept");
                    }
                }
            }

            debug!("Limiter sweep task shutting down");
        });
    }

    /// Gracefully shut down background work.
    ///
    /// Drains the background runner (bounded by `shutdown_timeout`), then
    /// cancels the sweep and waits for it.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.background.shutdown(self.config.shutdown_timeout).await;

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
