//! Per-client rate limiting with idle-client eviction.
//!
//! # Algorithm
//!
//! Each client address gets its own Governor direct limiter (GCRA, a token
//! bucket measured continuously). A new client starts with a full bucket of
//! `burst` requests that refills at `rps` per second.
//!
//! # Registry
//!
//! Clients live in one map behind a single mutex. Admission and eviction both
//! take that lock, so a sweep can never remove a client between its lookup and
//! its bucket update. Every admission refreshes the client's `last_seen`; a
//! periodic sweep drops clients idle for longer than the retention window.
//!
//! # Response
//!
//! A refused request gets `429 Too Many Requests` with `Retry-After` set to
//! the seconds until the next request would be admitted.

use std::collections::HashMap;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use parking_lot::Mutex;
use thiserror::Error;
use tower::{Layer, Service};
use tracing::warn;

use super::ip::{TrustedProxyConfig, client_ip};
use crate::error::AppError;
use crate::metrics;

/// Error type for limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum RateLimitError {
    #[error("requests per second must be a positive number, got {0}")]
    InvalidRps(f64),

    #[error("burst must be greater than 0")]
    ZeroBurst,
}

struct Client {
    limiter: DefaultDirectRateLimiter,
    last_seen: Instant,
}

/// Token buckets keyed by client address.
pub struct ClientRegistry {
    clients: Mutex<HashMap<IpAddr, Client>>,
    quota: Quota,
    retention: Duration,
}

impl ClientRegistry {
    /// # Errors
    ///
    /// Rejects a zero `burst` and any `rps` that is not positive and finite
    /// or whose period between requests does not fit a `Duration`.
    pub fn new(rps: f64, burst: u32, retention: Duration) -> Result<Self, RateLimitError> {
        if !(rps.is_finite() && rps > 0.0) {
            return Err(RateLimitError::InvalidRps(rps));
        }
        let burst = NonZeroU32::new(burst).ok_or(RateLimitError::ZeroBurst)?;
        let quota = Duration::try_from_secs_f64(1.0 / rps)
            .ok()
            .and_then(Quota::with_period)
            .ok_or(RateLimitError::InvalidRps(rps))?
            .allow_burst(burst);

        Ok(Self {
            clients: Mutex::new(HashMap::new()),
            quota,
            retention,
        })
    }

    /// Admit one request from `ip`, creating its bucket on first sight.
    pub fn allow(&self, ip: IpAddr) -> bool {
        self.check(ip).is_ok()
    }

    /// Like [`allow`](Self::allow), but a refusal carries the wait until the
    /// next admissible request.
    pub fn check(&self, ip: IpAddr) -> Result<(), Duration> {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), Duration> {
        let mut clients = self.clients.lock();
        let client = clients.entry(ip).or_insert_with(|| Client {
            limiter: RateLimiter::direct(self.quota),
            last_seen: now,
        });
        client.last_seen = now;

        client
            .limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(DefaultClock::default().now()))
    }

    /// Evict clients idle for longer than the retention window.
    ///
    /// Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|_, client| now.saturating_duration_since(client.last_seen) <= self.retention);
        before - clients.len()
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rate limiting layer for the Tower middleware stack.
///
/// A `None` registry turns the layer into a pass-through.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Arc::new(ClientRegistry::new(2.0, 4, Duration::from_secs(180))?);
/// let app = Router::new()
///     .route("/v1/healthcheck", get(healthcheck))
///     .layer(RateLimitLayer::new(Some(registry), TrustedProxyConfig::default()));
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    registry: Option<Arc<ClientRegistry>>,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl RateLimitLayer {
    pub fn new(registry: Option<Arc<ClientRegistry>>, trusted_proxies: TrustedProxyConfig) -> Self {
        Self {
            registry,
            trusted_proxies: Arc::new(trusted_proxies),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            registry: self.registry.clone(),
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    registry: Option<Arc<ClientRegistry>>,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
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

        let Some(registry) = self.registry.clone() else {
            return Box::pin(async move { inner.call(req).await });
        };

        // Resolve the key before moving req
        let client = client_ip(&req, &self.trusted_proxies);

        Box::pin(async move {
            let (ip, source) = match client {
                Ok(resolved) => resolved,
                Err(e) => return Ok(AppError::Internal(e.to_string()).into_response()),
            };

            match registry.check(ip) {
                Ok(()) => inner.call(req).await,
                Err(wait) => {
                    let retry_after = wait.as_secs().max(1);
                    warn!(
                        client_ip = %ip,
                        ip_source = ?source,
                        path = %req.uri().path(),
                        retry_after_secs = retry_after,
                        "Rate limit exceeded"
                    );
                    metrics::record_rate_limit_rejection();

                    Ok(AppError::RateLimited { retry_after }.into_response())
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::thread;

    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_invalid_configuration_rejected() {
        assert!(matches!(
            ClientRegistry::new(0.0, 4, Duration::from_secs(1)),
            Err(RateLimitError::InvalidRps(_))
        ));
        assert!(matches!(
            ClientRegistry::new(f64::NAN, 4, Duration::from_secs(1)),
            Err(RateLimitError::InvalidRps(_))
        ));
        assert!(matches!(
            ClientRegistry::new(1e-30, 4, Duration::from_secs(1)),
            Err(RateLimitError::InvalidRps(_))
        ));
        assert!(matches!(
            ClientRegistry::new(2.0, 0, Duration::from_secs(1)),
            Err(RateLimitError::ZeroBurst)
        ));
    }

    #[test]
    fn test_new_client_gets_full_burst() {
        let registry = ClientRegistry::new(2.0, 4, Duration::from_secs(180)).unwrap();
        let client = ip("198.51.100.1");

        for _ in 0..4 {
            assert!(registry.allow(client));
        }
        assert!(!registry.allow(client));
    }

    #[test]
    fn test_refusal_reports_wait() {
        let registry = ClientRegistry::new(1.0, 1, Duration::from_secs(180)).unwrap();
        let client = ip("198.51.100.1");

        assert!(registry.check(client).is_ok());
        let wait = registry.check(client).unwrap_err();
        assert!(wait <= Duration::from_secs(1));
    }

    #[test]
    fn test_client_below_sustained_rate_is_never_denied() {
        let registry = ClientRegistry::new(20.0, 1, Duration::from_secs(180)).unwrap();
        let client = ip("198.51.100.1");

        for _ in 0..6 {
            assert!(registry.allow(client));
            thread::sleep(Duration::from_millis(60));
        }
    }

    #[test]
    fn test_clients_are_independent() {
        let registry = ClientRegistry::new(1.0, 1, Duration::from_secs(180)).unwrap();

        assert!(registry.allow(ip("198.51.100.1")));
        assert!(!registry.allow(ip("198.51.100.1")));
        assert!(registry.allow(ip("198.51.100.2")));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_sweep_evicts_only_idle_clients() {
        let registry = ClientRegistry::new(2.0, 4, Duration::from_secs(180)).unwrap();
        let start = Instant::now();

        registry.check_at(ip("198.51.100.1"), start).unwrap();
        registry
            .check_at(ip("198.51.100.2"), start + Duration::from_secs(120))
            .unwrap();

        let removed = registry.sweep_at(start + Duration::from_secs(200));
        assert_eq!(removed, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_evicted_client_starts_fresh() {
        let registry = ClientRegistry::new(1.0, 1, Duration::from_secs(10)).unwrap();
        let client = ip("198.51.100.1");
        let start = Instant::now();

        assert!(registry.check_at(client, start).is_ok());
        assert!(registry.check_at(client, start).is_err());

        registry.sweep_at(start + Duration::from_secs(60));
        assert!(registry.is_empty());
        assert!(registry.allow(client));
    }

    #[test]
    fn test_concurrent_admissions_never_exceed_burst() {
        let registry = Arc::new(ClientRegistry::new(0.001, 10, Duration::from_secs(180)).unwrap());
        let client = ip("198.51.100.1");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || (0..10).filter(|_| registry.allow(client)).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 10);
    }
}
