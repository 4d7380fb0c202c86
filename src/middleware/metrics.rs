//! Outermost request accounting.
//!
//! Counts requests received, responses sent, responses per status code and
//! cumulative processing time in microseconds. The status recorded is the
//! final one, after every inner layer (including panic recovery) has run.
//! Counters feed both the `/debug/vars` snapshot and the Prometheus facade.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::http::{Request, Response, StatusCode};
use parking_lot::Mutex;
use tower::{Layer, Service};

use crate::metrics;
use crate::models::RequestCounters;

#[derive(Debug, Default)]
pub struct RequestMetrics {
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    processing_time_us: AtomicU64,
    by_status: Mutex<BTreeMap<u16, u64>>,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self, status: StatusCode, elapsed: Duration) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.processing_time_us.fetch_add(
            u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        *self.by_status.lock().entry(status.as_u16()).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> RequestCounters {
        RequestCounters {
            total_requests_received: self.requests_received.load(Ordering::Relaxed),
            total_responses_sent: self.responses_sent.load(Ordering::Relaxed),
            total_processing_time_us: self.processing_time_us.load(Ordering::Relaxed),
            total_responses_sent_by_status: self
                .by_status
                .lock()
                .iter()
                .map(|(status, count)| (status.to_string(), *count))
                .collect(),
        }
    }
}

#[derive(Clone)]
pub struct MetricsLayer {
    metrics: Arc<RequestMetrics>,
}

impl MetricsLayer {
    pub fn new(metrics: Arc<RequestMetrics>) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    metrics: Arc<RequestMetrics>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for MetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mut inner = self.inner.clone();
        let recorder = self.metrics.clone();
        let method = req.method().clone();
        let started = Instant::now();
        recorder.record_request();

        Box::pin(async move {
            let response = inner.call(req).await?;
            let elapsed = started.elapsed();
            let status = response.status();

            recorder.record_response(status, elapsed);
            metrics::record_request_duration(
                method.as_str(),
                status.as_str(),
                elapsed.as_secs_f64(),
            );

            Ok(response)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_accumulates() {
        let metrics = RequestMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_response(StatusCode::OK, Duration::from_micros(150));
        metrics.record_response(StatusCode::TOO_MANY_REQUESTS, Duration::from_micros(50));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests_received, 2);
        assert_eq!(snapshot.total_responses_sent, 2);
        assert_eq!(snapshot.total_processing_time_us, 200);
        assert_eq!(snapshot.total_responses_sent_by_status.get("200"), Some(&1));
        assert_eq!(snapshot.total_responses_sent_by_status.get("429"), Some(&1));
    }
}
