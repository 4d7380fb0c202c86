//! Fire-and-forget background work with panic isolation.
//!
//! Handlers submit side jobs (mail delivery) that must outlive the request
//! but never take the process down. Each job runs on its own task; a panic
//! is caught at the task boundary, logged, and counted.
//!
//! # Structured Concurrency
//!
//! Jobs are tracked by a `tokio_util::task::TaskTracker`, which doubles as
//! the outstanding counter. [`BackgroundRunner::shutdown`] closes the tracker
//! and waits for the count to reach zero, bounded by a timeout. Jobs
//! submitted after shutdown began are dropped with a warning.

use std::future::Future;
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::utils::panic_message;

#[derive(Clone, Debug, Default)]
pub struct BackgroundRunner {
    tracker: TaskTracker,
}

impl BackgroundRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` in the background.
    ///
    /// Returns `false` if the runner is shutting down and the job was dropped.
    pub fn spawn<F>(&self, name: &'static str, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            warn!(task = name, "Background runner is shutting down, job dropped");
            return false;
        }

        // The outer tracked task outlives the inner one so the panic
        // surfaces as a JoinError instead of unwinding past the tracker.
        self.tracker.spawn(async move {
            match tokio::spawn(job).await {
                Ok(()) => debug!(task = name, "Background job finished"),
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic().as_ref());
                    error!(task = name, panic = %message, "Background job panicked");
                    metrics::record_background_panic(name);
                }
                Err(e) => warn!(task = name, error = %e, "Background job cancelled"),
            }
        });

        true
    }

    /// Number of jobs still running.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Stop accepting jobs and wait up to `timeout` for running ones.
    ///
    /// Returns `true` if every job finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        info!(
            outstanding = self.tracker.len(),
            "Waiting for background jobs to finish"
        );

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                info!("All background jobs completed");
                true
            }
            Err(_) => {
                warn!(
                    outstanding = self.tracker.len(),
                    timeout_secs = timeout.as_secs(),
                    "Timed out waiting for background jobs"
                );
                false
            }
        }
    }
}
