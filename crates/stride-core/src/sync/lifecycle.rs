//! Periodic background polling

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::engine::{SyncOutcome, SyncService, SyncTrigger};
use super::transport::SyncTransport;

/// Poll delay that doubles on every failure and resets on success
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        let factor = 1_u32 << self.failures.min(16);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn record_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.delay()
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub const fn failures(&self) -> u32 {
        self.failures
    }
}

/// Background poller; dropping the handle aborts it
pub struct PollingHandle {
    shutdown: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl PollingHandle {
    /// Stop polling and wait for an in-flight round to finish
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(task) = self.task.take() {
            task.await.ok();
        }
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Spawn the poll loop on the current runtime.
///
/// The loop sleeps while polling is stopped or conflicts are pending, and
/// runs a [`SyncTrigger::Poll`] round after every delay otherwise.
pub fn spawn_polling<T: SyncTransport>(service: SyncService<T>) -> PollingHandle {
    let shutdown = Arc::new(Notify::new());
    let task = tokio::spawn(poll_loop(service, Arc::clone(&shutdown)));
    PollingHandle {
        shutdown,
        task: Some(task),
    }
}

async fn poll_loop<T: SyncTransport>(service: SyncService<T>, shutdown: Arc<Notify>) {
    let settings = service.settings();
    let mut backoff = Backoff::new(settings.poll_interval, settings.max_backoff);
    info!(interval = ?settings.poll_interval, "Sync polling started");

    loop {
        tokio::select! {
            () = service.wait_until_pollable() => {}
            () = shutdown.notified() => break,
        }
        tokio::select! {
            () = tokio::time::sleep(backoff.delay()) => {}
            () = shutdown.notified() => break,
        }

        match service.request_sync(SyncTrigger::Poll).await {
            Ok(SyncOutcome::Completed(_)) => backoff.reset(),
            Ok(SyncOutcome::Failed(_) | SyncOutcome::TimedOut) => {
                let delay = backoff.record_failure();
                debug!(failures = backoff.failures(), ?delay, "Backing off sync polling");
            }
            Ok(SyncOutcome::Offline) => break,
            Ok(_) => {}
            Err(error) => {
                let delay = backoff.record_failure();
                error!(?delay, "Sync poll failed: {error}");
            }
        }
    }

    info!("Sync polling stopped");
}
