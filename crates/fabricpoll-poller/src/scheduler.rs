//! Fixed-interval background scheduler
//!
//! Runs a callback once per interval on a dedicated tokio task. The first
//! invocation happens one full interval after `start`. Invocations never
//! overlap: the callback is awaited inline, and ticks that fall due while it
//! is still running are skipped rather than queued. A stop request is only
//! seen between invocations, so an in-flight callback always completes.

use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn, Instrument, Span};

use crate::error::PollError;

struct Running {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Scheduler lifecycle: `Stopped` → `Running` → `Stopped`
pub struct PollScheduler {
    span: Span,
    running: Option<Running>,
}

impl PollScheduler {
    /// Scheduler whose task logs within `span`
    pub fn new(span: Span) -> Self {
        Self {
            span,
            running: None,
        }
    }

    /// Start invoking `callback` every `interval`
    pub fn start<F, Fut>(&mut self, interval: Duration, mut callback: F) -> Result<(), PollError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(PollError::InvalidConfiguration(
                "poll interval must be positive".to_string(),
            ));
        }
        if self.is_running() {
            return Err(PollError::AlreadyRunning);
        }

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task = async move {
            let mut next = Instant::now() + interval;
            info!(interval_secs = interval.as_secs_f64(), "Poll scheduler started");

            loop {
                tokio::select! {
                    biased;
                    // Explicit stop, or the scheduler handle was dropped
                    _ = &mut stop_rx => break,
                    _ = sleep_until(next) => {
                        callback().await;

                        next += interval;
                        let now = Instant::now();
                        let mut skipped = 0u32;
                        while next <= now {
                            next += interval;
                            skipped += 1;
                        }
                        if skipped > 0 {
                            debug!(skipped = skipped, "Poll overran its interval, skipping ticks");
                        }
                    }
                }
            }

            info!("Poll scheduler stopped");
        };

        let handle = tokio::spawn(task.instrument(self.span.clone()));
        self.running = Some(Running { stop_tx, handle });
        Ok(())
    }

    /// Stop the task, waiting for an in-flight invocation to finish.
    /// Stopping a stopped scheduler does nothing.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.stop_tx.send(());
        if let Err(e) = running.handle.await {
            warn!(parent: &self.span, error = %e, "Poll task ended abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        // Dropping the sender wakes the task; it exits after any in-flight
        // invocation. Use `stop().await` to wait for that.
        if self.running.take().is_some() {
            debug!(parent: &self.span, "Poll scheduler dropped while running");
        }
    }
}
