//! Owned periodic poll driver.
//!
//! A [`PollingScheduler`] runs one tokio task that invokes its tick closure
//! once per interval. Ticks are awaited one at a time, so at most one poll
//! is ever in flight; ticks that elapse while a poll is outstanding are
//! skipped rather than queued. Stopping cancels the task and drops any poll
//! that is still in flight.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[derive(Debug)]
pub struct PollingScheduler {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollingScheduler {
    /// Spawn the poll loop. The first tick fires one full `period` after start.
    ///
    /// The loop ends when `tick` returns [`ControlFlow::Break`], or when the
    /// scheduler is stopped, disposed or dropped.
    pub fn start<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send,
    {
        let token = CancellationToken::new();
        let stopped = token.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!(period_ms = period.as_millis() as u64, "Polling scheduler started");

            loop {
                tokio::select! {
                    biased;
                    _ = stopped.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let flow = tokio::select! {
                    biased;
                    _ = stopped.cancelled() => {
                        trace!("Dropping in-flight poll");
                        break;
                    }
                    flow = tick() => flow,
                };

                if flow.is_break() {
                    break;
                }
            }
            debug!("Polling scheduler stopped");
        });

        Self {
            token,
            task: Some(task),
        }
    }

    /// Stop ticking. Idempotent; any poll in flight is discarded.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop and wait until the poll task has fully exited.
    pub async fn dispose(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            // A panicking tick has already been logged by the runtime.
            let _ = task.await;
        }
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
