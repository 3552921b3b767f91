use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::RateLimiter;

/// Handle to the background task that evicts idle clients.
///
/// The task grooms the client cache once per groom interval until
/// [`shutdown`](Maintenance::shutdown) is awaited or the handle is dropped.
/// Dropping only signals the task; `shutdown` also waits for it to exit.
#[derive(Debug)]
pub struct Maintenance {
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    limiter: Arc<RateLimiter>,
}

impl Maintenance {
    /// Spawn the grooming loop for `limiter` on the current tokio runtime.
    pub fn start(limiter: Arc<RateLimiter>) -> Self {
        let (cancel, mut cancelled) = oneshot::channel::<()>();
        let period = limiter.groom_interval();
        let shared = limiter.clone();
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut cancelled => break,
                    _ = ticker.tick() => {
                        shared.groom();
                    }
                }
            }
            log::debug!(target: shared.log_target(), "Cache grooming stopped");
        });
        log::debug!(
            target: limiter.log_target(),
            "Cache grooming every {period:?}"
        );
        Self { cancel: Some(cancel), task: Some(task), limiter }
    }

    /// The limiter being groomed.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Whether the grooming loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the grooming loop and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(cancel) = self.cancel.take() {
            // The task may already be gone, nothing to signal then.
            let _ = cancel.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!(
                    target: self.limiter.log_target(),
                    "Cache grooming task failed: {e}"
                );
            }
        }
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}
