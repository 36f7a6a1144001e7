//! Owned, cancellable periodic task.
//!
//! A [`PeriodicTask`] runs a closure every `period` on the tokio runtime
//! until the closure returns `false`, [`PeriodicTask::cancel`] is called, or
//! the task value is dropped. Dropping is cancellation, so whoever owns the
//! value owns the timer.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::trace;

const MIN_PERIOD: Duration = Duration::from_millis(1);

pub struct PeriodicTask {
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn on the current runtime. The first call happens one `period`
    /// after spawning, not immediately. Periods shorter than 1 ms are
    /// raised to 1 ms.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn spawn<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !on_tick() {
                    trace!("periodic task stopped itself");
                    break;
                }
            }
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Stop the task. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// True once cancelled or once the closure asked to stop.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
