//! Observer trait for workflow notifications.
//!
//! Inject an [`Arc<dyn WorkflowObserver>`] via
//! [`crate::workflow::WorkflowController::with_observer`] to receive state
//! changes, progress percentages and notices as the workflow runs.
//!
//! # Why callbacks instead of UI handles?
//!
//! The controller never touches presentation elements. A terminal progress
//! bar, a GUI binding layer or an async channel (see [`crate::stream`]) all
//! plug in here without the controller knowing which one it is talking to.
//!
//! # Re-entrancy
//!
//! Callbacks run while the controller's state lock is held, which is what
//! keeps the delivered progress sequence monotonic. Implementations must not
//! call back into the same controller from inside a callback; forward the
//! event (e.g. through a channel) instead.
//!
//! # Example
//!
//! ```rust
//! use fileconv::{WorkflowObserver, WorkflowSnapshot};
//! use std::sync::{Arc, atomic::{AtomicU8, Ordering}};
//!
//! struct LastProgress(AtomicU8);
//!
//! impl WorkflowObserver for LastProgress {
//!     fn on_progress(&self, percent: u8) {
//!         self.0.store(percent, Ordering::SeqCst);
//!     }
//! }
//!
//! let observer: Arc<dyn WorkflowObserver> = Arc::new(LastProgress(AtomicU8::new(0)));
//! observer.on_progress(42);
//! ```

use crate::error::Notice;
use crate::workflow::WorkflowSnapshot;
use std::sync::Arc;

/// Receives workflow notifications.
///
/// All methods have default no-op implementations so observers only override
/// what they render.
pub trait WorkflowObserver: Send + Sync {
    /// Called after every state transition with the new state.
    fn on_state_change(&self, snapshot: &WorkflowSnapshot) {
        let _ = snapshot;
    }

    /// Called whenever the submission progress moves. Values are
    /// non-decreasing within one submission and reach 100 only on success.
    fn on_progress(&self, percent: u8) {
        let _ = percent;
    }

    /// Called once per user-facing error.
    ///
    /// Transient notices carry `display_for`; blocking ones stay until
    /// [`crate::workflow::WorkflowController::acknowledge_limit`].
    fn on_notice(&self, notice: &Notice) {
        let _ = notice;
    }
}

/// An observer that ignores everything.
///
/// This is the default when no observer is configured.
pub struct NoopObserver;

impl WorkflowObserver for NoopObserver {}

/// Convenience alias for the type stored in the controller.
pub type ObserverHandle = Arc<dyn WorkflowObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkflowError;
    use crate::workflow::Workflow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingObserver {
        states: AtomicUsize,
        progress: AtomicUsize,
        notices: AtomicUsize,
    }

    impl WorkflowObserver for CountingObserver {
        fn on_state_change(&self, _snapshot: &WorkflowSnapshot) {
            self.states.fetch_add(1, Ordering::SeqCst);
        }

        fn on_progress(&self, _percent: u8) {
            self.progress.fetch_add(1, Ordering::SeqCst);
        }

        fn on_notice(&self, _notice: &Notice) {
            self.notices.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_state_change(&Workflow::default().snapshot());
        o.on_progress(50);
        o.on_notice(&Notice::new(
            WorkflowError::unsupported(None),
            Duration::from_secs(4),
        ));
    }

    #[test]
    fn arc_dyn_observer_dispatches() {
        let counting = Arc::new(CountingObserver::default());
        let handle: ObserverHandle = counting.clone();

        handle.on_state_change(&Workflow::default().snapshot());
        handle.on_progress(10);
        handle.on_progress(20);
        handle.on_notice(&Notice::new(
            WorkflowError::unsupported(None),
            Duration::from_secs(4),
        ));

        assert_eq!(counting.states.load(Ordering::SeqCst), 1);
        assert_eq!(counting.progress.load(Ordering::SeqCst), 2);
        assert_eq!(counting.notices.load(Ordering::SeqCst), 1);
    }
}
