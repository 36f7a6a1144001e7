//! Streaming event API: consume workflow notifications as an async `Stream`.
//!
//! [`event_channel`] returns an observer to install on the controller and a
//! stream that yields every [`WorkflowEvent`] in emission order. Useful when
//! the rendering side lives on another task (a TUI loop, a WebSocket pump)
//! and should not run inside the controller's callbacks.

use crate::error::Notice;
use crate::progress::WorkflowObserver;
use crate::workflow::WorkflowSnapshot;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::trace;

/// One notification emitted by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    StateChanged(WorkflowSnapshot),
    Progress { percent: u8 },
    Notice(Notice),
}

/// A boxed stream of workflow events.
pub type EventStream = Pin<Box<dyn Stream<Item = WorkflowEvent> + Send>>;

/// Observer that forwards every callback into an unbounded channel.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelObserver {
    fn send(&self, event: WorkflowEvent) {
        if self.tx.send(event).is_err() {
            trace!("event stream dropped; discarding event");
        }
    }
}

impl WorkflowObserver for ChannelObserver {
    fn on_state_change(&self, snapshot: &WorkflowSnapshot) {
        self.send(WorkflowEvent::StateChanged(snapshot.clone()));
    }

    fn on_progress(&self, percent: u8) {
        self.send(WorkflowEvent::Progress { percent });
    }

    fn on_notice(&self, notice: &Notice) {
        self.send(WorkflowEvent::Notice(notice.clone()));
    }
}

/// Create a connected observer/stream pair.
///
/// The stream ends once the observer (and every controller holding it) is
/// dropped.
///
/// # Example
/// ```rust,no_run
/// use fileconv::{event_channel, ClientConfig, SelectedFile, WorkflowController, WorkflowEvent};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (observer, mut events) = event_channel();
/// let controller = WorkflowController::from_config(&ClientConfig::default())?
///     .with_observer(observer);
///
/// tokio::spawn(async move {
///     while let Some(event) = events.next().await {
///         if let WorkflowEvent::Progress { percent } = event {
///             eprintln!("{percent}%");
///         }
///     }
/// });
///
/// controller.select_file(SelectedFile::from_path("report.docx").await?).await;
/// # Ok(())
/// # }
/// ```
pub fn event_channel() -> (Arc<ChannelObserver>, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stream = UnboundedReceiverStream::new(rx);
    (Arc::new(ChannelObserver { tx }), Box::pin(stream))
}
