//! Progress and status channel between a running pipeline and its caller.
//!
//! A pipeline writes through an [`EventSink`]; the caller drains the matching
//! [`PipelineHandle`]. Events arrive in the order they were sent, and every run ends with
//! exactly one terminal event ([`PipelineEvent::Finished`] or [`PipelineEvent::Failed`]).

use async_stream::stream;
use futures_core::Stream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Per-unit status shown against the caller's row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemStatus {
    /// Selected and waiting for its turn.
    Queued,
    /// Currently being processed.
    InProgress,
    /// No PDF attachment among the item's children.
    NoAttachment,
    /// Fetching, generation, or the write call failed.
    Error,
    /// The note was created.
    Completed,
    /// The backend reported the note write as failed.
    FailedToPersist,
}

impl ItemStatus {
    /// Display label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Queued => "Pending",
            Self::InProgress => "Summarizing...",
            Self::NoAttachment => "Error: PDF not found",
            Self::Error => "Error",
            Self::Completed => "Done",
            Self::FailedToPersist => "Failed",
        }
    }

    /// Whether this status ends the unit's processing.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Queued | Self::InProgress)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single event emitted by a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent<T> {
    /// Free-text progress line.
    Progress(String),
    /// Non-fatal data-quality warning.
    Warning(String),
    /// Status change for the unit correlated with `row`.
    Status {
        /// Caller-owned correlation token.
        row: usize,
        /// New status.
        status: ItemStatus,
    },
    /// Item-level failure description.
    ItemError(String),
    /// The run ended and produced `T`.
    Finished(T),
    /// The run aborted with a fatal error.
    Failed(String),
}

impl<T> PipelineEvent<T> {
    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_) | Self::Failed(_))
    }
}

/// Sending half of the channel, owned by the pipeline.
///
/// Sends never fail from the pipeline's point of view; if the caller dropped its handle the
/// events are discarded and the run carries on.
#[derive(Debug)]
pub struct EventSink<T> {
    tx: UnboundedSender<PipelineEvent<T>>,
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> EventSink<T> {
    fn send(&self, event: PipelineEvent<T>) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Pipeline event dropped; receiver closed");
        }
    }

    /// Emit a progress line.
    pub fn progress(&self, message: impl Into<String>) {
        self.send(PipelineEvent::Progress(message.into()));
    }

    /// Emit a warning.
    pub fn warning(&self, message: impl Into<String>) {
        self.send(PipelineEvent::Warning(message.into()));
    }

    /// Emit a status change for `row`.
    pub fn status(&self, row: usize, status: ItemStatus) {
        self.send(PipelineEvent::Status { row, status });
    }

    /// Emit an item-level error.
    pub fn item_error(&self, message: impl Into<String>) {
        self.send(PipelineEvent::ItemError(message.into()));
    }

    /// Emit the successful terminal event.
    pub fn finish(&self, output: T) {
        self.send(PipelineEvent::Finished(output));
    }

    /// Emit the fatal terminal event.
    pub fn fail(&self, message: impl Into<String>) {
        self.send(PipelineEvent::Failed(message.into()));
    }
}

/// Create a connected sink and receiver.
pub fn event_channel<T>() -> (EventSink<T>, UnboundedReceiver<PipelineEvent<T>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, rx)
}

/// Caller-side view of a spawned run.
pub struct PipelineHandle<T> {
    events: UnboundedReceiver<PipelineEvent<T>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> PipelineHandle<T> {
    pub(crate) fn new(
        events: UnboundedReceiver<PipelineEvent<T>>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            cancel,
            task,
        }
    }

    /// Next event, or `None` once the run has ended and every event was drained.
    pub async fn next_event(&mut self) -> Option<PipelineEvent<T>> {
        self.events.recv().await
    }

    /// Request a cooperative stop. Only pipelines that observe the token react to it.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Token observed by the run, for wiring into signal handlers.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Forcefully abort the run. No terminal event is guaranteed afterwards.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Whether the background task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Drain every remaining event, wait for the task to end, and return the terminal event
    /// if the run produced one.
    pub async fn wait(mut self) -> Option<PipelineEvent<T>> {
        let mut last = None;
        while let Some(event) = self.events.recv().await {
            if event.is_terminal() {
                last = Some(event);
            }
        }
        if let Err(error) = self.task.await {
            tracing::debug!(error = %error, "Pipeline task ended abnormally");
        }
        last
    }

    /// Consume the handle as a stream of events ending after the terminal event.
    pub fn into_stream(self) -> impl Stream<Item = PipelineEvent<T>> {
        let Self {
            mut events, task, ..
        } = self;
        stream! {
            while let Some(event) = events.recv().await {
                let terminal = event.is_terminal();
                yield event;
                if terminal {
                    break;
                }
            }
            drop(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn events_arrive_in_send_order() {
        let (sink, rx) = event_channel::<u8>();
        let task = tokio::spawn(async move {
            sink.progress("one");
            sink.status(3, ItemStatus::InProgress);
            sink.warning("careful");
            sink.finish(7);
        });
        let handle = PipelineHandle::new(rx, CancellationToken::new(), task);

        let events: Vec<_> = handle.into_stream().collect().await;
        assert_eq!(
            events,
            vec![
                PipelineEvent::Progress("one".into()),
                PipelineEvent::Status {
                    row: 3,
                    status: ItemStatus::InProgress
                },
                PipelineEvent::Warning("careful".into()),
                PipelineEvent::Finished(7),
            ]
        );
    }

    #[tokio::test]
    async fn stop_cancels_the_shared_token() {
        let (_sink, rx) = event_channel::<()>();
        let cancel = CancellationToken::new();
        let observed = cancel.clone();
        let task = tokio::spawn(async move { observed.cancelled().await });
        let handle = PipelineHandle::new(rx, cancel, task);

        handle.stop();
        assert!(handle.cancellation_token().is_cancelled());
    }

    #[test]
    fn labels_match_table_text() {
        assert_eq!(ItemStatus::InProgress.label(), "Summarizing...");
        assert_eq!(ItemStatus::NoAttachment.label(), "Error: PDF not found");
        assert!(ItemStatus::FailedToPersist.is_terminal());
        assert!(!ItemStatus::Queued.is_terminal());
    }
}
