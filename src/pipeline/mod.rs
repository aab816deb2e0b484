//! Background pipelines: per-item summarization and collection aggregation.
//!
//! [`Launcher`] spawns each run as its own tokio task and hands back a [`PipelineHandle`]
//! for draining events and stopping the run. At most one run of each kind is active at a
//! time.

pub mod aggregate;
pub mod events;
pub mod render;
pub mod summarize;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::SummarySettings;
use crate::library::LibraryClient;
use crate::metrics::RunSnapshot;
use crate::summarization::SummaryGenerator;

pub use aggregate::{
    AggregateOutcome, AggregationError, AggregationJob, CITATION_BATCH_SIZE, CollectionDigest,
    ITEM_DELIMITER, run_aggregation,
};
pub use events::{EventSink, ItemStatus, PipelineEvent, PipelineHandle, event_channel};
pub use render::render_note_html;
pub use summarize::{
    NOTE_INSTRUCTION, ProcessingUnit, SummaryError, SummaryJob, run_summaries,
};

/// The two kinds of background run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    /// Per-item summarization.
    Summary,
    /// Collection aggregation.
    Aggregation,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Summary => f.write_str("summary"),
            Self::Aggregation => f.write_str("collection aggregation"),
        }
    }
}

/// Errors raised when starting a run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LaunchError {
    /// A run of the same kind has not finished yet.
    #[error("A {0} run is already in progress")]
    AlreadyRunning(PipelineKind),
}

/// Clears a busy flag when the owning task ends or is aborted.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>, kind: PipelineKind) -> Result<Self, LaunchError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| LaunchError::AlreadyRunning(kind))?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Starts pipeline runs against shared client handles.
pub struct Launcher {
    library: Arc<dyn LibraryClient>,
    reader: Arc<dyn LibraryClient>,
    generator: Arc<dyn SummaryGenerator>,
    summary_busy: Arc<AtomicBool>,
    aggregation_busy: Arc<AtomicBool>,
}

impl Launcher {
    /// `library` is the write-capable client used for aggregation and note creation;
    /// `reader` lists children and downloads attachments during summary runs.
    pub fn new(
        library: Arc<dyn LibraryClient>,
        reader: Arc<dyn LibraryClient>,
        generator: Arc<dyn SummaryGenerator>,
    ) -> Self {
        Self {
            library,
            reader,
            generator,
            summary_busy: Arc::new(AtomicBool::new(false)),
            aggregation_busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a run of `kind` is active.
    pub fn is_running(&self, kind: PipelineKind) -> bool {
        match kind {
            PipelineKind::Summary => self.summary_busy.load(Ordering::Acquire),
            PipelineKind::Aggregation => self.aggregation_busy.load(Ordering::Acquire),
        }
    }

    /// Spawn a summarization run over `units`.
    pub fn start_summaries(
        &self,
        units: Vec<ProcessingUnit>,
        settings: SummarySettings,
    ) -> Result<PipelineHandle<RunSnapshot>, LaunchError> {
        let guard = BusyGuard::acquire(&self.summary_busy, PipelineKind::Summary)?;
        let (sink, events) = event_channel();
        let cancel = CancellationToken::new();
        let job = SummaryJob {
            reader: Arc::clone(&self.reader),
            writer: Arc::clone(&self.library),
            generator: Arc::clone(&self.generator),
            settings,
            units,
        };
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            run_summaries(job, sink, token).await;
        });
        Ok(PipelineHandle::new(events, cancel, task))
    }

    /// Spawn an aggregation run rooted at `collection_key`.
    ///
    /// The returned handle's `stop` has no effect on this run; use `abort` to end it early.
    pub fn start_aggregation(
        &self,
        collection_key: impl Into<String>,
    ) -> Result<PipelineHandle<AggregateOutcome>, LaunchError> {
        let guard = BusyGuard::acquire(&self.aggregation_busy, PipelineKind::Aggregation)?;
        Ok(spawn_aggregation_task(
            Arc::clone(&self.library),
            collection_key.into(),
            Some(guard),
        ))
    }
}

/// Spawn a standalone aggregation run on `client`.
///
/// Aggregation only needs the library client, so callers without a summary setup can start
/// one directly. No busy flag is involved.
pub fn spawn_aggregation(
    client: Arc<dyn LibraryClient>,
    collection_key: impl Into<String>,
) -> PipelineHandle<AggregateOutcome> {
    spawn_aggregation_task(client, collection_key.into(), None)
}

fn spawn_aggregation_task(
    client: Arc<dyn LibraryClient>,
    collection_key: String,
    guard: Option<BusyGuard>,
) -> PipelineHandle<AggregateOutcome> {
    let (sink, events) = event_channel();
    let job = AggregationJob {
        client,
        collection_key,
    };
    let task = tokio::spawn(async move {
        let _guard = guard;
        run_aggregation(job, sink).await;
    });
    PipelineHandle::new(events, CancellationToken::new(), task)
}
