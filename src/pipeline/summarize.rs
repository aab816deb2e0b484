//! Per-item summarization pipeline.
//!
//! Units are processed strictly in input order, one at a time. Each unit ends with exactly one
//! terminal status; a failing unit never stops the run. After the last unit (or after a stop
//! request) the run emits [`PipelineEvent::Finished`](super::PipelineEvent::Finished) with the
//! run's counters.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::events::{EventSink, ItemStatus};
use super::render::render_note_html;
use crate::config::SummarySettings;
use crate::library::{BibItem, LibraryClient, LibraryError, NoteRecord, find_pdf_attachment};
use crate::metrics::{RunMetrics, RunSnapshot};
use crate::summarization::{GenerationError, GenerationRequest, PDF_MIME_TYPE, SummaryGenerator};

/// User-turn instruction sent with every document.
pub const NOTE_INSTRUCTION: &str = "Please analyze the provided research paper and generate notes according to the system instructions.";

/// Work item: a caller row paired with the item to summarize.
#[derive(Debug, Clone)]
pub struct ProcessingUnit {
    /// Caller-owned correlation token echoed in status events.
    pub row: usize,
    /// The item to summarize.
    pub item: BibItem,
}

/// Failures that end a single unit with [`ItemStatus::Error`].
#[derive(Debug, Error)]
pub enum SummaryError {
    /// Listing children, downloading the PDF, or writing the note failed.
    #[error(transparent)]
    Library(#[from] LibraryError),
    /// The summarization backend failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Everything a summarization run needs, handed over by value.
pub struct SummaryJob {
    /// Client used to list children and download attachments.
    pub reader: Arc<dyn LibraryClient>,
    /// Write-capable client used to create notes.
    pub writer: Arc<dyn LibraryClient>,
    /// Summarization backend.
    pub generator: Arc<dyn SummaryGenerator>,
    /// Model, temperature, system instruction, and inter-item delay.
    pub settings: SummarySettings,
    /// Units in processing order.
    pub units: Vec<ProcessingUnit>,
}

/// Run the per-item pipeline to completion, emitting events through `sink`.
pub async fn run_summaries(
    job: SummaryJob,
    sink: EventSink<RunSnapshot>,
    cancel: CancellationToken,
) {
    let total = job.units.len();
    let metrics = RunMetrics::new();
    let delay = job.settings.inter_item_delay;

    tracing::info!(
        units = total,
        model = %job.settings.model,
        "Starting summary run"
    );

    for (index, unit) in job.units.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::info!(remaining = total - index, "Summary run stopped");
            sink.progress("Stopping summary generation...");
            break;
        }

        let status = process_unit(&job, unit, &sink).await;
        metrics.record(status);
        sink.status(unit.row, status);

        // No backend call was made for units without a PDF.
        let is_last = index + 1 == total;
        if is_last || status == ItemStatus::NoAttachment || cancel.is_cancelled() {
            continue;
        }
        sink.progress(format!(
            "Waiting {}s to respect API rate limit...",
            delay.as_secs()
        ));
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    let snapshot = metrics.snapshot(total);
    tracing::info!(
        completed = snapshot.completed,
        no_attachment = snapshot.no_attachment,
        errors = snapshot.errors,
        failed_to_persist = snapshot.failed_to_persist,
        skipped = snapshot.skipped,
        "Summary run finished"
    );
    sink.finish(snapshot);
}

async fn process_unit(
    job: &SummaryJob,
    unit: &ProcessingUnit,
    sink: &EventSink<RunSnapshot>,
) -> ItemStatus {
    let title = unit.item.display_title();
    sink.status(unit.row, ItemStatus::InProgress);
    sink.progress(format!("Processing '{title}'..."));

    match summarize_item(job, unit, sink).await {
        Ok(status) => status,
        Err(error) => {
            tracing::warn!(item = %unit.item.key, error = %error, "Summarizing item failed");
            sink.item_error(format!(
                "An error occurred while processing '{title}': {error}"
            ));
            ItemStatus::Error
        }
    }
}

async fn summarize_item(
    job: &SummaryJob,
    unit: &ProcessingUnit,
    sink: &EventSink<RunSnapshot>,
) -> Result<ItemStatus, SummaryError> {
    let item = &unit.item;
    let title = item.display_title();

    sink.progress("  -> Searching for PDF attachment...");
    let children = job.reader.children(&item.key).await?;
    let Some(attachment) = find_pdf_attachment(&children) else {
        sink.progress(format!("  -> Could not find a PDF for '{title}'."));
        return Ok(ItemStatus::NoAttachment);
    };

    sink.progress("  -> Found PDF. Downloading...");
    let document = job.reader.attachment_bytes(&attachment.key).await?;
    tracing::debug!(
        item = %item.key,
        attachment = %attachment.key,
        bytes = document.len(),
        "Downloaded attachment"
    );

    let markdown = job
        .generator
        .generate(GenerationRequest {
            model: job.settings.model.clone(),
            instruction: NOTE_INSTRUCTION.to_string(),
            document,
            mime_type: PDF_MIME_TYPE.to_string(),
            system_instruction: job.settings.system_prompt.clone(),
            temperature: job.settings.temperature,
        })
        .await?;

    let note = NoteRecord::ai_summary(render_note_html(&markdown), &job.settings.model);
    let outcome = job.writer.create_note(&item.key, &note).await?;

    if outcome.is_success() {
        sink.progress(format!("Successfully created note for '{title}'."));
        Ok(ItemStatus::Completed)
    } else {
        let detail = outcome.failure_detail();
        tracing::warn!(item = %item.key, detail = %detail, "Note write rejected");
        sink.progress(format!("Failed to create note for '{title}': {detail}"));
        Ok(ItemStatus::FailedToPersist)
    }
}
