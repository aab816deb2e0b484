//! Collection aggregation pipeline.
//!
//! Walks a collection and its descendants, gathers every top-level item once in discovery
//! order, and joins each item's citation (plus its AI note when one exists) into a single text
//! document. Traversal and export failures abort the run; a missing citation only drops that
//! item.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use super::events::EventSink;
use crate::library::{BibItem, CitationFormat, LibraryClient, LibraryError, find_ai_note};

/// Keys per citation export request.
pub const CITATION_BATCH_SIZE: usize = 50;

/// Separator placed between consecutive items in the document.
pub const ITEM_DELIMITER: &str = "\n\n**\n\n";

/// Fatal aggregation failures.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// A library call failed during traversal, export, or note lookup.
    #[error("Error during collection summary: {0}")]
    Library(#[from] LibraryError),
}

/// Inputs of one aggregation run.
pub struct AggregationJob {
    /// Client used for every query.
    pub client: Arc<dyn LibraryClient>,
    /// Collection the walk starts from.
    pub collection_key: String,
}

/// Result of a successful aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateOutcome {
    /// The collection tree holds no items.
    NoItems,
    /// The assembled document.
    Document(CollectionDigest),
}

/// Aggregated document plus the bookkeeping behind it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionDigest {
    /// Document text; empty when every item lacked a citation.
    pub text: String,
    /// Items included in the document.
    pub included: usize,
    /// Included items that carried an AI note.
    pub with_notes: usize,
    /// Keys dropped because no citation came back, in discovery order.
    pub missing_citations: Vec<String>,
}

impl CollectionDigest {
    /// Whether there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Run the aggregation pipeline, emitting exactly one terminal event through `sink`.
pub async fn run_aggregation(job: AggregationJob, sink: EventSink<AggregateOutcome>) {
    match aggregate(&job, &sink).await {
        Ok(outcome) => sink.finish(outcome),
        Err(error) => {
            tracing::error!(
                collection = %job.collection_key,
                error = %error,
                "Collection aggregation failed"
            );
            sink.fail(error.to_string());
        }
    }
}

/// Build the aggregated document for `job` without the terminal event.
pub async fn aggregate(
    job: &AggregationJob,
    sink: &EventSink<AggregateOutcome>,
) -> Result<AggregateOutcome, AggregationError> {
    let client = job.client.as_ref();

    sink.progress("Fetching collection hierarchy...");
    let collections = client.collection_closure(&job.collection_key).await?;
    sink.progress(format!(
        "Found {} collections to process.",
        collections.len()
    ));

    let mut order: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut items: HashMap<String, BibItem> = HashMap::new();
    for collection in &collections {
        sink.progress(format!("Finding items in: '{}'", collection.name));
        for item in client.top_items(&collection.key).await? {
            if seen.insert(item.key.clone()) {
                order.push(item.key.clone());
                items.insert(item.key.clone(), item);
            }
        }
    }

    if order.is_empty() {
        sink.progress("No items found in the selected collection(s).");
        return Ok(AggregateOutcome::NoItems);
    }

    sink.progress(format!(
        "Found {} total items. Fetching BibLaTeX citations in batches...",
        order.len()
    ));
    let citations = fetch_citations(client, &order, sink).await?;

    sink.progress("Compiling final summary document...");
    let mut digest = CollectionDigest::default();
    let mut parts: Vec<String> = Vec::with_capacity(order.len());
    for key in &order {
        let title = items
            .get(key)
            .map(BibItem::display_title)
            .unwrap_or("Untitled");
        sink.progress(format!("  -> Processing '{title}'"));

        let Some(citation) = citations.get(key).filter(|text| !text.is_empty()) else {
            tracing::warn!(item = %key, "No citation returned; item skipped");
            sink.warning(format!("Missing BibLaTeX for key {key}. Skipping."));
            digest.missing_citations.push(key.clone());
            continue;
        };

        let children = client.children(key).await?;
        match find_ai_note(&children).filter(|note| !note.content.is_empty()) {
            Some(note) => {
                sink.progress("    - Found AI note.");
                parts.push(format!("{citation}\n{}", note.content));
                digest.with_notes += 1;
            }
            None => {
                sink.progress("    - No AI note found. Using BibLaTeX only.");
                parts.push(citation.clone());
            }
        }
        digest.included += 1;
    }

    digest.text = parts.join(ITEM_DELIMITER);
    tracing::info!(
        collection = %job.collection_key,
        included = digest.included,
        with_notes = digest.with_notes,
        missing = digest.missing_citations.len(),
        "Collection aggregated"
    );
    Ok(AggregateOutcome::Document(digest))
}

async fn fetch_citations(
    client: &dyn LibraryClient,
    keys: &[String],
    sink: &EventSink<AggregateOutcome>,
) -> Result<HashMap<String, String>, LibraryError> {
    let mut citations = HashMap::with_capacity(keys.len());
    for (index, batch) in keys.chunks(CITATION_BATCH_SIZE).enumerate() {
        sink.progress(format!(
            "  -> Fetching BibLaTeX batch {} ({} items)...",
            index + 1,
            batch.len()
        ));
        let records = client
            .export_citations(CitationFormat::Biblatex, batch)
            .await?;
        if records.len() != batch.len() {
            tracing::warn!(
                batch = index + 1,
                requested = batch.len(),
                returned = records.len(),
                "Citation count mismatch"
            );
            sink.warning(format!(
                "Key count mismatch in batch. Requested {}, got {}. Some citations may be missing.",
                batch.len(),
                records.len()
            ));
        }
        for (key, record) in batch.iter().zip(records) {
            citations.insert(key.clone(), record.trim().to_string());
        }
    }
    Ok(citations)
}
