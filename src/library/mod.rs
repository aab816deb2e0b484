//! Reference library integration: query contract, data model, and the Zotero HTTP client.

pub mod citation;
pub mod client;
mod pager;
pub mod survey;
pub mod types;

use async_trait::async_trait;

pub use client::{AccessMode, ZoteroClient};
pub use survey::{CollectionNode, ItemOverview, SurveyStatus, build_collection_tree, survey_items};
pub use types::{
    AI_SUMMARY_TAG, Attachment, BibItem, ChildRecord, CitationFormat, Collection, Creator,
    LibraryError, NoteChild, NoteRecord, NoteWriteOutcome, WriteFailure, find_ai_note,
    find_pdf_attachment,
};

/// Query contract shared by the Web and local access modes.
///
/// Implementations must tolerate being called from a background task. Child listings are
/// returned in the order the backend serves them; callers that pick "the first match" rely on
/// that order.
#[async_trait]
pub trait LibraryClient: Send + Sync {
    /// Every collection in the library.
    async fn list_collections(&self) -> Result<Vec<Collection>, LibraryError>;

    /// The collection `root_key` followed by all of its descendants.
    async fn collection_closure(&self, root_key: &str) -> Result<Vec<Collection>, LibraryError>;

    /// Top-level items filed directly in a collection.
    async fn top_items(&self, collection_key: &str) -> Result<Vec<BibItem>, LibraryError>;

    /// Attachments, notes, and other children of an item.
    async fn children(&self, item_key: &str) -> Result<Vec<ChildRecord>, LibraryError>;

    /// Raw payload of an attachment.
    async fn attachment_bytes(&self, attachment_key: &str) -> Result<Vec<u8>, LibraryError>;

    /// One citation text per exported record, in the order the export returned them.
    async fn export_citations(
        &self,
        format: CitationFormat,
        keys: &[String],
    ) -> Result<Vec<String>, LibraryError>;

    /// Create `note` as a child of `parent_key`.
    async fn create_note(
        &self,
        parent_key: &str,
        note: &NoteRecord,
    ) -> Result<NoteWriteOutcome, LibraryError>;
}
