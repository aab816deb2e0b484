//! Data model shared by the library client and the pipelines, plus Zotero wire types.

use std::collections::BTreeMap;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Tag marking a note as produced by the summarization pipeline.
pub const AI_SUMMARY_TAG: &str = "AI-Summary";

/// Errors returned while interacting with the reference library.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid library URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The library responded with an unexpected status code.
    #[error("Unexpected library response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the library.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Write attempted through a read-only access mode.
    #[error("The local library connection is read-only")]
    ReadOnly,
    /// Attachment location could not be resolved to readable bytes.
    #[error("Attachment unavailable: {0}")]
    Attachment(String),
    /// Reading a local attachment file failed.
    #[error("Failed to read attachment file: {0}")]
    Io(#[from] std::io::Error),
}

/// One author, editor, or other contributor of an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    /// Role such as `author` or `editor`.
    #[serde(default)]
    pub creator_type: Option<String>,
    /// Given name for two-field creators.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name for two-field creators.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Full name for single-field creators (institutions).
    #[serde(default)]
    pub name: Option<String>,
}

impl Creator {
    /// Render as `"First Last"`, falling back to the single-field name.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|name| !name.trim().is_empty()) {
            return name.trim().to_string();
        }
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        )
        .trim()
        .to_string()
    }
}

/// A bibliographic record as returned by the library. Never mutated by this crate.
#[derive(Debug, Clone, PartialEq)]
pub struct BibItem {
    /// Library-unique item key.
    pub key: String,
    /// Item title, when the record has one.
    pub title: Option<String>,
    /// Item type tag such as `journalArticle`.
    pub item_type: String,
    /// Contributors in library order.
    pub creators: Vec<Creator>,
}

impl BibItem {
    /// Title for progress messages.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or("Untitled")
    }

    /// Comma-separated creator names.
    pub fn authors(&self) -> String {
        self.creators
            .iter()
            .map(Creator::display_name)
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A node of the collection hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    /// Library-unique collection key.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Parent collection key; `None` for root-level collections.
    pub parent: Option<String>,
    /// Number of direct subcollections, when the library reports it.
    pub child_count: Option<usize>,
}

/// A file attached to an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Attachment key used to fetch the payload.
    pub key: String,
    /// Stored filename, absent for linked URLs.
    pub filename: Option<String>,
    /// MIME type reported by the library.
    pub content_type: Option<String>,
}

impl Attachment {
    /// Whether the filename carries a `.pdf` suffix, ignoring case.
    pub fn is_pdf(&self) -> bool {
        self.filename
            .as_deref()
            .map(|name| name.to_lowercase().ends_with(".pdf"))
            .unwrap_or(false)
    }
}

/// A note attached to an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteChild {
    /// Note key.
    pub key: String,
    /// Stored note body (HTML).
    pub content: String,
    /// Tags attached to the note.
    pub tags: Vec<String>,
}

impl NoteChild {
    /// Whether the note was produced by the summarization pipeline.
    pub fn is_ai_summary(&self) -> bool {
        self.tags.iter().any(|tag| tag == AI_SUMMARY_TAG)
    }
}

/// A child record of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildRecord {
    /// `itemType == "attachment"`.
    Attachment(Attachment),
    /// `itemType == "note"`.
    Note(NoteChild),
    /// Any other child type, kept so listings stay positional.
    Other {
        /// Child key.
        key: String,
        /// Reported item type.
        item_type: String,
    },
}

/// First attachment, in listing order, whose filename ends in `.pdf`.
pub fn find_pdf_attachment(children: &[ChildRecord]) -> Option<&Attachment> {
    children.iter().find_map(|child| match child {
        ChildRecord::Attachment(attachment) if attachment.is_pdf() => Some(attachment),
        _ => None,
    })
}

/// First note, in listing order, tagged [`AI_SUMMARY_TAG`].
pub fn find_ai_note(children: &[ChildRecord]) -> Option<&NoteChild> {
    children.iter().find_map(|child| match child {
        ChildRecord::Note(note) if note.is_ai_summary() => Some(note),
        _ => None,
    })
}

/// A note about to be created under a parent item.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteRecord {
    /// Rendered note body (HTML).
    pub content: String,
    /// Tags stored with the note.
    pub tags: Vec<String>,
}

impl NoteRecord {
    /// Note tagged with the AI marker and the model that produced it.
    pub fn ai_summary(content: String, model: &str) -> Self {
        Self {
            content,
            tags: vec![AI_SUMMARY_TAG.to_string(), model.to_string()],
        }
    }

    /// Zotero item JSON for this note as a child of `parent_key`.
    pub(crate) fn to_payload(&self, parent_key: &str) -> Value {
        let tags: Vec<Value> = self.tags.iter().map(|tag| json!({ "tag": tag })).collect();
        json!({
            "itemType": "note",
            "note": self.content,
            "tags": tags,
            "parentItem": parent_key,
            "collections": [],
            "relations": {},
        })
    }
}

/// One rejected object from a write request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    /// Position of the object in the request body.
    pub index: String,
    /// Status code reported for the object.
    pub code: Option<u16>,
    /// Reason reported by the library.
    pub message: String,
}

/// Result of a note creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteWriteOutcome {
    /// Keys of the created notes.
    pub created: Vec<String>,
    /// Objects the library refused.
    pub failed: Vec<WriteFailure>,
}

impl NoteWriteOutcome {
    /// The write succeeded when at least one note was created.
    pub fn is_success(&self) -> bool {
        !self.created.is_empty()
    }

    /// Human-readable list of failures.
    pub fn failure_detail(&self) -> String {
        if self.failed.is_empty() {
            return "no objects were created".to_string();
        }
        self.failed
            .iter()
            .map(|failure| match failure.code {
                Some(code) => format!("#{} ({code}): {}", failure.index, failure.message),
                None => format!("#{}: {}", failure.index, failure.message),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Bibliography interchange formats offered by the export endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationFormat {
    /// BibLaTeX.
    Biblatex,
}

impl CitationFormat {
    /// Value of the `format` query parameter.
    pub fn as_query(self) -> &'static str {
        match self {
            Self::Biblatex => "biblatex",
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemEnvelope {
    pub(crate) key: String,
    pub(crate) data: ItemData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ItemData {
    #[serde(default)]
    pub(crate) item_type: String,
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) creators: Vec<Creator>,
    #[serde(default)]
    pub(crate) filename: Option<String>,
    #[serde(default)]
    pub(crate) content_type: Option<String>,
    #[serde(default)]
    pub(crate) note: Option<String>,
    #[serde(default)]
    pub(crate) tags: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagEntry {
    pub(crate) tag: String,
}

impl From<ItemEnvelope> for BibItem {
    fn from(envelope: ItemEnvelope) -> Self {
        Self {
            key: envelope.key,
            title: envelope.data.title,
            item_type: envelope.data.item_type,
            creators: envelope.data.creators,
        }
    }
}

impl From<ItemEnvelope> for ChildRecord {
    fn from(envelope: ItemEnvelope) -> Self {
        let ItemEnvelope { key, data } = envelope;
        match data.item_type.as_str() {
            "attachment" => ChildRecord::Attachment(Attachment {
                key,
                filename: data.filename,
                content_type: data.content_type,
            }),
            "note" => ChildRecord::Note(NoteChild {
                key,
                content: data.note.unwrap_or_default(),
                tags: data.tags.into_iter().map(|entry| entry.tag).collect(),
            }),
            _ => ChildRecord::Other {
                key,
                item_type: data.item_type,
            },
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct CollectionEnvelope {
    pub(crate) key: String,
    pub(crate) data: CollectionData,
    #[serde(default)]
    pub(crate) meta: CollectionMeta,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CollectionData {
    #[serde(default)]
    pub(crate) name: String,
    /// `false` for root collections, otherwise the parent key.
    #[serde(default)]
    pub(crate) parent_collection: Value,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CollectionMeta {
    #[serde(default)]
    pub(crate) num_collections: Option<usize>,
}

impl From<CollectionEnvelope> for Collection {
    fn from(envelope: CollectionEnvelope) -> Self {
        let parent = match envelope.data.parent_collection {
            Value::String(key) if !key.is_empty() => Some(key),
            _ => None,
        };
        Self {
            key: envelope.key,
            name: envelope.data.name,
            parent,
            child_count: envelope.meta.num_collections,
        }
    }
}

#[derive(Deserialize, Default)]
pub(crate) struct WriteResponse {
    #[serde(default)]
    pub(crate) success: BTreeMap<String, String>,
    #[serde(default)]
    pub(crate) failed: BTreeMap<String, FailedEntry>,
}

#[derive(Deserialize)]
pub(crate) struct FailedEntry {
    #[serde(default)]
    pub(crate) code: Option<u16>,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

impl From<WriteResponse> for NoteWriteOutcome {
    fn from(response: WriteResponse) -> Self {
        Self {
            created: response.success.into_values().collect(),
            failed: response
                .failed
                .into_iter()
                .map(|(index, entry)| WriteFailure {
                    index,
                    code: entry.code,
                    message: entry.message.unwrap_or_else(|| "unknown error".into()),
                })
                .collect(),
        }
    }
}
