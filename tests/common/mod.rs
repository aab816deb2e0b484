#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use zotnotes::library::{
    AI_SUMMARY_TAG, Attachment, BibItem, ChildRecord, CitationFormat, Collection, LibraryClient,
    LibraryError, NoteChild, NoteRecord, NoteWriteOutcome, WriteFailure,
};
use zotnotes::pipeline::PipelineEvent;
use zotnotes::summarization::{GenerationError, GenerationRequest, SummaryGenerator};

pub fn item(key: &str, title: &str) -> BibItem {
    BibItem {
        key: key.into(),
        title: Some(title.into()),
        item_type: "journalArticle".into(),
        creators: Vec::new(),
    }
}

pub fn collection(key: &str, name: &str) -> Collection {
    Collection {
        key: key.into(),
        name: name.into(),
        parent: None,
        child_count: None,
    }
}

pub fn attachment(key: &str, filename: &str) -> ChildRecord {
    ChildRecord::Attachment(Attachment {
        key: key.into(),
        filename: Some(filename.into()),
        content_type: None,
    })
}

pub fn note(key: &str, content: &str, tags: &[&str]) -> ChildRecord {
    ChildRecord::Note(NoteChild {
        key: key.into(),
        content: content.into(),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
    })
}

pub fn ai_note(key: &str, content: &str) -> ChildRecord {
    note(key, content, &[AI_SUMMARY_TAG])
}

fn server_error(body: &str) -> LibraryError {
    LibraryError::UnexpectedStatus {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: body.into(),
    }
}

/// In-memory library that records every call it serves.
#[derive(Default)]
pub struct FakeLibrary {
    pub closure: Vec<Collection>,
    pub items: HashMap<String, Vec<BibItem>>,
    pub children: HashMap<String, Vec<ChildRecord>>,
    pub attachments: HashMap<String, Vec<u8>>,
    pub citations: HashMap<String, String>,
    pub failing_children: HashSet<String>,
    pub failing_exports: bool,
    pub rejected_writes: HashSet<String>,
    pub calls: Mutex<Vec<String>>,
    pub export_batches: Mutex<Vec<Vec<String>>>,
    pub created: Mutex<Vec<(String, NoteRecord)>>,
}

impl FakeLibrary {
    pub fn with_collection(mut self, collection: Collection, items: Vec<BibItem>) -> Self {
        self.items.insert(collection.key.clone(), items);
        self.closure.push(collection);
        self
    }

    pub fn with_children(mut self, item_key: &str, children: Vec<ChildRecord>) -> Self {
        self.children.insert(item_key.into(), children);
        self
    }

    pub fn with_attachment(mut self, attachment_key: &str, bytes: &[u8]) -> Self {
        self.attachments.insert(attachment_key.into(), bytes.to_vec());
        self
    }

    pub fn with_citation(mut self, item_key: &str, citation: &str) -> Self {
        self.citations.insert(item_key.into(), citation.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with(prefix))
            .collect()
    }

    pub fn export_batches(&self) -> Vec<Vec<String>> {
        self.export_batches.lock().expect("batches lock").clone()
    }

    pub fn created(&self) -> Vec<(String, NoteRecord)> {
        self.created.lock().expect("created lock").clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

#[async_trait]
impl LibraryClient for FakeLibrary {
    async fn list_collections(&self) -> Result<Vec<Collection>, LibraryError> {
        self.record("collections".into());
        Ok(self.closure.clone())
    }

    async fn collection_closure(&self, root_key: &str) -> Result<Vec<Collection>, LibraryError> {
        self.record(format!("closure:{root_key}"));
        Ok(self.closure.clone())
    }

    async fn top_items(&self, collection_key: &str) -> Result<Vec<BibItem>, LibraryError> {
        self.record(format!("top:{collection_key}"));
        Ok(self.items.get(collection_key).cloned().unwrap_or_default())
    }

    async fn children(&self, item_key: &str) -> Result<Vec<ChildRecord>, LibraryError> {
        self.record(format!("children:{item_key}"));
        if self.failing_children.contains(item_key) {
            return Err(server_error("children unavailable"));
        }
        Ok(self.children.get(item_key).cloned().unwrap_or_default())
    }

    async fn attachment_bytes(&self, attachment_key: &str) -> Result<Vec<u8>, LibraryError> {
        self.record(format!("file:{attachment_key}"));
        self.attachments
            .get(attachment_key)
            .cloned()
            .ok_or_else(|| LibraryError::Attachment(format!("{attachment_key} missing")))
    }

    async fn export_citations(
        &self,
        _format: CitationFormat,
        keys: &[String],
    ) -> Result<Vec<String>, LibraryError> {
        self.record(format!("export:{}", keys.len()));
        self.export_batches
            .lock()
            .expect("batches lock")
            .push(keys.to_vec());
        if self.failing_exports {
            return Err(server_error("export failed"));
        }
        Ok(keys
            .iter()
            .filter_map(|key| self.citations.get(key).cloned())
            .collect())
    }

    async fn create_note(
        &self,
        parent_key: &str,
        note: &NoteRecord,
    ) -> Result<NoteWriteOutcome, LibraryError> {
        self.record(format!("note:{parent_key}"));
        if self.rejected_writes.contains(parent_key) {
            return Ok(NoteWriteOutcome {
                created: Vec::new(),
                failed: vec![WriteFailure {
                    index: "0".into(),
                    code: Some(413),
                    message: "Note too long".into(),
                }],
            });
        }
        self.created
            .lock()
            .expect("created lock")
            .push((parent_key.to_string(), note.clone()));
        Ok(NoteWriteOutcome {
            created: vec![format!("N-{parent_key}")],
            failed: Vec::new(),
        })
    }
}

/// Generator that answers from a script and records each request.
#[derive(Default)]
pub struct FakeGenerator {
    pub failing_documents: HashSet<Vec<u8>>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl FakeGenerator {
    pub fn failing_on(document: &[u8]) -> Self {
        let mut generator = Self::default();
        generator.failing_documents.insert(document.to_vec());
        generator
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl SummaryGenerator for FakeGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let failing = self.failing_documents.contains(&request.document);
        let document = String::from_utf8_lossy(&request.document).to_string();
        self.requests.lock().expect("requests lock").push(request);
        if failing {
            return Err(GenerationError::GenerationFailed("quota exhausted".into()));
        }
        Ok(format!("# Notes\n\nSummary of {document}"))
    }
}

pub fn progress_lines<T>(events: &[PipelineEvent<T>]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::Progress(line) => Some(line.as_str()),
            _ => None,
        })
        .collect()
}

pub fn warnings<T>(events: &[PipelineEvent<T>]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::Warning(line) => Some(line.as_str()),
            _ => None,
        })
        .collect()
}
