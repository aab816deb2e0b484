//! HTTP client for the Zotero Web API and the desktop application's local API.

use async_trait::async_trait;
use reqwest::{Client, Method, Url};

use crate::config::LibraryConfig;
use crate::library::LibraryClient;
use crate::library::citation::split_bibliography;
use crate::library::pager::{self, PAGE_SIZE};
use crate::library::types::{
    BibItem, CitationFormat, ChildRecord, Collection, CollectionEnvelope, ItemEnvelope,
    LibraryError, NoteRecord, NoteWriteOutcome, WriteResponse,
};

const API_VERSION: &str = "3";

/// How the client reaches the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Authenticated Web API; read and write.
    Web,
    /// Local API served by the running desktop application; read-only.
    Local,
}

/// Lightweight HTTP client for library operations.
pub struct ZoteroClient {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) library_prefix: String,
    pub(crate) api_key: Option<String>,
    pub(crate) mode: AccessMode,
}

impl ZoteroClient {
    /// Client for the authenticated Web API.
    pub fn web(config: &LibraryConfig) -> Result<Self, LibraryError> {
        Self::build(
            &config.web_url,
            config,
            Some(config.api_key.clone()),
            AccessMode::Web,
        )
    }

    /// Client for the local API of the desktop application.
    pub fn local(config: &LibraryConfig) -> Result<Self, LibraryError> {
        Self::build(&config.local_url, config, None, AccessMode::Local)
    }

    fn build(
        base_url: &str,
        config: &LibraryConfig,
        api_key: Option<String>,
        mode: AccessMode,
    ) -> Result<Self, LibraryError> {
        let client = Client::builder()
            .user_agent(concat!("zotnotes/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = normalize_base_url(base_url).map_err(LibraryError::InvalidUrl)?;
        let library_prefix = format!(
            "{}/{}",
            config.library_type.path_segment(),
            config.library_id
        );
        tracing::debug!(
            url = %base_url,
            library = %library_prefix,
            mode = ?mode,
            has_api_key = api_key.as_deref().map(|key| !key.is_empty()).unwrap_or(false),
            "Initialized library HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            library_prefix,
            api_key,
            mode,
        })
    }

    /// Access mode of this client.
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Issue a one-record collection listing to confirm the library is reachable.
    pub async fn probe(&self) -> Result<(), LibraryError> {
        let path = "collections";
        let response = self
            .request(Method::GET, path)
            .query(&[("limit", 1)])
            .send()
            .await?;
        self.check_status(response, path).await?;
        tracing::debug!(mode = ?self.mode, "Library connection verified");
        Ok(())
    }

    async fn collection(&self, key: &str) -> Result<Collection, LibraryError> {
        let path = format!("collections/{key}");
        let response = self.request(Method::GET, &path).send().await?;
        let response = self.check_status(response, &path).await?;
        let envelope: CollectionEnvelope = response.json().await?;
        Ok(envelope.into())
    }

    async fn subcollections(&self, key: &str) -> Result<Vec<Collection>, LibraryError> {
        let envelopes: Vec<CollectionEnvelope> =
            pager::collect_records(self, format!("collections/{key}/collections")).await?;
        Ok(envelopes.into_iter().map(Into::into).collect())
    }

    async fn local_attachment(&self, key: &str) -> Result<Vec<u8>, LibraryError> {
        let path = format!("items/{key}/file/view/url");
        let response = self.request(Method::GET, &path).send().await?;
        let response = self.check_status(response, &path).await?;
        let location = response.text().await?;
        let url = Url::parse(location.trim())
            .map_err(|error| LibraryError::Attachment(format!("{location}: {error}")))?;

        if url.scheme() == "file" {
            let file_path = url.to_file_path().map_err(|()| {
                LibraryError::Attachment(format!("not a local file path: {url}"))
            })?;
            tracing::debug!(attachment = key, path = %file_path.display(), "Reading local attachment");
            return Ok(tokio::fs::read(&file_path).await?);
        }

        let response = self.client.get(url.clone()).send().await?;
        let response = self.check_status(response, url.as_str()).await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(
            &self.base_url,
            &format!("{}/{}", self.library_prefix, path.trim_start_matches('/')),
        );
        let mut req = self
            .client
            .request(method, url)
            .header("Zotero-API-Version", API_VERSION);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("Zotero-API-Key", api_key);
        }
        req
    }

    pub(crate) async fn check_status(
        &self,
        response: reqwest::Response,
        path: &str,
    ) -> Result<reqwest::Response, LibraryError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = LibraryError::UnexpectedStatus { status, body };
        tracing::error!(path, mode = ?self.mode, error = %error, "Library request failed");
        Err(error)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .user_agent("zotnotes-test")
                .build()
                .expect("client"),
            base_url: base_url.to_string(),
            library_prefix: "users/42".into(),
            api_key: Some("secret".into()),
            mode: AccessMode::Web,
        }
    }
}

#[async_trait]
impl LibraryClient for ZoteroClient {
    async fn list_collections(&self) -> Result<Vec<Collection>, LibraryError> {
        let envelopes: Vec<CollectionEnvelope> =
            pager::collect_records(self, "collections".into()).await?;
        Ok(envelopes.into_iter().map(Into::into).collect())
    }

    /// Pre-order walk: each collection is followed by its descendants, siblings in listing order.
    async fn collection_closure(&self, root_key: &str) -> Result<Vec<Collection>, LibraryError> {
        let mut closure = Vec::new();
        let mut pending = vec![self.collection(root_key).await?];

        while let Some(collection) = pending.pop() {
            let has_children = collection.child_count.is_none_or(|count| count > 0);
            let key = collection.key.clone();
            closure.push(collection);
            if has_children {
                let mut children = self.subcollections(&key).await?;
                children.reverse();
                pending.extend(children);
            }
        }

        tracing::debug!(root = root_key, collections = closure.len(), "Resolved collection closure");
        Ok(closure)
    }

    async fn top_items(&self, collection_key: &str) -> Result<Vec<BibItem>, LibraryError> {
        let envelopes: Vec<ItemEnvelope> =
            pager::collect_records(self, format!("collections/{collection_key}/items/top"))
                .await?;
        Ok(envelopes.into_iter().map(Into::into).collect())
    }

    async fn children(&self, item_key: &str) -> Result<Vec<ChildRecord>, LibraryError> {
        let envelopes: Vec<ItemEnvelope> =
            pager::collect_records(self, format!("items/{item_key}/children")).await?;
        Ok(envelopes.into_iter().map(Into::into).collect())
    }

    async fn attachment_bytes(&self, attachment_key: &str) -> Result<Vec<u8>, LibraryError> {
        if self.mode == AccessMode::Local {
            return self.local_attachment(attachment_key).await;
        }
        let path = format!("items/{attachment_key}/file");
        let response = self.request(Method::GET, &path).send().await?;
        let response = self.check_status(response, &path).await?;
        let bytes = response.bytes().await?;
        tracing::debug!(attachment = attachment_key, bytes = bytes.len(), "Downloaded attachment");
        Ok(bytes.to_vec())
    }

    async fn export_citations(
        &self,
        format: CitationFormat,
        keys: &[String],
    ) -> Result<Vec<String>, LibraryError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let path = "items";
        let response = self
            .request(Method::GET, path)
            .query(&[
                ("format", format.as_query().to_string()),
                ("itemKey", keys.join(",")),
                ("limit", PAGE_SIZE.to_string()),
            ])
            .send()
            .await?;
        let response = self.check_status(response, path).await?;
        let body = response.text().await?;
        let records = split_bibliography(&body);
        tracing::debug!(
            format = format.as_query(),
            requested = keys.len(),
            returned = records.len(),
            "Exported citations"
        );
        Ok(records)
    }

    async fn create_note(
        &self,
        parent_key: &str,
        note: &NoteRecord,
    ) -> Result<NoteWriteOutcome, LibraryError> {
        if self.mode == AccessMode::Local {
            return Err(LibraryError::ReadOnly);
        }
        let path = "items";
        let response = self
            .request(Method::POST, path)
            .json(&vec![note.to_payload(parent_key)])
            .send()
            .await?;
        let response = self.check_status(response, path).await?;
        let body: WriteResponse = response.json().await?;
        let outcome = NoteWriteOutcome::from(body);
        tracing::debug!(
            parent = parent_key,
            created = outcome.created.len(),
            failed = outcome.failed.len(),
            "Note write completed"
        );
        Ok(outcome)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
