//! Generative summarization backend.
//!
//! A single call hands the backend a document, an instruction, and sampling settings and gets
//! markdown back. The Gemini client talks to the Generative Language REST API directly and
//! sends the document inline as base64.

use crate::config::GeminiConfig;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// MIME type attached to PDF payloads.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Errors surfaced while generating a summary.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Backend could not be reached or rejected the credentials.
    #[error("Summarization backend unavailable: {0}")]
    Unavailable(String),
    /// Backend returned an error response (including quota exhaustion).
    #[error("Failed to generate summary: {0}")]
    GenerationFailed(String),
    /// Backend response could not be parsed or carried no text.
    #[error("Malformed backend response: {0}")]
    InvalidResponse(String),
}

/// One document to summarize.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Model identifier understood by the backend.
    pub model: String,
    /// User-turn instruction sent alongside the document.
    pub instruction: String,
    /// Raw document bytes.
    pub document: Vec<u8>,
    /// MIME type of `document`.
    pub mime_type: String,
    /// System instruction steering the output format.
    pub system_instruction: String,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Interface implemented by generative summarization backends.
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    /// Generate markdown notes for the supplied document.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    /// Build a client from configuration.
    pub fn new(config: &GeminiConfig) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .user_agent(concat!("zotnotes/", env!("CARGO_PKG_VERSION"), " summary"))
            .build()
            .map_err(|error| {
                GenerationError::Unavailable(format!("failed to construct HTTP client: {error}"))
            })?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String, GenerationError> {
        if let Some(reason) = self.prompt_feedback.and_then(|feedback| feedback.block_reason) {
            return Err(GenerationError::GenerationFailed(format!(
                "prompt blocked: {reason}"
            )));
        }
        let candidate = self.candidates.into_iter().next().ok_or_else(|| {
            GenerationError::InvalidResponse("response contained no candidates".into())
        })?;
        let finish_reason = candidate.finish_reason;
        let text: String = candidate
            .content
            .map(|content| content.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| part.text)
            .collect();
        if text.trim().is_empty() {
            return Err(GenerationError::InvalidResponse(format!(
                "candidate carried no text (finish reason: {})",
                finish_reason.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(text)
    }
}

#[async_trait]
impl SummaryGenerator for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let payload = json!({
            "systemInstruction": {
                "parts": [{ "text": request.system_instruction }]
            },
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": request.instruction },
                    {
                        "inlineData": {
                            "mimeType": request.mime_type,
                            "data": STANDARD.encode(&request.document),
                        }
                    }
                ]
            }],
            "generationConfig": {
                "temperature": request.temperature,
            }
        });

        tracing::debug!(
            model = %request.model,
            document_bytes = request.document.len(),
            temperature = request.temperature,
            "Requesting summary"
        );

        let response = self
            .http
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::Unavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(GenerationError::Unavailable(format!(
                    "credentials rejected ({status}): {body}"
                )));
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(GenerationError::GenerationFailed(format!(
                    "backend returned {status}: {body}"
                )));
            }
        }

        let body: GenerateResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode response: {error}"))
        })?;

        body.into_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client_for(server: &MockServer) -> GeminiClient {
        GeminiClient::new(&GeminiConfig {
            api_key: "gem-key".into(),
            base_url: server.base_url(),
        })
        .expect("client")
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: "gemini-2.5-flash".into(),
            instruction: "Summarize".into(),
            document: b"%PDF".to_vec(),
            mime_type: PDF_MIME_TYPE.into(),
            system_instruction: "Be brief".into(),
            temperature: 0.3,
        }
    }

    #[tokio::test]
    async fn gemini_client_joins_candidate_parts() {
        let server = MockServer::start_async().await;
        let client = client_for(&server);

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/gemini-2.5-flash:generateContent")
                    .header("x-goog-api-key", "gem-key")
                    .body_contains("\"mimeType\":\"application/pdf\"")
                    .body_contains("\"data\":\"JVBERg==\"")
                    .body_contains("\"text\":\"Be brief\"");
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": { "parts": [{ "text": "# Notes\n" }, { "text": "- point" }] },
                        "finishReason": "STOP"
                    }]
                }));
            })
            .await;

        let text = client.generate(request()).await.expect("summary");

        mock.assert();
        assert_eq!(text, "# Notes\n- point");
    }

    #[tokio::test]
    async fn gemini_client_maps_quota_errors() {
        let server = MockServer::start_async().await;
        let client = client_for(&server);

        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/gemini-2.5-flash:generateContent");
                then.status(429).body("RESOURCE_EXHAUSTED");
            })
            .await;

        let error = client.generate(request()).await.expect_err("quota");
        assert!(
            matches!(&error, GenerationError::GenerationFailed(message) if message.contains("429"))
        );
    }

    #[tokio::test]
    async fn gemini_client_reports_blocked_prompt() {
        let server = MockServer::start_async().await;
        let client = client_for(&server);

        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/gemini-2.5-flash:generateContent");
                then.status(200).json_body(json!({
                    "candidates": [],
                    "promptFeedback": { "blockReason": "SAFETY" }
                }));
            })
            .await;

        let error = client.generate(request()).await.expect_err("blocked");
        assert!(
            matches!(&error, GenerationError::GenerationFailed(message) if message.contains("SAFETY"))
        );
    }

    #[tokio::test]
    async fn gemini_client_rejects_empty_candidate() {
        let server = MockServer::start_async().await;
        let client = client_for(&server);

        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/gemini-2.5-flash:generateContent");
                then.status(200).json_body(json!({
                    "candidates": [{ "content": { "parts": [] }, "finishReason": "MAX_TOKENS" }]
                }));
            })
            .await;

        let error = client.generate(request()).await.expect_err("empty");
        assert!(
            matches!(&error, GenerationError::InvalidResponse(message) if message.contains("MAX_TOKENS"))
        );
    }
}
