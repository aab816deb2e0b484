use std::sync::Once;

use zotnotes::config::Config;
use zotnotes::library::{LibraryClient, ZoteroClient};
use zotnotes::summarization::{GeminiClient, GenerationRequest, PDF_MIME_TYPE, SummaryGenerator};

static INIT: Once = Once::new();

fn load_config() -> Config {
    INIT.call_once(|| {
        dotenvy::dotenv().ok();
    });
    Config::from_env().expect("live tests need ZOTERO_* and GEMINI_* variables")
}

// Smallest well-formed single-page PDF.
const BLANK_PDF: &[u8] = b"%PDF-1.4
1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj
2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj
3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] >> endobj
trailer << /Root 1 0 R >>
%%EOF";

#[tokio::test]
#[ignore = "Requires Zotero Web API credentials"]
async fn live_web_api_lists_collections() {
    let config = load_config();
    let client = ZoteroClient::web(&config.library).expect("web client");
    client.probe().await.expect("web API reachable");
    let collections = client
        .list_collections()
        .await
        .expect("collections listing");
    for collection in collections.iter().take(3) {
        assert!(!collection.key.is_empty());
    }
}

#[tokio::test]
#[ignore = "Requires the Zotero desktop application"]
async fn live_local_api_is_reachable() {
    let config = load_config();
    let client = ZoteroClient::local(&config.library).expect("local client");
    client
        .probe()
        .await
        .expect("local API reachable; is Zotero running?");
}

#[tokio::test]
#[ignore = "Requires a Gemini API key"]
async fn live_gemini_summarizes_a_pdf() {
    let config = load_config();
    let client = GeminiClient::new(&config.gemini).expect("gemini client");
    let text = client
        .generate(GenerationRequest {
            model: "gemini-2.5-flash".into(),
            instruction: "Describe this document in one sentence.".into(),
            document: BLANK_PDF.to_vec(),
            mime_type: PDF_MIME_TYPE.into(),
            system_instruction: "Answer in plain text.".into(),
            temperature: 0.0,
        })
        .await
        .expect("summary generated");
    assert!(!text.trim().is_empty());
}
