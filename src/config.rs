//! Environment-driven configuration record.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_ZOTERO_API_URL: &str = "https://api.zotero.org";
const DEFAULT_ZOTERO_LOCAL_URL: &str = "http://localhost:23119/api";
const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-pro";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_DELAY_SECS: u64 = 6;

/// Marker left in template values that were never filled in.
const PLACEHOLDER_MARKER: &str = "YOUR_";

/// Models offered to callers that do not name one explicitly.
pub const KNOWN_MODELS: &[&str] = &["gemini-2.5-pro", "gemini-2.5-flash"];

/// System instruction used when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an expert research assistant. Read the attached paper in full and write structured \
reading notes in markdown.

Include these sections:
## Citation
One line: authors, year, title, venue.
## Research Question
What problem the paper addresses and why it matters.
## Method
Data, design, and analysis in a few bullet points.
## Key Findings
The main results, with numbers where the paper reports them.
## Limitations
Weaknesses acknowledged by the authors and any you notice.
## Relevance
How the work connects to the surrounding literature.

Be factual and concise. Do not invent details that are not in the paper. \
Adhere strictly to the requested markdown format.";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Environment variable still holds a template placeholder.
    #[error("Environment variable {0} still contains a placeholder value; fill in your credentials")]
    Placeholder(String),
    /// System prompt file could not be read.
    #[error("Failed to read system prompt file {path}: {source}")]
    PromptFile {
        /// File named by `GEMINI_SYSTEM_PROMPT_FILE`.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
}

/// Whether the Zotero library belongs to a user or a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LibraryType {
    /// Personal library (`/users/{id}`).
    User,
    /// Shared group library (`/groups/{id}`).
    Group,
}

impl LibraryType {
    /// Path segment used by the Zotero API for this library type.
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Group => "groups",
        }
    }
}

impl std::str::FromStr for LibraryType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            _ => Err(()),
        }
    }
}

/// Connection details for the reference library.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Numeric library identifier.
    pub library_id: String,
    /// User or group library.
    pub library_type: LibraryType,
    /// Web API key with write access.
    pub api_key: String,
    /// Base URL of the Zotero Web API.
    pub web_url: String,
    /// Base URL of the local connector API served by the desktop application.
    pub local_url: String,
}

/// Credentials and endpoint for the generative backend.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key sent with each request.
    pub api_key: String,
    /// Base URL of the Generative Language API.
    pub base_url: String,
}

/// Settings handed to the per-item summarization pipeline.
#[derive(Debug, Clone)]
pub struct SummarySettings {
    /// Model identifier; also stored as a tag on every generated note.
    pub model: String,
    /// Sampling temperature in `0.0..=1.0`.
    pub temperature: f32,
    /// System instruction sent with every document.
    pub system_prompt: String,
    /// Pause between consecutive items.
    pub inter_item_delay: Duration,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            inter_item_delay: Duration::from_secs(DEFAULT_DELAY_SECS),
        }
    }
}

impl SummarySettings {
    /// Return a copy with the model replaced.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Return a copy with the temperature replaced, rejecting values outside `0.0..=1.0`.
    pub fn with_temperature(mut self, temperature: f32) -> Result<Self, ConfigError> {
        self.temperature = validate_temperature(temperature, "temperature")?;
        Ok(self)
    }
}

/// Runtime configuration, loaded once and passed by value to the pipelines.
#[derive(Debug, Clone)]
pub struct Config {
    /// Reference library connection.
    pub library: LibraryConfig,
    /// Generative backend connection.
    pub gemini: GeminiConfig,
    /// Defaults for summarization runs.
    pub summary: SummarySettings,
}

impl Config {
    /// Load `.env` if present, then read the configuration from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            library_id = %config.library.library_id,
            library_type = ?config.library.library_type,
            web_url = %config.library.web_url,
            local_url = %config.library.local_url,
            model = %config.summary.model,
            temperature = config.summary.temperature,
            delay_secs = config.summary.inter_item_delay.as_secs(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let library = LibraryConfig {
            library_id: load_credential("ZOTERO_LIBRARY_ID")?,
            library_type: load_env_optional("ZOTERO_LIBRARY_TYPE")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("ZOTERO_LIBRARY_TYPE".into()))
                })
                .transpose()?
                .unwrap_or(LibraryType::User),
            api_key: load_credential("ZOTERO_API_KEY")?,
            web_url: load_env_optional("ZOTERO_API_URL")
                .unwrap_or_else(|| DEFAULT_ZOTERO_API_URL.to_string()),
            local_url: load_env_optional("ZOTERO_LOCAL_URL")
                .unwrap_or_else(|| DEFAULT_ZOTERO_LOCAL_URL.to_string()),
        };

        let gemini = GeminiConfig {
            api_key: load_credential("GEMINI_API_KEY")?,
            base_url: load_env_optional("GEMINI_API_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_API_URL.to_string()),
        };

        let temperature = load_env_optional("GEMINI_TEMPERATURE")
            .map(|value| {
                value
                    .parse::<f32>()
                    .map_err(|_| ConfigError::InvalidValue("GEMINI_TEMPERATURE".into()))
                    .and_then(|parsed| validate_temperature(parsed, "GEMINI_TEMPERATURE"))
            })
            .transpose()?
            .unwrap_or(DEFAULT_TEMPERATURE);

        let delay_secs = load_env_optional("SUMMARY_DELAY_SECS")
            .map(|value| {
                value
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidValue("SUMMARY_DELAY_SECS".into()))
            })
            .transpose()?
            .unwrap_or(DEFAULT_DELAY_SECS);

        let summary = SummarySettings {
            model: load_env_optional("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature,
            system_prompt: load_system_prompt()?,
            inter_item_delay: Duration::from_secs(delay_secs),
        };

        Ok(Self {
            library,
            gemini,
            summary,
        })
    }
}

fn load_system_prompt() -> Result<String, ConfigError> {
    if let Some(prompt) = load_env_optional("GEMINI_SYSTEM_PROMPT") {
        return Ok(prompt);
    }
    match load_env_optional("GEMINI_SYSTEM_PROMPT_FILE") {
        Some(path) => {
            let path = PathBuf::from(path);
            std::fs::read_to_string(&path)
                .map_err(|source| ConfigError::PromptFile { path, source })
        }
        None => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
    }
}

fn validate_temperature(value: f32, key: &str) -> Result<f32, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue(key.to_string()))
    }
}

fn load_credential(key: &str) -> Result<String, ConfigError> {
    let value = load_env(key)?;
    if value.contains(PLACEHOLDER_MARKER) {
        return Err(ConfigError::Placeholder(key.to_string()));
    }
    Ok(value)
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_type_parses_case_insensitively() {
        assert_eq!("User".parse::<LibraryType>(), Ok(LibraryType::User));
        assert_eq!(" group ".parse::<LibraryType>(), Ok(LibraryType::Group));
        assert!("team".parse::<LibraryType>().is_err());
        assert_eq!(LibraryType::Group.path_segment(), "groups");
    }

    #[test]
    fn temperature_outside_unit_range_is_rejected() {
        let settings = SummarySettings::default();
        assert!(settings.clone().with_temperature(1.5).is_err());
        assert!(settings.clone().with_temperature(-0.1).is_err());
        let tuned = settings.with_temperature(0.2).expect("valid temperature");
        assert!((tuned.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn default_settings_use_six_second_delay() {
        let settings = SummarySettings::default();
        assert_eq!(settings.inter_item_delay, Duration::from_secs(6));
        assert_eq!(settings.model, "gemini-2.5-pro");
        assert!(KNOWN_MODELS.contains(&settings.model.as_str()));
    }
}
