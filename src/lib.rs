#![deny(missing_docs)]

//! Core library for zotnotes: AI reading notes for a Zotero library.

/// Environment-driven configuration record.
pub mod config;
/// Zotero library access and data model.
pub mod library;
/// Structured logging and tracing setup.
pub mod logging;
/// Summary run counters.
pub mod metrics;
/// Summarization and aggregation pipelines.
pub mod pipeline;
/// Generative summarization backend.
pub mod summarization;
