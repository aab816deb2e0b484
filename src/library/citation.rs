//! Splitting a batched bibliography export into standalone per-record texts.
//!
//! The export endpoint answers a multi-key request with a single document. Every entry keeps
//! its exported source text verbatim; the raw parser only validates it. Entries that fail
//! validation are dropped with a warning, so the caller sees a short batch.

use biblatex::RawBibliography;

const NON_ENTRY_KINDS: &[&str] = &["comment", "preamble", "string"];

/// Split an exported bibliography into one source text per entry, in export order.
pub fn split_bibliography(raw: &str) -> Vec<String> {
    entry_chunks(raw)
        .into_iter()
        .filter(|chunk| {
            let kind = entry_kind(chunk).to_ascii_lowercase();
            !NON_ENTRY_KINDS.contains(&kind.as_str())
        })
        .filter_map(|chunk| match RawBibliography::parse(chunk) {
            Ok(parsed) if parsed.entries.len() == 1 => Some(chunk.to_string()),
            Ok(parsed) => {
                tracing::warn!(
                    entries = parsed.entries.len(),
                    chunk = preview(chunk),
                    "Skipping bibliography chunk without exactly one entry"
                );
                None
            }
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    chunk = preview(chunk),
                    "Skipping unparsable bibliography entry"
                );
                None
            }
        })
        .collect()
}

/// Source spans of every `@kind{...}` block. A block starts at a line whose first
/// non-blank character is `@` and runs until the next such line.
fn entry_chunks(raw: &str) -> Vec<&str> {
    let mut starts = Vec::new();
    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        let body = line.trim_start();
        if body.starts_with('@') {
            starts.push(offset + line.len() - body.len());
        }
        offset += line.len();
    }

    starts
        .iter()
        .enumerate()
        .map(|(index, &start)| {
            let end = starts.get(index + 1).copied().unwrap_or(raw.len());
            raw[start..end].trim_end()
        })
        .collect()
}

fn entry_kind(chunk: &str) -> &str {
    chunk
        .trim_start_matches('@')
        .split(['{', '('])
        .next()
        .unwrap_or_default()
        .trim()
}

fn preview(chunk: &str) -> &str {
    chunk.lines().next().unwrap_or_default()
}
