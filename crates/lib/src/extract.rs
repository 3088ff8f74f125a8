//! # Response Extraction
//!
//! Recovers a structured payload from free text returned by the analysis
//! service. Models tend to wrap the JSON object in prose or markdown fences,
//! so the extractor takes the greedy span from the first `{` to the last `}`
//! and parses only that.

use crate::record::CandidateRecord;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ExtractionFailure {
    #[error("No JSON object found in response")]
    NoPayload,
    #[error("Payload parsed but is not a JSON object (found {0})")]
    NotAnObject(&'static str),
    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("No leading Yes/No answer found in response")]
    NoAnswer,
}

/// A leading `Yes`/`No`, optionally after `Answer:`, plus trailing separators.
static YES_NO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:Answer[:\-\s]*)?(Yes|No)\b[:\-\s\.]*")
        .expect("Yes/No pattern is a valid regex")
});

/// Extracts a candidate record from raw model output.
///
/// String values are taken verbatim; numbers and booleans are rendered as
/// text; nested arrays and objects are kept as compact JSON. `null` values
/// are dropped, so the field counts as missing during validation.
pub fn extract(raw_text: &str) -> Result<CandidateRecord, ExtractionFailure> {
    let span = payload_span(raw_text).ok_or(ExtractionFailure::NoPayload)?;
    debug!("Extracted payload span: {}", span);

    let value: Value = serde_json::from_str(span)?;
    let object = match value {
        Value::Object(map) => map,
        Value::Array(_) => return Err(ExtractionFailure::NotAnObject("array")),
        _ => return Err(ExtractionFailure::NotAnObject("scalar")),
    };

    let mut candidate = CandidateRecord::new();
    for (key, value) in object {
        match value {
            Value::Null => continue,
            Value::String(s) => candidate.insert(&key, s),
            Value::Bool(b) => candidate.insert(&key, b.to_string()),
            Value::Number(n) => candidate.insert(&key, n.to_string()),
            other => candidate.insert(&key, other.to_string()),
        }
    }
    Ok(candidate)
}

/// The substring from the first `{` to the last `}`, inclusive.
fn payload_span(raw_text: &str) -> Option<&str> {
    let start = raw_text.find('{')?;
    let end = raw_text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw_text[start..=end])
}

/// Reads a plain-text `Yes`/`No` answer, e.g. `"Answer: Yes - shot on a phone"`.
///
/// The answer lands in `answer_field` (capitalised) and whatever text follows
/// it lands in `justification_field`. A blank remainder leaves the
/// justification missing.
pub fn extract_yes_no(
    raw_text: &str,
    answer_field: &str,
    justification_field: &str,
) -> Result<CandidateRecord, ExtractionFailure> {
    let caps = YES_NO_RE
        .captures(raw_text)
        .ok_or(ExtractionFailure::NoAnswer)?;
    let (answer, end) = match (caps.get(1), caps.get(0)) {
        (Some(answer), Some(whole)) => (answer.as_str(), whole.end()),
        _ => return Err(ExtractionFailure::NoAnswer),
    };

    let mut candidate = CandidateRecord::new();
    candidate.insert(answer_field, capitalize(answer));
    let justification = raw_text[end..].trim();
    if !justification.is_empty() {
        candidate.insert(justification_field, justification);
    }
    Ok(candidate)
}

/// Upper-cases the first character and lower-cases the rest.
pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
