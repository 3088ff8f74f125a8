//! # Corrective Prompt Templates
//!
//! Prompts used when a model response fails schema validation. The analysis
//! prompts themselves are supplied by the caller (see `AnalysisTask`).

use crate::record::ViolationReport;
use crate::schema::{Domain, RecordSchema};

/// The system prompt for a corrective re-query.
pub const CORRECTIVE_SYSTEM_PROMPT: &str = "You are a strict data-formatting assistant. You repair JSON objects so that every field uses exactly one of its allowed values. Respond with a single JSON object and nothing else.";

/// Builds the user prompt for a corrective re-query.
///
/// Lists each violating field with its offending value, the allowed values of
/// every schema field, and the previous raw response verbatim.
pub fn build_corrective_prompt(
    schema: &RecordSchema,
    report: &ViolationReport,
    raw_response: &str,
) -> String {
    let violations = report
        .iter()
        .map(|v| match &v.value {
            Some(value) => format!("- `{}`: {:?} is not an allowed value", v.field, value),
            None => format!("- `{}`: missing", v.field),
        })
        .collect::<Vec<_>>()
        .join("\n");

    let fields = schema
        .fields()
        .iter()
        .map(|f| match f.domain() {
            Domain::Closed(values) => format!(
                "- `{}`: one of {}",
                f.name(),
                values
                    .iter()
                    .map(|v| format!("\"{v}\""))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Domain::FreeText => format!("- `{}`: a short non-empty text", f.name()),
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Your previous answer did not match the required schema.

# Problems
{violations}

# Required fields and allowed values
{fields}

# Previous answer
{raw_response}

Return a corrected JSON object containing every required field. Each value must be copied exactly, including capitalization and punctuation, from the allowed values listed above."#
    )
}
