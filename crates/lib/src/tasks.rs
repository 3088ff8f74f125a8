//! # Analysis Tasks
//!
//! A task pairs a schema with the prompt that asks the model to fill it, plus
//! any task-specific handling of the raw response before validation.

use crate::extract::{capitalize, extract, extract_yes_no, ExtractionFailure};
use crate::record::CandidateRecord;
use crate::schema::{self, RecordSchema, UGC_ANSWER_FIELD, UGC_JUSTIFICATION_FIELD};
use std::sync::Arc;
use tracing::debug;

/// Clean-up applied to a raw field value before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// Trim, capitalise, and drop trailing periods: `" yes."` becomes `"Yes"`.
    YesNoAnswer,
}

impl Normalization {
    pub fn apply(self, value: &str) -> String {
        match self {
            Normalization::YesNoAnswer => capitalize(value.trim())
                .trim_end_matches('.')
                .to_string(),
        }
    }
}

/// Alternative parse used when no JSON payload can be recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextFallback {
    /// A leading `Yes`/`No` answer followed by free-text justification.
    YesNo {
        answer_field: String,
        justification_field: String,
    },
}

#[derive(Debug, Clone)]
pub struct AnalysisTask {
    name: String,
    schema: Arc<RecordSchema>,
    prompt: String,
    normalizations: Vec<(String, Normalization)>,
    text_fallback: Option<TextFallback>,
}

impl AnalysisTask {
    pub fn new(name: &str, schema: Arc<RecordSchema>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            schema,
            prompt: prompt.into(),
            normalizations: Vec::new(),
            text_fallback: None,
        }
    }

    pub fn with_normalization(mut self, field: &str, normalization: Normalization) -> Self {
        self.normalizations.push((field.to_string(), normalization));
        self
    }

    pub fn with_text_fallback(mut self, fallback: TextFallback) -> Self {
        self.text_fallback = Some(fallback);
        self
    }

    /// Creative feature extraction over the ad analysis schema.
    pub fn ad_features(prompt: impl Into<String>) -> Self {
        Self::new("features", Arc::new(schema::ad_analysis()), prompt)
    }

    /// UGC-style detection, tolerant of plain "Yes, because..." answers.
    pub fn ugc_detection(prompt: impl Into<String>) -> Self {
        Self::new("ugc", Arc::new(schema::ugc()), prompt)
            .with_normalization(UGC_ANSWER_FIELD, Normalization::YesNoAnswer)
            .with_text_fallback(TextFallback::YesNo {
                answer_field: UGC_ANSWER_FIELD.to_string(),
                justification_field: UGC_JUSTIFICATION_FIELD.to_string(),
            })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Fields whose presence in the store marks an asset as done for this task.
    pub fn completion_fields(&self) -> Vec<String> {
        self.schema.field_names().map(String::from).collect()
    }

    /// Turns a raw model response into a candidate record.
    ///
    /// Falls back to the task's plain-text parse, if any, when no JSON object
    /// can be recovered, then applies the task's normalizations.
    pub fn extract(&self, raw_text: &str) -> Result<CandidateRecord, ExtractionFailure> {
        let mut candidate = match (extract(raw_text), &self.text_fallback) {
            (Ok(candidate), _) => candidate,
            (
                Err(e),
                Some(TextFallback::YesNo {
                    answer_field,
                    justification_field,
                }),
            ) => {
                debug!("JSON extraction failed ({e}); trying plain-text answer.");
                extract_yes_no(raw_text, answer_field, justification_field).map_err(|_| e)?
            }
            (Err(e), None) => return Err(e),
        };

        for (field, normalization) in &self.normalizations {
            if let Some(value) = candidate.get(field) {
                let normalized = normalization.apply(value);
                candidate.insert(field, normalized);
            }
        }
        Ok(candidate)
    }
}
